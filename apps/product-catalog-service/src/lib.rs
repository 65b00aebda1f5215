#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Product Catalog Service - Vendor Product Streaming
//!
//! A gRPC service that answers product catalog lookups and streams
//! products to subscribers. Each subscriber names a vendor and product
//! type, receives the catalog entries for that pair, then every product an
//! admin client submits for it while the stream stays open.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Catalog data and subscription bookkeeping
//!   - `catalog`: Vendors, product types, products and filters
//!   - `subscription`: Subscriber registry and per-subscriber queues
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Publisher, sink, source and request context interfaces
//!   - `services`: Ingestion and subscription handlers
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `grpc`: gRPC server implementation
//!   - `broadcast`: Fan-out of submissions to matching queues
//!   - `config`: Configuration from the environment
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//!                        ┌─────────────┐      ┌─────────────┐
//! Admin ── SetVendor ───►│  Ingestion  │─────►│  Broadcast  │
//!          Products      └─────────────┘      │     Hub     │
//!                                             └──────┬──────┘
//!                                   one bounded queue per subscription
//!                                                    │
//!                        ┌─────────────┐             ▼
//! Client ◄─ GetVendor ───│ Subscription│◄──── matching queues
//!           Products     └─────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Catalog and subscription types with no transport dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::catalog::{Catalog, CatalogError, Product, ProductFilter, Submission};
pub use domain::subscription::{
    OverflowPolicy, QueueSettings, RegistryStats, SubscriberRegistry, Subscription,
    SubscriptionId,
};

// Application
pub use application::ServiceError;
pub use application::ports::RequestContext;
pub use application::services::{IngestionService, SubscriptionService};

// Infrastructure config
pub use infrastructure::config::{ConfigError, FanoutSettings, ServerSettings, ServiceConfig};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Broadcast hub (for integration tests)
pub use infrastructure::broadcast::{BroadcastConfig, BroadcastHub, HubStats, SharedBroadcastHub};

// gRPC server (for integration tests)
pub use infrastructure::grpc::{
    proto::products::v1 as proto,
    server::{ProductCatalogServer, ProductCatalogServerConfig},
};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
