//! Domain Layer - Catalog and subscription types.
//!
//! This layer contains the core domain types for the live product fan-out
//! with no transport dependencies. Everything here is usable from tests
//! without a runtime beyond `tokio::sync`.

/// Catalog reference data and product value types.
pub mod catalog;

/// Subscription tracking and per-subscriber queues.
pub mod subscription;
