//! Application Services
//!
//! Handlers that orchestrate domain logic and coordinate between ports.
//!
//! - `IngestionService`: consumes the admin stream and publishes each product
//! - `SubscriptionService`: replays the catalog, then relays live products

mod ingestion;
mod subscription;

pub use ingestion::{IngestSummary, IngestionService};
pub use subscription::{OpenSubscription, RelaySummary, SubscriptionService};
