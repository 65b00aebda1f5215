//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the ingestion and subscription handlers and the
//! port interfaces they use to talk to the transport and the fan-out engine.

/// Application error type shared by handlers.
pub mod error;

/// Port interfaces for transports and publishing.
pub mod ports;

/// Ingestion and subscription handlers.
pub mod services;

pub use error::ServiceError;
