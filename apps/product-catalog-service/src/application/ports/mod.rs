//! Port Interfaces
//!
//! Defines the interfaces (ports) the handlers depend on, following the
//! Hexagonal Architecture pattern. Infrastructure adapters implement them.
//!
//! ## Driven Ports (Outbound)
//!
//! - `ProductPublisher`: fan-out of one submission to matching subscribers
//! - `ProductSink`: per-subscriber outbound product stream
//!
//! ## Driver Ports (Inbound)
//!
//! - `SubmissionSource`: admin ingestion stream
//! - `RequestContext`: cancellation and deadline of the current request

mod publisher_port;
mod request_context;
mod transport_port;

pub use publisher_port::{ProductPublisher, PublishReport};
pub use request_context::RequestContext;
pub use transport_port::{ProductSink, SubmissionSource};

#[cfg(test)]
pub use publisher_port::MockProductPublisher;
#[cfg(test)]
pub use transport_port::{MockProductSink, MockSubmissionSource};
