//! Transport Ports
//!
//! Streaming abstractions over the RPC transport: an inbound source of admin
//! submissions and an outbound sink of products for one subscriber.

use async_trait::async_trait;

use crate::application::ServiceError;
use crate::domain::catalog::{Product, Submission};

/// Inbound stream of admin submissions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubmissionSource: Send {
    /// Next submission, `None` at clean end of input.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Cancelled`] if the peer cancelled, or
    /// [`ServiceError::Transport`] for any other read failure.
    async fn next_submission(&mut self) -> Result<Option<Submission>, ServiceError>;
}

/// Outbound stream of products to one subscriber.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductSink: Send + Sync {
    /// Send one product.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscriber can no longer receive.
    async fn send(&mut self, product: Product) -> Result<(), ServiceError>;

    /// Resolves once the subscriber has gone away.
    async fn closed(&self);
}
