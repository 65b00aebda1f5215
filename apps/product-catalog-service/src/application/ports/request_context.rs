//! Request Context
//!
//! Cancellation and deadline of a single request, raced against every wait
//! a handler performs.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::application::ServiceError;

/// Cancellation token and optional deadline of one request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// Create a context cancelled by `cancel` with no deadline.
    #[must_use]
    pub const fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Set an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline relative to now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// The request's cancellation token.
    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// The request deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Resolves when the request is cancelled or its deadline passes.
    pub async fn done(&self) -> ServiceError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                () = self.cancel.cancelled() => ServiceError::Cancelled,
                () = tokio::time::sleep_until(deadline) => ServiceError::DeadlineExceeded,
            },
            None => {
                self.cancel.cancelled().await;
                ServiceError::Cancelled
            }
        }
    }

    /// Check without waiting.
    ///
    /// # Errors
    ///
    /// Returns the error [`done`](Self::done) would resolve to if the
    /// request is already finished.
    pub fn check(&self) -> Result<(), ServiceError> {
        if self.cancel.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }
        if self.deadline.is_some_and(|d| d <= Instant::now()) {
            return Err(ServiceError::DeadlineExceeded);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn done_on_cancel() {
        let token = CancellationToken::new();
        let ctx = RequestContext::new(token.clone());

        assert!(ctx.check().is_ok());
        token.cancel();

        assert!(matches!(ctx.done().await, ServiceError::Cancelled));
        assert!(matches!(ctx.check(), Err(ServiceError::Cancelled)));
    }

    #[tokio::test]
    async fn done_on_deadline() {
        let ctx = RequestContext::default().with_timeout(Duration::from_millis(20));

        assert!(ctx.check().is_ok());
        assert!(matches!(ctx.done().await, ServiceError::DeadlineExceeded));
        assert!(matches!(ctx.check(), Err(ServiceError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn cancel_wins_over_later_deadline() {
        let token = CancellationToken::new();
        let ctx = RequestContext::new(token.clone()).with_timeout(Duration::from_secs(60));

        token.cancel();

        assert!(matches!(ctx.done().await, ServiceError::Cancelled));
    }

    #[tokio::test]
    async fn no_deadline_stays_pending() {
        let ctx = RequestContext::default();

        let waited = tokio::time::timeout(Duration::from_millis(20), ctx.done()).await;

        assert!(waited.is_err());
        assert!(ctx.deadline().is_none());
    }
}
