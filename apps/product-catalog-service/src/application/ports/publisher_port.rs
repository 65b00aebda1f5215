//! Product Publisher Port (Driven Port)
//!
//! Interface of the fan-out engine as seen by the ingestion handler.

use crate::domain::catalog::Submission;

/// Outcome of publishing one submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscriptions whose filter matched.
    pub matched: usize,
    /// Matched subscriptions whose queue accepted the product.
    pub delivered: usize,
    /// Products lost to a full queue, one per affected subscription.
    pub dropped: usize,
}

/// Port for publishing submissions to live subscribers.
///
/// Publishing never waits and never fails; losses are reported.
#[cfg_attr(test, mockall::automock)]
pub trait ProductPublisher: Send + Sync {
    /// Offer the submission's product to every matching subscription.
    fn publish(&self, submission: &Submission) -> PublishReport;
}
