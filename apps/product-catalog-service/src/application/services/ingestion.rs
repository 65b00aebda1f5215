//! Ingestion Handler
//!
//! Reads admin submissions until end of input and publishes each one to
//! the live subscribers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::application::ServiceError;
use crate::application::ports::{ProductPublisher, RequestContext, SubmissionSource};

/// Result of a completed ingestion stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    /// Submissions read and published.
    pub count: u64,
    /// Wall time from the first read to end of input.
    pub elapsed: Duration,
}

/// Consumes admin streams.
#[derive(Clone)]
pub struct IngestionService {
    publisher: Arc<dyn ProductPublisher>,
}

impl std::fmt::Debug for IngestionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionService").finish_non_exhaustive()
    }
}

impl IngestionService {
    /// Create a handler publishing through `publisher`.
    #[must_use]
    pub fn new(publisher: Arc<dyn ProductPublisher>) -> Self {
        Self { publisher }
    }

    /// Read `source` to the end, publishing every submission.
    ///
    /// Each read races against the request context.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Cancelled`] / [`ServiceError::DeadlineExceeded`]
    ///   if the request ends first or the source reports cancellation
    /// - [`ServiceError::Transport`] with the source's read error
    /// - [`ServiceError::InvalidArgument`] if the source rejects a message
    pub async fn ingest<S>(
        &self,
        source: &mut S,
        ctx: &RequestContext,
    ) -> Result<IngestSummary, ServiceError>
    where
        S: SubmissionSource + ?Sized,
    {
        let started = Instant::now();
        let mut count: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                err = ctx.done() => Err(err),
                next = source.next_submission() => next,
            };

            let submission = match next {
                Ok(Some(submission)) => submission,
                Ok(None) => break,
                Err(err) => {
                    warn!(count, error = %err, "Ingestion stream ended early");
                    return Err(err);
                }
            };

            count += 1;
            let report = self.publisher.publish(&submission);
            debug!(
                vendor = %submission.vendor,
                product_type = %submission.product_type,
                title = %submission.product.title,
                matched = report.matched,
                dropped = report.dropped,
                "Published product"
            );
        }

        let elapsed = started.elapsed();
        info!(
            count,
            elapsed_secs = elapsed.as_secs(),
            "Ingestion stream completed"
        );

        Ok(IngestSummary { count, elapsed })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use mockall::Sequence;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::application::ports::{MockProductPublisher, MockSubmissionSource, PublishReport};
    use crate::domain::catalog::{Product, Submission};

    fn submission(title: &str, vendor: &str, product_type: &str) -> Submission {
        Submission::new(Product::new(title, "u", "s"), vendor, product_type)
    }

    /// Source yielding a fixed list, then a final result.
    struct ScriptedSource {
        items: VecDeque<Submission>,
        end: Option<ServiceError>,
    }

    #[async_trait]
    impl SubmissionSource for ScriptedSource {
        async fn next_submission(&mut self) -> Result<Option<Submission>, ServiceError> {
            if let Some(item) = self.items.pop_front() {
                return Ok(Some(item));
            }
            self.end.take().map_or(Ok(None), Err)
        }
    }

    /// Source that never yields.
    struct StalledSource;

    #[async_trait]
    impl SubmissionSource for StalledSource {
        async fn next_submission(&mut self) -> Result<Option<Submission>, ServiceError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn publishes_each_submission_in_order() {
        let mut publisher = MockProductPublisher::new();
        let mut seq = Sequence::new();
        for title in ["A", "B", "C"] {
            publisher
                .expect_publish()
                .withf(move |s| s.product.title == title && s.vendor == "aws")
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| PublishReport::default());
        }
        let service = IngestionService::new(Arc::new(publisher));
        let mut source = ScriptedSource {
            items: ["A", "B", "C"]
                .into_iter()
                .map(|t| submission(t, "aws", "compute"))
                .collect(),
            end: None,
        };

        let summary = service
            .ingest(&mut source, &RequestContext::default())
            .await
            .unwrap();

        assert_eq!(summary.count, 3);
    }

    #[tokio::test]
    async fn empty_stream_counts_zero() {
        let mut publisher = MockProductPublisher::new();
        publisher.expect_publish().never();
        let service = IngestionService::new(Arc::new(publisher));
        let mut source = MockSubmissionSource::new();
        source.expect_next_submission().times(1).returning(|| Ok(None));

        let summary = service
            .ingest(&mut source, &RequestContext::default())
            .await
            .unwrap();

        assert_eq!(summary.count, 0);
    }

    #[tokio::test]
    async fn transport_error_is_returned_unchanged() {
        let mut publisher = MockProductPublisher::new();
        publisher
            .expect_publish()
            .times(1)
            .returning(|_| PublishReport::default());
        let service = IngestionService::new(Arc::new(publisher));
        let mut source = ScriptedSource {
            items: VecDeque::from([submission("A", "aws", "compute")]),
            end: Some(ServiceError::transport(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset by peer",
            ))),
        };

        let err = service
            .ingest(&mut source, &RequestContext::default())
            .await
            .unwrap_err();

        let inner = match err {
            ServiceError::Transport(inner) => inner,
            other => panic!("expected transport error, got {other:?}"),
        };
        let io = inner.downcast::<std::io::Error>().unwrap();
        assert_eq!(io.kind(), std::io::ErrorKind::ConnectionReset);
    }

    #[tokio::test]
    async fn source_cancellation_is_cancelled() {
        let publisher = MockProductPublisher::new();
        let service = IngestionService::new(Arc::new(publisher));
        let mut source = MockSubmissionSource::new();
        source
            .expect_next_submission()
            .returning(|| Err(ServiceError::Cancelled));

        let err = service
            .ingest(&mut source, &RequestContext::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Cancelled));
    }

    #[tokio::test]
    async fn shutdown_interrupts_pending_read() {
        let service = IngestionService::new(Arc::new(MockProductPublisher::new()));
        let token = CancellationToken::new();
        let ctx = RequestContext::new(token.clone());
        token.cancel();

        let err = service.ingest(&mut StalledSource, &ctx).await.unwrap_err();

        assert!(matches!(err, ServiceError::Cancelled));
    }

    #[tokio::test]
    async fn deadline_interrupts_pending_read() {
        let service = IngestionService::new(Arc::new(MockProductPublisher::new()));
        let ctx = RequestContext::default().with_timeout(Duration::from_millis(20));

        let err = service.ingest(&mut StalledSource, &ctx).await.unwrap_err();

        assert!(matches!(err, ServiceError::DeadlineExceeded));
    }
}
