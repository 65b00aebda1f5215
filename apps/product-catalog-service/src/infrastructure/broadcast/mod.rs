//! Product Fan-out
//!
//! Delivers each published product to every live subscription whose filter
//! matches, through that subscription's own bounded queue.
//!
//! # Architecture
//!
//! The `BroadcastHub` holds no channel of its own. For every publication it
//! asks the `SubscriberRegistry` for the matching subscriptions and offers
//! the product to each queue independently:
//!
//! - a full queue applies its overflow policy and only that subscriber
//!   loses a product
//! - publishing never waits on a subscriber
//! - losses are counted per queue, in the hub totals and in Prometheus

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::application::ports::{ProductPublisher, PublishReport};
use crate::domain::catalog::Submission;
use crate::domain::subscription::{
    Offer, OverflowPolicy, QueueSettings, SubscriberRegistry,
};
use crate::infrastructure::config::FanoutSettings;
use crate::infrastructure::metrics;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for subscriber queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastConfig {
    /// Capacity of each subscriber queue.
    pub queue_capacity: usize,
    /// Behaviour of a full queue.
    pub overflow_policy: OverflowPolicy,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        let defaults = QueueSettings::default();
        Self {
            queue_capacity: defaults.capacity,
            overflow_policy: defaults.overflow_policy,
        }
    }
}

impl From<FanoutSettings> for BroadcastConfig {
    fn from(settings: FanoutSettings) -> Self {
        Self {
            queue_capacity: settings.queue_capacity,
            overflow_policy: settings.overflow_policy,
        }
    }
}

impl From<BroadcastConfig> for QueueSettings {
    fn from(config: BroadcastConfig) -> Self {
        Self {
            capacity: config.queue_capacity,
            overflow_policy: config.overflow_policy,
        }
    }
}

// =============================================================================
// Broadcast Hub
// =============================================================================

/// Fan-out engine over a subscriber registry.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use product_catalog_service::domain::catalog::{Product, ProductFilter, Submission};
/// use product_catalog_service::domain::subscription::SubscriberRegistry;
/// use product_catalog_service::infrastructure::broadcast::BroadcastHub;
///
/// let registry = Arc::new(SubscriberRegistry::with_defaults());
/// let hub = BroadcastHub::new(Arc::clone(&registry));
/// let subscription = registry.register(ProductFilter::new("google", "storage"));
///
/// let report = hub.publish(&Submission::new(Product::new("X", "u", "s"), "google", "storage"));
/// assert_eq!(report.delivered, 1);
/// assert_eq!(subscription.queue().try_recv().unwrap().title, "X");
/// ```
#[derive(Debug)]
pub struct BroadcastHub {
    registry: Arc<SubscriberRegistry>,
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl BroadcastHub {
    /// Create a hub publishing to `registry`'s subscriptions.
    #[must_use]
    pub const fn new(registry: Arc<SubscriberRegistry>) -> Self {
        Self {
            registry,
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Create a hub with its own registry built from `config`.
    #[must_use]
    pub fn with_config(config: BroadcastConfig) -> Self {
        Self::new(Arc::new(SubscriberRegistry::new(config.into())))
    }

    /// Create a hub with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::with_config(BroadcastConfig::default())
    }

    /// The registry publications are matched against.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Offer the submission's product to every matching subscription.
    pub fn publish(&self, submission: &Submission) -> PublishReport {
        let filter = submission.filter();
        let matched = self.registry.matches(&filter);
        let mut report = PublishReport {
            matched: matched.len(),
            ..PublishReport::default()
        };

        for subscriber in &matched {
            let outcome = subscriber.queue.offer(submission.product.clone());
            if outcome.is_queued() {
                report.delivered += 1;
            }
            if outcome.is_overflow() {
                report.dropped += 1;
                debug!(
                    subscription_id = %subscriber.id,
                    policy = %subscriber.queue.overflow_policy(),
                    title = %submission.product.title,
                    "Subscriber queue full, product dropped"
                );
                metrics::record_deliveries_dropped(subscriber.queue.overflow_policy(), 1);
            }
            if outcome == Offer::Closed {
                debug!(subscription_id = %subscriber.id, "Skipped closed subscription");
            }
        }

        self.published.fetch_add(1, Ordering::Relaxed);
        self.delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.dropped.fetch_add(report.dropped as u64, Ordering::Relaxed);

        metrics::record_product_published();
        metrics::record_deliveries(report.delivered as u64);

        report
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Get cumulative publish statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

impl ProductPublisher for BroadcastHub {
    fn publish(&self, submission: &Submission) -> PublishReport {
        Self::publish(self, submission)
    }
}

/// Shared broadcast hub reference.
pub type SharedBroadcastHub = Arc<BroadcastHub>;

/// Cumulative fan-out statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Submissions published.
    pub published: u64,
    /// Products queued for subscribers.
    pub delivered: u64,
    /// Products lost to full queues.
    pub dropped: u64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::{Product, ProductFilter};

    fn submission(title: &str, vendor: &str, product_type: &str) -> Submission {
        Submission::new(Product::new(title, "url", "short"), vendor, product_type)
    }

    #[test]
    fn hub_creation() {
        let hub = BroadcastHub::with_defaults();

        assert!(hub.registry().is_empty());
        assert_eq!(hub.stats(), HubStats::default());
    }

    #[test]
    fn publish_without_subscribers_matches_nothing() {
        let hub = BroadcastHub::with_defaults();

        let report = hub.publish(&submission("X", "aws", "compute"));

        assert_eq!(report, PublishReport::default());
        assert_eq!(hub.stats().published, 1);
    }

    #[test]
    fn every_matching_subscriber_gets_the_product() {
        let hub = BroadcastHub::with_defaults();
        let a = hub.registry().register(ProductFilter::new("google", "storage"));
        let b = hub.registry().register(ProductFilter::new("google", "storage"));

        let report = hub.publish(&submission("X", "google", "storage"));

        assert_eq!(report.matched, 2);
        assert_eq!(report.delivered, 2);
        assert_eq!(a.queue().try_recv().unwrap().title, "X");
        assert_eq!(b.queue().try_recv().unwrap().title, "X");
    }

    #[test]
    fn product_is_delivered_unchanged() {
        let hub = BroadcastHub::with_defaults();
        let sub = hub.registry().register(ProductFilter::new("aws", "compute"));
        let sent = submission("Lambda", "aws", "compute");

        hub.publish(&sent);

        assert_eq!(sub.queue().try_recv().unwrap(), sent.product);
    }

    #[test]
    fn non_matching_subscriber_gets_nothing() {
        let hub = BroadcastHub::with_defaults();
        let storage = hub.registry().register(ProductFilter::new("oracle", "storage"));

        let report = hub.publish(&submission("Y", "oracle", "compute"));

        assert_eq!(report.matched, 0);
        assert!(storage.queue().is_empty());
    }

    #[test]
    fn full_queue_drops_for_that_subscriber_only() {
        let hub = BroadcastHub::with_config(BroadcastConfig {
            queue_capacity: 1,
            overflow_policy: OverflowPolicy::DropNewest,
        });
        let slow = hub.registry().register(ProductFilter::new("aws", "compute"));
        let fast = hub.registry().register(ProductFilter::new("aws", "compute"));

        hub.publish(&submission("1", "aws", "compute"));
        assert_eq!(fast.queue().try_recv().unwrap().title, "1");

        let report = hub.publish(&submission("2", "aws", "compute"));

        assert_eq!(report.matched, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(slow.queue().dropped(), 1);
        assert_eq!(slow.queue().try_recv().unwrap().title, "1");
        assert_eq!(fast.queue().try_recv().unwrap().title, "2");
        assert_eq!(hub.stats().dropped, 1);
    }

    #[test]
    fn drop_oldest_keeps_latest() {
        let hub = BroadcastHub::with_config(BroadcastConfig {
            queue_capacity: 2,
            overflow_policy: OverflowPolicy::DropOldest,
        });
        let sub = hub.registry().register(ProductFilter::new("aws", "compute"));

        for title in ["1", "2", "3"] {
            hub.publish(&submission(title, "aws", "compute"));
        }

        assert_eq!(sub.queue().try_recv().unwrap().title, "2");
        assert_eq!(sub.queue().try_recv().unwrap().title, "3");
        assert_eq!(hub.stats().dropped, 1);
        assert_eq!(hub.stats().delivered, 3);
    }

    #[test]
    fn unregistered_subscriber_gets_nothing() {
        let hub = BroadcastHub::with_defaults();
        let sub = hub.registry().register(ProductFilter::new("aws", "compute"));
        sub.unregister();

        let report = hub.publish(&submission("X", "aws", "compute"));

        assert_eq!(report.matched, 0);
        assert!(sub.queue().try_recv().is_none());
    }

    #[test]
    fn stats_accumulate() {
        let hub = BroadcastHub::with_defaults();
        let _sub = hub.registry().register(ProductFilter::new("aws", "compute"));

        hub.publish(&submission("1", "aws", "compute"));
        hub.publish(&submission("2", "aws", "storage"));

        let stats = hub.stats();
        assert_eq!(stats.published, 2);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.dropped, 0);
    }

    #[test]
    fn config_converts_to_queue_settings() {
        let settings: QueueSettings = BroadcastConfig {
            queue_capacity: 7,
            overflow_policy: OverflowPolicy::DropOldest,
        }
        .into();

        assert_eq!(settings.capacity, 7);
        assert_eq!(settings.overflow_policy, OverflowPolicy::DropOldest);
    }
}
