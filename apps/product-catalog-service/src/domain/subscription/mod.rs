//! Subscriber Registry
//!
//! Tracks the active live-product subscriptions and their filters.
//!
//! # Design
//!
//! Every subscription owns a private bounded queue. The registry indexes the
//! queues by filter so the fan-out path can enumerate all matches under a
//! read lock, and by id so removal is exact even when many subscribers share
//! a filter.
//!
//! The [`Subscription`] handle returned by [`SubscriberRegistry::register`]
//! unregisters itself when dropped, so no exit path of a handler can leave
//! a stale registration behind.

mod queue;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::domain::catalog::{Product, ProductFilter};

pub use queue::{
    DEFAULT_QUEUE_CAPACITY, Offer, OverflowPolicy, QueueSettings, SubscriptionQueue,
};

// =============================================================================
// Types
// =============================================================================

/// Unique identifier of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A registered subscription selected by a filter lookup.
#[derive(Debug, Clone)]
pub struct MatchedSubscriber {
    /// Subscription id.
    pub id: SubscriptionId,
    /// The subscription's queue.
    pub queue: Arc<SubscriptionQueue>,
}

/// Registry counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Registered subscriptions.
    pub subscriptions: usize,
    /// Distinct filters among them.
    pub filters: usize,
}

// =============================================================================
// Registry State
// =============================================================================

#[derive(Debug, Default)]
struct RegistryState {
    /// Filter → subscriptions with that filter.
    by_filter: HashMap<ProductFilter, HashMap<SubscriptionId, Arc<SubscriptionQueue>>>,
    /// Subscription → its filter.
    filters: HashMap<SubscriptionId, ProductFilter>,
}

impl RegistryState {
    fn insert(&mut self, id: SubscriptionId, filter: ProductFilter, queue: Arc<SubscriptionQueue>) {
        self.by_filter
            .entry(filter.clone())
            .or_default()
            .insert(id, queue);
        self.filters.insert(id, filter);
    }

    fn remove(&mut self, id: SubscriptionId) -> Option<Arc<SubscriptionQueue>> {
        let filter = self.filters.remove(&id)?;
        let bucket = self.by_filter.get_mut(&filter)?;
        let queue = bucket.remove(&id);

        // Clean up empty filter entry
        if bucket.is_empty() {
            self.by_filter.remove(&filter);
        }

        queue
    }
}

// =============================================================================
// Subscriber Registry
// =============================================================================

/// Thread-safe set of active subscriptions.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use product_catalog_service::domain::catalog::ProductFilter;
/// use product_catalog_service::domain::subscription::SubscriberRegistry;
///
/// let registry = Arc::new(SubscriberRegistry::with_defaults());
/// let filter = ProductFilter::new("aws", "compute");
///
/// let subscription = registry.register(filter.clone());
/// assert_eq!(registry.matches(&filter).len(), 1);
///
/// drop(subscription);
/// assert!(registry.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    state: RwLock<RegistryState>,
    queue_settings: QueueSettings,
}

impl SubscriberRegistry {
    /// Create a registry whose queues use `queue_settings`.
    #[must_use]
    pub fn new(queue_settings: QueueSettings) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            queue_settings,
        }
    }

    /// Create a registry with default queue settings.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(QueueSettings::default())
    }

    /// Register a new subscription for `filter`.
    ///
    /// The returned handle owns the registration.
    #[must_use]
    pub fn register(self: &Arc<Self>, filter: ProductFilter) -> Subscription {
        let id = SubscriptionId::new();
        let queue = Arc::new(SubscriptionQueue::new(self.queue_settings));

        self.state
            .write()
            .insert(id, filter.clone(), Arc::clone(&queue));

        tracing::debug!(
            subscription_id = %id,
            vendor = %filter.vendor,
            product_type = %filter.product_type,
            "Subscription registered"
        );

        Subscription {
            id,
            filter,
            queue,
            registry: Arc::clone(self),
        }
    }

    /// Remove a subscription and close its queue.
    ///
    /// Returns `false` if it was not registered.
    pub fn unregister(&self, id: SubscriptionId) -> bool {
        let removed = self.state.write().remove(id);

        removed.is_some_and(|queue| {
            queue.close();
            tracing::debug!(subscription_id = %id, "Subscription unregistered");
            true
        })
    }

    /// All subscriptions whose filter equals `filter`.
    #[must_use]
    pub fn matches(&self, filter: &ProductFilter) -> Vec<MatchedSubscriber> {
        self.state
            .read()
            .by_filter
            .get(filter)
            .map(|bucket| {
                bucket
                    .iter()
                    .map(|(id, queue)| MatchedSubscriber {
                        id: *id,
                        queue: Arc::clone(queue),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether a subscription is registered.
    #[must_use]
    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.state.read().filters.contains_key(&id)
    }

    /// Number of registered subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().filters.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().filters.is_empty()
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let state = self.state.read();
        RegistryStats {
            subscriptions: state.filters.len(),
            filters: state.by_filter.len(),
        }
    }

    /// Close every queue so that pending receivers finish.
    ///
    /// Subscriptions stay registered until their handles are dropped.
    pub fn close_all(&self) {
        let state = self.state.read();
        for queue in state.by_filter.values().flat_map(HashMap::values) {
            queue.close();
        }
        tracing::debug!(subscriptions = state.filters.len(), "Closed all subscription queues");
    }

    /// Settings applied to new queues.
    #[must_use]
    pub const fn queue_settings(&self) -> QueueSettings {
        self.queue_settings
    }
}

// =============================================================================
// Subscription Handle
// =============================================================================

/// Owning handle of a registered subscription.
///
/// Dropping the handle unregisters the subscription.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    filter: ProductFilter,
    queue: Arc<SubscriptionQueue>,
    registry: Arc<SubscriberRegistry>,
}

impl Subscription {
    /// Subscription id.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The filter this subscription selects by.
    #[must_use]
    pub const fn filter(&self) -> &ProductFilter {
        &self.filter
    }

    /// The subscription's queue.
    #[must_use]
    pub const fn queue(&self) -> &Arc<SubscriptionQueue> {
        &self.queue
    }

    /// Wait for the next live product; `None` once the queue is closed.
    pub async fn recv(&self) -> Option<Product> {
        self.queue.recv().await
    }

    /// Unregister now. Safe to call more than once.
    pub fn unregister(&self) -> bool {
        self.registry.unregister(self.id)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn registry() -> Arc<SubscriberRegistry> {
        Arc::new(SubscriberRegistry::with_defaults())
    }

    fn product(title: &str) -> Product {
        Product::new(title, "u", "s")
    }

    #[test]
    fn register_indexes_by_filter() {
        let registry = registry();
        let filter = ProductFilter::new("google", "storage");

        let a = registry.register(filter.clone());
        let b = registry.register(filter.clone());

        let matched = registry.matches(&filter);
        assert_eq!(matched.len(), 2);
        assert!(matched.iter().any(|m| m.id == a.id()));
        assert!(matched.iter().any(|m| m.id == b.id()));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn matches_ignores_other_filters() {
        let registry = registry();
        let _compute = registry.register(ProductFilter::new("oracle", "compute"));

        assert!(registry.matches(&ProductFilter::new("oracle", "storage")).is_empty());
        assert!(registry.matches(&ProductFilter::new("Oracle", "compute")).is_empty());
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = registry();
        let subscription = registry.register(ProductFilter::new("aws", "compute"));
        let id = subscription.id();

        assert!(registry.contains(id));
        assert!(subscription.unregister());
        assert!(!subscription.unregister());
        assert!(!registry.unregister(id));
        assert!(!registry.contains(id));
    }

    #[test]
    fn unregister_closes_queue() {
        let registry = registry();
        let subscription = registry.register(ProductFilter::new("aws", "compute"));
        subscription.queue().offer(product("a"));

        subscription.unregister();

        assert!(subscription.queue().is_closed());
        assert!(subscription.queue().is_empty());
    }

    #[test]
    fn drop_unregisters() {
        let registry = registry();
        let subscription = registry.register(ProductFilter::new("aws", "compute"));
        let id = subscription.id();

        drop(subscription);

        assert!(!registry.contains(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn unregister_keeps_other_subscribers_with_same_filter() {
        let registry = registry();
        let filter = ProductFilter::new("google", "storage");
        let a = registry.register(filter.clone());
        let b = registry.register(filter.clone());

        drop(a);

        let matched = registry.matches(&filter);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, b.id());
    }

    #[test]
    fn unregister_unknown_id_is_noop() {
        let registry = registry();
        let _kept = registry.register(ProductFilter::new("aws", "compute"));

        assert!(!registry.unregister(SubscriptionId::new()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn stats_are_accurate() {
        let registry = registry();
        let _a = registry.register(ProductFilter::new("aws", "compute"));
        let _b = registry.register(ProductFilter::new("aws", "compute"));
        let _c = registry.register(ProductFilter::new("aws", "storage"));

        let stats = registry.stats();

        assert_eq!(stats.subscriptions, 3); // a, b and c
        assert_eq!(stats.filters, 2); // compute and storage
    }

    #[test]
    fn close_all_keeps_registrations() {
        let registry = registry();
        let a = registry.register(ProductFilter::new("aws", "compute"));
        let b = registry.register(ProductFilter::new("oracle", "storage"));

        registry.close_all();

        assert!(a.queue().is_closed());
        assert!(b.queue().is_closed());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn queues_use_registry_settings() {
        let registry = Arc::new(SubscriberRegistry::new(QueueSettings {
            capacity: 3,
            overflow_policy: OverflowPolicy::DropOldest,
        }));

        let subscription = registry.register(ProductFilter::new("aws", "compute"));

        assert_eq!(subscription.queue().capacity(), 3);
        assert_eq!(subscription.queue().overflow_policy(), OverflowPolicy::DropOldest);
    }

    #[test]
    fn thread_safety_concurrent_registrations() {
        use std::thread;

        let registry = registry();
        let mut handles = vec![];

        // Spawn 10 threads that each register and keep their handle
        for i in 0..10 {
            let r = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                let vendor = if i % 2 == 0 { "aws" } else { "google" };
                r.register(ProductFilter::new(vendor, "compute"))
            }));
        }

        let subscriptions: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let stats = registry.stats();
        assert_eq!(stats.subscriptions, 10);
        assert_eq!(stats.filters, 2);

        drop(subscriptions);
        assert!(registry.is_empty());
    }

    #[test]
    fn thread_safety_concurrent_unregisters() {
        use std::thread;

        let registry = registry();
        let subscriptions: Vec<_> = (0..10)
            .map(|_| registry.register(ProductFilter::new("aws", "compute")))
            .collect();

        let handles: Vec<_> = subscriptions
            .into_iter()
            .map(|s| thread::spawn(move || drop(s)))
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = registry.stats();
        assert_eq!(stats.subscriptions, 0);
        assert_eq!(stats.filters, 0);
    }

    fn filter_strategy() -> impl Strategy<Value = ProductFilter> {
        (
            prop::sample::select(vec!["aws", "google", "oracle", "AWS"]),
            prop::sample::select(vec!["compute", "storage", "Compute"]),
        )
            .prop_map(|(v, t)| ProductFilter::new(v, t))
    }

    proptest! {
        #[test]
        fn matches_returns_exactly_equal_filters(
            registered in prop::collection::vec(filter_strategy(), 0..16),
            probe in filter_strategy(),
        ) {
            let registry = registry();
            let subscriptions: Vec<_> = registered
                .iter()
                .map(|f| registry.register(f.clone()))
                .collect();

            let matched = registry.matches(&probe);

            let expected = subscriptions.iter().filter(|s| *s.filter() == probe).count();
            prop_assert_eq!(matched.len(), expected);
            for m in &matched {
                let owner = subscriptions.iter().find(|s| s.id() == m.id);
                prop_assert!(owner.is_some_and(|s| s.filter() == &probe));
            }
        }
    }
}
