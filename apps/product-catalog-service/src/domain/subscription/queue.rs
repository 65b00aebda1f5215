//! Bounded per-subscriber product queue.
//!
//! Producers never wait: [`SubscriptionQueue::offer`] applies the overflow
//! policy when the queue is full. A single consumer drains the queue with
//! [`SubscriptionQueue::recv`].

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::domain::catalog::Product;

/// Default number of products buffered per subscriber.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

// =============================================================================
// Overflow Policy
// =============================================================================

/// What a full queue does with a new product.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Discard the incoming product.
    #[default]
    DropNewest,
    /// Evict the oldest queued product to make room.
    DropOldest,
}

impl OverflowPolicy {
    /// Stable name used in configuration and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DropNewest => "drop_newest",
            Self::DropOldest => "drop_oldest",
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "drop_newest" | "newest" => Ok(Self::DropNewest),
            "drop_oldest" | "oldest" => Ok(Self::DropOldest),
            other => Err(format!(
                "unknown overflow policy '{other}', expected drop_newest or drop_oldest"
            )),
        }
    }
}

/// Capacity and overflow behaviour of newly created queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    /// Maximum buffered products per subscriber.
    pub capacity: usize,
    /// Policy applied when the queue is full.
    pub overflow_policy: OverflowPolicy,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

// =============================================================================
// Offer Outcome
// =============================================================================

/// Result of offering a product to a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Product was queued.
    Enqueued,
    /// Queue was full; the offered product was discarded.
    DroppedNewest,
    /// Queue was full; the oldest product was evicted and the offered one queued.
    DisplacedOldest,
    /// Queue is closed; nothing was queued.
    Closed,
}

impl Offer {
    /// Whether the offered product is now in the queue.
    #[must_use]
    pub const fn is_queued(self) -> bool {
        matches!(self, Self::Enqueued | Self::DisplacedOldest)
    }

    /// Whether a product was lost to overflow.
    #[must_use]
    pub const fn is_overflow(self) -> bool {
        matches!(self, Self::DroppedNewest | Self::DisplacedOldest)
    }
}

// =============================================================================
// Subscription Queue
// =============================================================================

/// Bounded FIFO of products awaiting delivery to one subscriber.
#[derive(Debug)]
pub struct SubscriptionQueue {
    capacity: usize,
    policy: OverflowPolicy,
    items: Mutex<VecDeque<Product>>,
    notify: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl SubscriptionQueue {
    /// Create an empty queue. A zero capacity is treated as one.
    #[must_use]
    pub fn new(settings: QueueSettings) -> Self {
        let capacity = settings.capacity.max(1);
        Self {
            capacity,
            policy: settings.overflow_policy,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Offer a product without waiting.
    pub fn offer(&self, product: Product) -> Offer {
        let outcome = {
            let mut items = self.items.lock();
            if self.closed.load(Ordering::Acquire) {
                return Offer::Closed;
            }
            if items.len() < self.capacity {
                items.push_back(product);
                Offer::Enqueued
            } else {
                match self.policy {
                    OverflowPolicy::DropNewest => Offer::DroppedNewest,
                    OverflowPolicy::DropOldest => {
                        items.pop_front();
                        items.push_back(product);
                        Offer::DisplacedOldest
                    }
                }
            }
        };

        if outcome.is_overflow() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        if outcome.is_queued() {
            self.notify.notify_one();
        }
        outcome
    }

    /// Wait for the next product.
    ///
    /// Returns `None` once the queue is closed.
    pub async fn recv(&self) -> Option<Product> {
        loop {
            if let Some(product) = self.try_recv() {
                return Some(product);
            }
            if self.is_closed() {
                return None;
            }
            self.notify.notified().await;
        }
    }

    /// Take the next product if one is queued.
    pub fn try_recv(&self) -> Option<Product> {
        if self.is_closed() {
            return None;
        }
        self.items.lock().pop_front()
    }

    /// Close the queue and discard anything still buffered.
    ///
    /// Wakes a pending [`recv`](Self::recv), which then returns `None`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.items.lock().clear();
        self.notify.notify_one();
    }

    /// Whether the queue has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of buffered products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether no products are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Maximum buffered products.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Policy applied when full.
    #[must_use]
    pub const fn overflow_policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Products lost to overflow over the queue's lifetime.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use test_case::test_case;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    use super::*;

    fn product(title: &str) -> Product {
        Product::new(title, "u", "s")
    }

    fn queue(capacity: usize, overflow_policy: OverflowPolicy) -> SubscriptionQueue {
        SubscriptionQueue::new(QueueSettings {
            capacity,
            overflow_policy,
        })
    }

    fn titles(queue: &SubscriptionQueue) -> Vec<String> {
        std::iter::from_fn(|| queue.try_recv())
            .map(|p| p.title)
            .collect()
    }

    #[test]
    fn fifo_order() {
        let q = queue(4, OverflowPolicy::DropNewest);

        for t in ["a", "b", "c"] {
            assert_eq!(q.offer(product(t)), Offer::Enqueued);
        }

        assert_eq!(titles(&q), ["a", "b", "c"]);
    }

    #[test]
    fn drop_newest_discards_incoming() {
        let q = queue(2, OverflowPolicy::DropNewest);

        q.offer(product("a"));
        q.offer(product("b"));
        assert_eq!(q.offer(product("c")), Offer::DroppedNewest);

        assert_eq!(q.dropped(), 1);
        assert_eq!(titles(&q), ["a", "b"]);
    }

    #[test]
    fn drop_oldest_evicts_head() {
        let q = queue(2, OverflowPolicy::DropOldest);

        q.offer(product("a"));
        q.offer(product("b"));
        assert_eq!(q.offer(product("c")), Offer::DisplacedOldest);

        assert_eq!(q.dropped(), 1);
        assert_eq!(titles(&q), ["b", "c"]);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let q = queue(0, OverflowPolicy::DropNewest);

        assert_eq!(q.capacity(), 1);
        assert_eq!(q.offer(product("a")), Offer::Enqueued);
    }

    #[test]
    fn closed_queue_rejects_and_discards() {
        let q = queue(4, OverflowPolicy::DropNewest);
        q.offer(product("a"));

        q.close();

        assert!(q.is_closed());
        assert!(q.is_empty());
        assert_eq!(q.offer(product("b")), Offer::Closed);
        assert!(q.try_recv().is_none());
    }

    #[test]
    fn recv_pending_until_offer() {
        let q = queue(4, OverflowPolicy::DropNewest);
        let mut recv = task::spawn(q.recv());

        assert_pending!(recv.poll());

        q.offer(product("a"));

        assert!(recv.is_woken());
        assert_ready_eq!(recv.poll(), Some(product("a")));
    }

    #[test]
    fn recv_returns_none_after_close() {
        let q = queue(4, OverflowPolicy::DropNewest);
        let mut recv = task::spawn(q.recv());

        assert_pending!(recv.poll());

        q.close();

        assert!(recv.is_woken());
        assert_ready_eq!(recv.poll(), None);
    }

    #[tokio::test]
    async fn recv_across_tasks() {
        let q = Arc::new(queue(4, OverflowPolicy::DropNewest));
        let consumer = {
            let q = Arc::clone(&q);
            tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(p) = q.recv().await {
                    got.push(p.title);
                    if got.len() == 3 {
                        break;
                    }
                }
                got
            })
        };

        for t in ["x", "y", "z"] {
            q.offer(product(t));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let got = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, ["x", "y", "z"]);
    }

    #[test_case("drop_newest", OverflowPolicy::DropNewest ; "snake newest")]
    #[test_case("drop-oldest", OverflowPolicy::DropOldest ; "kebab oldest")]
    #[test_case(" OLDEST ", OverflowPolicy::DropOldest ; "short uppercase")]
    #[test_case("newest", OverflowPolicy::DropNewest ; "short newest")]
    fn overflow_policy_parses(input: &str, expected: OverflowPolicy) {
        assert_eq!(input.parse::<OverflowPolicy>().unwrap(), expected);
    }

    #[test]
    fn overflow_policy_rejects_unknown() {
        assert!("block".parse::<OverflowPolicy>().is_err());
    }

    #[test]
    fn default_settings() {
        let settings = QueueSettings::default();

        assert_eq!(settings.capacity, 10);
        assert_eq!(settings.overflow_policy, OverflowPolicy::DropNewest);
    }
}
