//! Subscription Handler
//!
//! Serves one live-product subscription: catalog replay first, then every
//! product published for the subscription's filter, until the request ends.
//!
//! # Lifecycle
//!
//! 1. `open`: look up the catalog and register the subscription
//! 2. replay the catalog names in order
//! 3. relay products from the subscription's own queue
//! 4. unregister on every exit path

use std::sync::Arc;

use tracing::{debug, info};

use crate::application::ServiceError;
use crate::application::ports::{ProductSink, RequestContext};
use crate::domain::catalog::{Catalog, Product, ProductFilter};
use crate::domain::subscription::{SubscriberRegistry, Subscription};

/// A registered subscription with its pending catalog replay.
#[derive(Debug)]
pub struct OpenSubscription {
    /// Catalog products to send before any live product.
    pub replay: Vec<Product>,
    /// The registered subscription.
    pub subscription: Subscription,
}

/// Products sent by a finished relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaySummary {
    /// Catalog products replayed.
    pub replayed: usize,
    /// Live products relayed.
    pub live: u64,
}

/// Serves server-streaming product subscriptions.
#[derive(Debug, Clone)]
pub struct SubscriptionService {
    catalog: Arc<Catalog>,
    registry: Arc<SubscriberRegistry>,
}

impl SubscriptionService {
    /// Create a handler over a catalog and registry.
    #[must_use]
    pub const fn new(catalog: Arc<Catalog>, registry: Arc<SubscriberRegistry>) -> Self {
        Self { catalog, registry }
    }

    /// The registry subscriptions are added to.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Validate the filter and register a subscription for it.
    ///
    /// Products published after this returns are queued for the
    /// subscription even while the replay is still being sent.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidArgument`] for an unknown vendor;
    /// nothing is registered in that case.
    pub fn open(&self, filter: ProductFilter) -> Result<OpenSubscription, ServiceError> {
        let names = self.catalog.lookup(&filter.vendor, &filter.product_type)?;
        let replay = names.iter().map(Product::from_catalog).collect();
        let subscription = self.registry.register(filter);

        info!(
            subscription_id = %subscription.id(),
            vendor = %subscription.filter().vendor,
            product_type = %subscription.filter().product_type,
            "Subscription opened"
        );

        Ok(OpenSubscription {
            replay,
            subscription,
        })
    }

    /// Send the replay, then live products, until the request ends.
    ///
    /// The subscription is unregistered before this returns.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Cancelled`] if the request is cancelled or the
    ///   subscriber disconnects
    /// - [`ServiceError::DeadlineExceeded`] if the deadline passes
    /// - whatever the sink returns from a failed send
    pub async fn relay<K>(
        &self,
        open: OpenSubscription,
        sink: &mut K,
        ctx: &RequestContext,
    ) -> Result<RelaySummary, ServiceError>
    where
        K: ProductSink + ?Sized,
    {
        let OpenSubscription {
            replay,
            subscription,
        } = open;

        let result = stream_products(&subscription, replay, sink, ctx).await;
        subscription.unregister();

        match &result {
            Ok(summary) => info!(
                subscription_id = %subscription.id(),
                replayed = summary.replayed,
                live = summary.live,
                "Subscription finished"
            ),
            Err(err) => info!(
                subscription_id = %subscription.id(),
                reason = %err,
                "Subscription ended"
            ),
        }

        result
    }

    /// [`open`](Self::open) followed by [`relay`](Self::relay).
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open) and [`relay`](Self::relay).
    pub async fn serve<K>(
        &self,
        filter: ProductFilter,
        sink: &mut K,
        ctx: &RequestContext,
    ) -> Result<RelaySummary, ServiceError>
    where
        K: ProductSink + ?Sized,
    {
        let open = self.open(filter)?;
        self.relay(open, sink, ctx).await
    }
}

async fn stream_products<K>(
    subscription: &Subscription,
    replay: Vec<Product>,
    sink: &mut K,
    ctx: &RequestContext,
) -> Result<RelaySummary, ServiceError>
where
    K: ProductSink + ?Sized,
{
    let mut summary = RelaySummary::default();

    for product in replay {
        send(sink, product, ctx).await?;
        summary.replayed += 1;
    }

    loop {
        let next = tokio::select! {
            biased;
            err = ctx.done() => return Err(err),
            () = sink.closed() => return Err(ServiceError::Cancelled),
            next = subscription.recv() => next,
        };

        // Queue closed: server shutdown.
        let Some(product) = next else {
            debug!(subscription_id = %subscription.id(), "Subscription queue closed");
            return Ok(summary);
        };

        send(sink, product, ctx).await?;
        summary.live += 1;
    }
}

async fn send<K>(sink: &mut K, product: Product, ctx: &RequestContext) -> Result<(), ServiceError>
where
    K: ProductSink + ?Sized,
{
    tokio::select! {
        biased;
        err = ctx.done() => Err(err),
        sent = sink.send(product) => sent,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::application::ports::MockProductSink;

    /// Sink backed by an mpsc channel, like the gRPC adapter's.
    struct ChannelSink(mpsc::Sender<Product>);

    #[async_trait]
    impl ProductSink for ChannelSink {
        async fn send(&mut self, product: Product) -> Result<(), ServiceError> {
            self.0
                .send(product)
                .await
                .map_err(|_| ServiceError::Cancelled)
        }

        async fn closed(&self) {
            self.0.closed().await;
        }
    }

    fn service() -> SubscriptionService {
        SubscriptionService::new(
            Arc::new(Catalog::builtin()),
            Arc::new(SubscriberRegistry::with_defaults()),
        )
    }

    async fn next_title(rx: &mut mpsc::Receiver<Product>) -> String {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap()
            .title
    }

    async fn wait_until_empty(registry: &SubscriberRegistry) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !registry.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[test]
    fn open_unknown_vendor_registers_nothing() {
        let service = service();

        let err = service
            .open(ProductFilter::new("ibm", "compute"))
            .unwrap_err();

        assert!(matches!(err, ServiceError::InvalidArgument(_)));
        assert!(service.registry().is_empty());
    }

    #[test]
    fn open_builds_replay_in_catalog_order() {
        let service = service();

        let open = service.open(ProductFilter::new("aws", "compute")).unwrap();

        let titles: Vec<_> = open.replay.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, ["ECS", "EKR", "AWS Fargate"]);
        assert!(open.replay.iter().all(|p| p.url == "sampleUrl"));
        assert!(service.registry().contains(open.subscription.id()));
    }

    #[test]
    fn open_unknown_type_replays_nothing() {
        let service = service();

        let open = service.open(ProductFilter::new("aws", "quantum")).unwrap();

        assert!(open.replay.is_empty());
        assert_eq!(service.registry().len(), 1);
    }

    #[tokio::test]
    async fn replay_precedes_live_products() {
        let service = service();
        let token = CancellationToken::new();
        let ctx = RequestContext::new(token.clone());
        let (tx, mut rx) = mpsc::channel(16);
        let open = service.open(ProductFilter::new("aws", "compute")).unwrap();
        let queue = Arc::clone(open.subscription.queue());

        // Published before the relay starts: must still come after replay.
        queue.offer(Product::new("Live", "u", "s"));

        let relay = {
            let service = service.clone();
            tokio::spawn(async move { service.relay(open, &mut ChannelSink(tx), &ctx).await })
        };

        let mut titles = Vec::new();
        for _ in 0..4 {
            titles.push(next_title(&mut rx).await);
        }
        assert_eq!(titles, ["ECS", "EKR", "AWS Fargate", "Live"]);

        token.cancel();
        let result = relay.await.unwrap();
        assert!(matches!(result, Err(ServiceError::Cancelled)));
        assert!(service.registry().is_empty());
    }

    #[tokio::test]
    async fn client_disconnect_unregisters() {
        let service = service();
        let (tx, rx) = mpsc::channel(16);
        let open = service.open(ProductFilter::new("oracle", "compute")).unwrap();

        let relay = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .relay(open, &mut ChannelSink(tx), &RequestContext::default())
                    .await
            })
        };

        drop(rx);

        let result = tokio::time::timeout(Duration::from_secs(1), relay)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(ServiceError::Cancelled)));
        wait_until_empty(service.registry()).await;
    }

    #[tokio::test]
    async fn send_failure_unregisters() {
        let service = service();
        let mut sink = MockProductSink::new();
        sink.expect_send().times(1).returning(|_| {
            Err(ServiceError::transport(std::io::Error::other("stream reset")))
        });
        sink.expect_closed().returning(|| ());
        let open = service.open(ProductFilter::new("aws", "storage")).unwrap();

        let err = service
            .relay(open, &mut sink, &RequestContext::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Transport(_)));
        assert!(service.registry().is_empty());
    }

    #[tokio::test]
    async fn queue_close_ends_relay_cleanly() {
        let service = service();
        let (tx, mut rx) = mpsc::channel(16);
        let open = service.open(ProductFilter::new("oracle", "storage")).unwrap();

        let relay = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .relay(open, &mut ChannelSink(tx), &RequestContext::default())
                    .await
            })
        };

        assert_eq!(next_title(&mut rx).await, "Oracle ZFS");
        assert_eq!(next_title(&mut rx).await, "Oracle StorageTek");

        service.registry().close_all();

        let summary = tokio::time::timeout(Duration::from_secs(1), relay)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(summary.replayed, 2);
        assert_eq!(summary.live, 0);
        assert!(service.registry().is_empty());
    }

    #[tokio::test]
    async fn deadline_ends_relay() {
        let service = service();
        let (tx, _rx) = mpsc::channel(16);
        let ctx = RequestContext::default().with_timeout(Duration::from_millis(30));

        let err = service
            .serve(
                ProductFilter::new("google", "compute"),
                &mut ChannelSink(tx),
                &ctx,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::DeadlineExceeded));
        assert!(service.registry().is_empty());
    }

    #[tokio::test]
    async fn serve_unknown_vendor_fails_fast() {
        let service = service();
        let mut sink = MockProductSink::new();
        sink.expect_send().never();

        let err = service
            .serve(
                ProductFilter::new("ibm", "compute"),
                &mut sink,
                &RequestContext::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::InvalidArgument(_)));
        assert!(service.registry().is_empty());
    }
}
