//! Product Catalog gRPC Server
//!
//! Implements `products.v1.ProductService` on top of the application
//! services.
//!
//! # RPCs
//!
//! - `GetVendorProductTypes` (unary): the vendor's product types
//! - `GetVendorProducts` (server streaming): catalog replay, then live products
//! - `SetVendorProducts` (client streaming): admin ingestion
//! - `ChatVendorSales` (bidirectional): echo chat
//!
//! Streaming responses are produced by a spawned task writing into a
//! bounded channel that tonic drains. A dropped channel receiver is how a
//! disconnected client is observed.

use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info, warn};

use super::convert::service_error_from_status;
use super::deadline::request_timeout;
use super::proto::products::v1::{
    AdminClientRequestProducts, ChatMessage, ClientRequestProducts, ClientRequestType,
    ClientResponseProducts, ClientResponseType, ProductCount,
    product_service_server::ProductService,
};
use crate::application::ServiceError;
use crate::application::ports::{
    ProductPublisher, ProductSink, RequestContext, SubmissionSource,
};
use crate::application::services::{IngestionService, SubscriptionService};
use crate::domain::catalog::{Catalog, Product, ProductFilter, Submission};
use crate::infrastructure::broadcast::SharedBroadcastHub;
use crate::infrastructure::metrics::{self, RpcMethod, StreamGuard};

/// Reply sent when the client half-closes a chat.
pub const CHAT_FAREWELL: &str = "goodbye";

/// How long a failed product stream waits for buffer room to deliver its final status.
const TERMINAL_STATUS_TIMEOUT: Duration = Duration::from_secs(5);

type BoxedStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;
type ResponseChannel<T> = (
    mpsc::Sender<Result<T, Status>>,
    mpsc::Receiver<Result<T, Status>>,
);

/// Configuration for the gRPC server.
#[derive(Debug, Clone)]
pub struct ProductCatalogServerConfig {
    /// Server version string.
    pub version: String,
    /// Per-stream response buffer.
    pub response_buffer: usize,
    /// Artificial delay before answering a product type lookup.
    pub product_types_delay: Duration,
}

impl Default for ProductCatalogServerConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            response_buffer: 16,
            product_types_delay: Duration::ZERO,
        }
    }
}

/// gRPC server for the product catalog.
#[derive(Debug)]
pub struct ProductCatalogServer {
    config: ProductCatalogServerConfig,
    catalog: Arc<Catalog>,
    broadcast_hub: SharedBroadcastHub,
    subscriptions: SubscriptionService,
    ingestion: IngestionService,
    shutdown: CancellationToken,
}

impl ProductCatalogServer {
    /// Create a new server.
    ///
    /// Every request context is a child of `shutdown`.
    #[must_use]
    pub fn new(
        config: ProductCatalogServerConfig,
        catalog: Arc<Catalog>,
        broadcast_hub: SharedBroadcastHub,
        shutdown: CancellationToken,
    ) -> Self {
        let subscriptions =
            SubscriptionService::new(Arc::clone(&catalog), Arc::clone(broadcast_hub.registry()));
        let publisher: Arc<dyn ProductPublisher> = broadcast_hub.clone();
        let ingestion = IngestionService::new(publisher);

        Self {
            config,
            catalog,
            broadcast_hub,
            subscriptions,
            ingestion,
            shutdown,
        }
    }

    /// Get the broadcast hub.
    #[must_use]
    pub const fn broadcast_hub(&self) -> &SharedBroadcastHub {
        &self.broadcast_hub
    }

    /// Get the server configuration.
    #[must_use]
    pub const fn config(&self) -> &ProductCatalogServerConfig {
        &self.config
    }

    fn request_context<T>(&self, request: &Request<T>) -> RequestContext {
        let ctx = RequestContext::new(self.shutdown.child_token());
        match request_timeout(request.metadata()) {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx,
        }
    }

    fn response_channel<T>(&self) -> ResponseChannel<T> {
        mpsc::channel(self.config.response_buffer.max(1))
    }
}

#[tonic::async_trait]
impl ProductService for ProductCatalogServer {
    type GetVendorProductsStream = BoxedStream<ClientResponseProducts>;
    type ChatVendorSalesStream = BoxedStream<ChatMessage>;

    async fn get_vendor_product_types(
        &self,
        request: Request<ClientRequestType>,
    ) -> Result<Response<ClientResponseType>, Status> {
        let ctx = self.request_context(&request);
        let vendor = request.into_inner().vendor;
        info!(vendor = %vendor, "Product types requested");

        let delay = self.config.product_types_delay;
        if !delay.is_zero() {
            tokio::select! {
                biased;
                err = ctx.done() => return Err(err.into()),
                () = tokio::time::sleep(delay) => {}
            }
        }

        let product_types = self
            .catalog
            .product_types(&vendor)
            .map_err(ServiceError::from)?;

        Ok(Response::new(ClientResponseType {
            product_type: join_product_types(&vendor, &product_types),
        }))
    }

    async fn get_vendor_products(
        &self,
        request: Request<ClientRequestProducts>,
    ) -> Result<Response<Self::GetVendorProductsStream>, Status> {
        let ctx = self.request_context(&request);
        let req = request.into_inner();
        let filter = ProductFilter::new(req.vendor, req.product_type);

        // Unknown vendors fail here, before a stream or registration exists.
        let open = self.subscriptions.open(filter)?;
        metrics::set_active_subscriptions(self.subscriptions.registry().len());

        let (tx, rx) = self.response_channel();
        let subscriptions = self.subscriptions.clone();

        tokio::spawn(async move {
            let _stream = StreamGuard::open(RpcMethod::GetVendorProducts);
            let mut sink = ResponseSink { tx };

            if let Err(err) = subscriptions.relay(open, &mut sink, &ctx).await {
                // Waits for room behind buffered items; fails at once if the receiver is gone.
                let delivered = tokio::time::timeout(
                    TERMINAL_STATUS_TIMEOUT,
                    sink.tx.send(Err(err.into())),
                )
                .await;
                if !matches!(delivered, Ok(Ok(()))) {
                    debug!("Product stream ended before its final status was delivered");
                }
            }

            metrics::set_active_subscriptions(subscriptions.registry().len());
        });

        let stream = ReceiverStream::new(rx);
        Ok(Response::new(Box::pin(stream) as Self::GetVendorProductsStream))
    }

    async fn set_vendor_products(
        &self,
        request: Request<Streaming<AdminClientRequestProducts>>,
    ) -> Result<Response<ProductCount>, Status> {
        let _stream = StreamGuard::open(RpcMethod::SetVendorProducts);
        let ctx = self.request_context(&request);
        let mut source = StreamingSource {
            inbound: request.into_inner(),
        };

        let summary = self.ingestion.ingest(&mut source, &ctx).await?;
        metrics::record_products_ingested(summary.count);
        metrics::record_ingest_duration(summary.elapsed);

        Ok(Response::new(ProductCount {
            count: i32::try_from(summary.count).unwrap_or(i32::MAX),
        }))
    }

    async fn chat_vendor_sales(
        &self,
        request: Request<Streaming<ChatMessage>>,
    ) -> Result<Response<Self::ChatVendorSalesStream>, Status> {
        let ctx = self.request_context(&request);
        let inbound = request.into_inner();
        let (tx, rx) = self.response_channel();

        tokio::spawn(async move {
            let _stream = StreamGuard::open(RpcMethod::ChatVendorSales);
            run_chat(inbound, tx, ctx).await;
        });

        let stream = ReceiverStream::new(rx);
        Ok(Response::new(Box::pin(stream) as Self::ChatVendorSalesStream))
    }
}

/// `"<vendor> <type>"` for each type, comma separated.
fn join_product_types(vendor: &str, product_types: &[&str]) -> String {
    product_types
        .iter()
        .map(|product_type| format!("{vendor} {product_type}"))
        .collect::<Vec<_>>()
        .join(",")
}

async fn run_chat(
    mut inbound: Streaming<ChatMessage>,
    tx: mpsc::Sender<Result<ChatMessage, Status>>,
    ctx: RequestContext,
) {
    let started = Instant::now();
    let mut received: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            err = ctx.done() => Err(Status::from(err)),
            next = inbound.message() => next,
        };

        match next {
            Ok(Some(message)) => {
                received += 1;
                info!(message = %message.message_content, "Chat message received");
                if tx.send(Ok(message)).await.is_err() {
                    break;
                }
            }
            Ok(None) => {
                info!(
                    received,
                    elapsed_secs = started.elapsed().as_secs(),
                    "Chat closed by client"
                );
                let farewell = ChatMessage {
                    message_content: CHAT_FAREWELL.to_string(),
                };
                let _ = tx.send(Ok(farewell)).await;
                break;
            }
            Err(status) => {
                warn!(received, code = ?status.code(), error = %status.message(), "Chat ended");
                let _ = tx.send(Err(status)).await;
                break;
            }
        }
    }
}

// =============================================================================
// Transport Adapters
// =============================================================================

struct ResponseSink {
    tx: mpsc::Sender<Result<ClientResponseProducts, Status>>,
}

#[async_trait]
impl ProductSink for ResponseSink {
    async fn send(&mut self, product: Product) -> Result<(), ServiceError> {
        self.tx
            .send(Ok(product.into()))
            .await
            .map_err(|_| ServiceError::Cancelled)
    }

    async fn closed(&self) {
        self.tx.closed().await;
    }
}

struct StreamingSource {
    inbound: Streaming<AdminClientRequestProducts>,
}

#[async_trait]
impl SubmissionSource for StreamingSource {
    async fn next_submission(&mut self) -> Result<Option<Submission>, ServiceError> {
        let Some(message) = self
            .inbound
            .message()
            .await
            .map_err(service_error_from_status)?
        else {
            return Ok(None);
        };
        Submission::try_from(message).map(Some)
    }
}

// =============================================================================
// Tests
// =============================================================================
