//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Ingestion**: Products received on admin streams and stream durations
//! - **Fan-out**: Products published, delivered and dropped on full queues
//! - **Subscriptions**: Active live subscriptions
//! - **Streams**: Open gRPC streams by RPC
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::subscription::OverflowPolicy;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed, e.g. because
/// another global recorder is already set.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Ingestion
    describe_counter!(
        "product_catalog_products_ingested_total",
        "Total products received on admin ingestion streams"
    );
    describe_histogram!(
        "product_catalog_ingest_duration_seconds",
        "Duration of completed ingestion streams"
    );

    // Fan-out
    describe_counter!(
        "product_catalog_products_published_total",
        "Total products published to the fan-out engine"
    );
    describe_counter!(
        "product_catalog_deliveries_total",
        "Total products queued for live subscribers"
    );
    describe_counter!(
        "product_catalog_deliveries_dropped_total",
        "Total products lost to full subscriber queues"
    );

    // Subscriptions and streams
    describe_gauge!(
        "product_catalog_active_subscriptions",
        "Number of registered live subscriptions"
    );
    describe_gauge!(
        "product_catalog_grpc_streams",
        "Number of open gRPC streams by RPC"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for RPC methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcMethod {
    /// Unary product type lookup.
    GetVendorProductTypes,
    /// Server-streaming live products.
    GetVendorProducts,
    /// Client-streaming admin ingestion.
    SetVendorProducts,
    /// Bidirectional chat.
    ChatVendorSales,
}

impl RpcMethod {
    const fn as_str(self) -> &'static str {
        match self {
            Self::GetVendorProductTypes => "get_vendor_product_types",
            Self::GetVendorProducts => "get_vendor_products",
            Self::SetVendorProducts => "set_vendor_products",
            Self::ChatVendorSales => "chat_vendor_sales",
        }
    }
}

/// Record products read from an admin stream.
pub fn record_products_ingested(count: u64) {
    counter!("product_catalog_products_ingested_total").increment(count);
}

/// Record the duration of a completed ingestion stream.
pub fn record_ingest_duration(duration: Duration) {
    histogram!("product_catalog_ingest_duration_seconds").record(duration.as_secs_f64());
}

/// Record one published product.
pub fn record_product_published() {
    counter!("product_catalog_products_published_total").increment(1);
}

/// Record products queued for subscribers.
pub fn record_deliveries(count: u64) {
    counter!("product_catalog_deliveries_total").increment(count);
}

/// Record products dropped on full queues.
pub fn record_deliveries_dropped(policy: OverflowPolicy, count: u64) {
    counter!(
        "product_catalog_deliveries_dropped_total",
        "policy" => policy.as_str()
    )
    .increment(count);
}

/// Update the active subscription count.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_subscriptions(count: usize) {
    gauge!("product_catalog_active_subscriptions").set(count as f64);
}

/// Tracks one open gRPC stream for as long as it is alive.
#[derive(Debug)]
#[must_use = "the stream is counted only while the guard is alive"]
pub struct StreamGuard {
    method: RpcMethod,
}

impl StreamGuard {
    /// Count a newly opened stream.
    pub fn open(method: RpcMethod) -> Self {
        gauge!("product_catalog_grpc_streams", "rpc" => method.as_str()).increment(1.0);
        Self { method }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        gauge!("product_catalog_grpc_streams", "rpc" => self.method.as_str()).decrement(1.0);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_method_as_str() {
        assert_eq!(
            RpcMethod::GetVendorProductTypes.as_str(),
            "get_vendor_product_types"
        );
        assert_eq!(RpcMethod::GetVendorProducts.as_str(), "get_vendor_products");
        assert_eq!(RpcMethod::SetVendorProducts.as_str(), "set_vendor_products");
        assert_eq!(RpcMethod::ChatVendorSales.as_str(), "chat_vendor_sales");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_products_ingested(3);
        record_product_published();
        record_deliveries_dropped(OverflowPolicy::DropOldest, 1);
        set_active_subscriptions(2);
        let guard = StreamGuard::open(RpcMethod::ChatVendorSales);
        drop(guard);
    }
}
