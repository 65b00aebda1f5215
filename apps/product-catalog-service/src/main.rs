//! Product Catalog Service Binary
//!
//! Starts the product catalog gRPC service and its health endpoint.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin product-catalog-service
//! ```
//!
//! # Environment Variables
//!
//! - `PRODUCT_CATALOG_GRPC_PORT`: gRPC server port (default: 8080)
//! - `PRODUCT_CATALOG_HEALTH_PORT`: Health check HTTP port (default: 8082)
//! - `PRODUCT_CATALOG_RESPONSE_BUFFER`: Per-stream response buffer (default: 16)
//! - `PRODUCT_CATALOG_QUEUE_CAPACITY`: Per-subscriber queue capacity (default: 10)
//! - `PRODUCT_CATALOG_OVERFLOW_POLICY`: drop_newest | drop_oldest (default: drop_newest)
//! - `PRODUCT_CATALOG_TYPES_DELAY_MS`: Delay before answering product type lookups (default: 0)
//! - `PRODUCT_CATALOG_PATH`: JSON catalog file (default: built-in catalog)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: product-catalog-service)
//! - `RUST_LOG`: Log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use product_catalog_service::domain::subscription::SubscriberRegistry;
use product_catalog_service::infrastructure::broadcast::{BroadcastConfig, BroadcastHub};
use product_catalog_service::infrastructure::grpc::proto::products::v1::product_service_server::ProductServiceServer;
use product_catalog_service::infrastructure::grpc::server::{
    ProductCatalogServer, ProductCatalogServerConfig,
};
use product_catalog_service::infrastructure::health::{HealthServer, HealthServerState};
use product_catalog_service::infrastructure::telemetry;
use product_catalog_service::{Catalog, ServiceConfig, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Product Catalog Service");

    // Initialize Prometheus metrics
    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Metrics recorder not installed");
    }

    let config = ServiceConfig::from_env()?;
    log_config(&config);

    let catalog = Arc::new(match &config.catalog_path {
        Some(path) => Catalog::from_json_file(path)?,
        None => Catalog::builtin(),
    });
    tracing::info!(vendors = ?catalog.vendors(), "Catalog loaded");

    let shutdown_token = CancellationToken::new();

    // Subscriber registry and fan-out
    let broadcast_config = BroadcastConfig::from(config.fanout);
    let registry = Arc::new(SubscriberRegistry::new(broadcast_config.into()));
    let broadcast_hub = Arc::new(BroadcastHub::new(Arc::clone(&registry)));

    // Initialize gRPC server
    let grpc_server_config = ProductCatalogServerConfig {
        version: env!("CARGO_PKG_VERSION").to_string(),
        response_buffer: config.server.response_buffer,
        product_types_delay: config.product_types_delay,
    };
    let grpc_server = Arc::new(ProductCatalogServer::new(
        grpc_server_config,
        Arc::clone(&catalog),
        Arc::clone(&broadcast_hub),
        shutdown_token.clone(),
    ));

    // Initialize health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&catalog),
        Arc::clone(&broadcast_hub),
        shutdown_token.clone(),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );

    // Spawn health server
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // Spawn gRPC server
    let grpc_addr = SocketAddr::from(([0, 0, 0, 0], config.server.grpc_port));
    let grpc_service = ProductServiceServer::from_arc(grpc_server);
    let grpc_shutdown = shutdown_token.clone();

    let grpc_task = tokio::spawn(async move {
        tracing::info!(addr = %grpc_addr, "gRPC server listening");
        if let Err(e) = Server::builder()
            .add_service(grpc_service)
            .serve_with_shutdown(grpc_addr, grpc_shutdown.cancelled_owned())
            .await
        {
            tracing::error!(error = %e, "gRPC server error");
        }
        tracing::info!("gRPC server stopped");
    });

    tracing::info!("Product catalog service ready");

    await_shutdown(&registry, &shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, grpc_task).await.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "gRPC server did not drain in time"
        );
    }

    tracing::info!("Product catalog service stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &ServiceConfig) {
    tracing::info!(
        grpc_port = config.server.grpc_port,
        health_port = config.server.health_port,
        queue_capacity = config.fanout.queue_capacity,
        overflow_policy = %config.fanout.overflow_policy,
        product_types_delay_ms = config.product_types_delay.as_millis(),
        "Configuration loaded"
    );
    tracing::debug!(
        catalog_path = ?config.catalog_path,
        response_buffer = config.server.response_buffer,
        "Service settings"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
///
/// Live subscription queues are closed before the shutdown token is
/// cancelled, so open product streams finish with OK.
async fn await_shutdown(registry: &SubscriberRegistry, shutdown_token: &CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    registry.close_all();
    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
