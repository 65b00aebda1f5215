//! gRPC Adapter
//!
//! Exposes the `products.v1.ProductService` API over tonic.
//!
//! # Architecture
//!
//! Each RPC is a thin translation layer:
//!
//! 1. Build a `RequestContext` from the shutdown token and `grpc-timeout`
//! 2. Convert wire messages to domain types
//! 3. Run the matching application service
//! 4. Map `ServiceError` back to a gRPC `Status`
//!
//! The message and service bindings under `proto/` are generated from
//! `proto/products/v1/products.proto` and checked in.

mod convert;
pub mod deadline;
pub mod server;

// Allow clippy warnings and missing docs in generated code
#[allow(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]
pub mod proto {
    pub mod products {
        pub mod v1 {
            include!("proto/products.v1.rs");
        }
    }
}

pub use convert::service_error_from_status;
pub use deadline::{GRPC_TIMEOUT_HEADER, parse_grpc_timeout};
pub use server::{CHAT_FAREWELL, ProductCatalogServer, ProductCatalogServerConfig};
