//! Service Errors
//!
//! Errors returned by the application handlers. The gRPC adapter maps each
//! variant onto a status code.

use thiserror::Error;

use crate::domain::catalog::CatalogError;

/// Boxed transport error carried through unchanged.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Handler failure.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request names something that does not exist.
    #[error("{0}")]
    InvalidArgument(String),

    /// The request was cancelled by the client or by server shutdown.
    #[error("request cancelled")]
    Cancelled,

    /// The request deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The transport failed while reading or writing.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),
}

impl ServiceError {
    /// Wrap a transport failure.
    pub fn transport(err: impl Into<BoxError>) -> Self {
        Self::Transport(err.into())
    }

    /// Whether the error ended the request because it was cancelled or timed out.
    #[must_use]
    pub const fn is_termination(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

impl From<CatalogError> for ServiceError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::UnknownVendor { .. } => Self::InvalidArgument(err.to_string()),
            // Load errors only arise at startup in `main`, before any request is served.
            CatalogError::Io { .. } | CatalogError::Parse(_) => Self::transport(err),
        }
    }
}
