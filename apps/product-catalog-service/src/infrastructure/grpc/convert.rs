//! Conversions between wire messages and domain types.

use tonic::{Code, Status};

use super::proto::products::v1::{AdminClientRequestProducts, ClientResponseProducts, ProdsPrep};
use crate::application::ServiceError;
use crate::domain::catalog::{Product, Submission};

impl From<Product> for ProdsPrep {
    fn from(product: Product) -> Self {
        Self {
            title: product.title,
            url: product.url,
            short_url: product.short_url,
        }
    }
}

impl From<ProdsPrep> for Product {
    fn from(wire: ProdsPrep) -> Self {
        Self::new(wire.title, wire.url, wire.short_url)
    }
}

impl From<Product> for ClientResponseProducts {
    fn from(product: Product) -> Self {
        Self {
            product: Some(product.into()),
        }
    }
}

impl TryFrom<AdminClientRequestProducts> for Submission {
    type Error = ServiceError;

    fn try_from(request: AdminClientRequestProducts) -> Result<Self, Self::Error> {
        let product = request
            .product
            .ok_or_else(|| ServiceError::InvalidArgument("product is required".to_string()))?;
        Ok(Self::new(product.into(), request.vendor, request.product_type))
    }
}

impl From<ServiceError> for Status {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidArgument(message) => Self::invalid_argument(message),
            ServiceError::Cancelled => Self::cancelled("request cancelled"),
            ServiceError::DeadlineExceeded => Self::deadline_exceeded("deadline exceeded"),
            ServiceError::Transport(source) => match source.downcast::<Self>() {
                Ok(status) => *status,
                Err(other) => Self::unknown(other.to_string()),
            },
        }
    }
}

/// Classify a failed read from a client stream.
pub fn service_error_from_status(status: Status) -> ServiceError {
    if status.code() == Code::Cancelled {
        ServiceError::Cancelled
    } else {
        ServiceError::transport(status)
    }
}
