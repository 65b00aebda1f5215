//! Service Configuration Settings
//!
//! Configuration types for the product catalog service, loaded from
//! environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::subscription::{DEFAULT_QUEUE_CAPACITY, OverflowPolicy};

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// gRPC server port.
    pub grpc_port: u16,
    /// Health check HTTP port.
    pub health_port: u16,
    /// Per-stream response buffer between a handler and the transport.
    pub response_buffer: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            grpc_port: 8080,
            health_port: 8082,
            response_buffer: 16,
        }
    }
}

/// Live fan-out settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanoutSettings {
    /// Capacity of each subscriber queue.
    pub queue_capacity: usize,
    /// Behaviour of a full subscriber queue.
    pub overflow_policy: OverflowPolicy,
}

impl Default for FanoutSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Server port settings.
    pub server: ServerSettings,
    /// Live fan-out settings.
    pub fanout: FanoutSettings,
    /// Artificial delay before answering a product type lookup.
    pub product_types_delay: Duration,
    /// JSON catalog file; the built-in catalog is used when unset.
    pub catalog_path: Option<PathBuf>,
}

impl ServiceConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// Unset and empty variables take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an invalid value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };
        let server_defaults = ServerSettings::default();
        let fanout_defaults = FanoutSettings::default();

        let server = ServerSettings {
            grpc_port: env.parse("PRODUCT_CATALOG_GRPC_PORT", server_defaults.grpc_port)?,
            health_port: env.parse("PRODUCT_CATALOG_HEALTH_PORT", server_defaults.health_port)?,
            response_buffer: env.positive(
                "PRODUCT_CATALOG_RESPONSE_BUFFER",
                server_defaults.response_buffer,
            )?,
        };

        let fanout = FanoutSettings {
            queue_capacity: env.positive(
                "PRODUCT_CATALOG_QUEUE_CAPACITY",
                fanout_defaults.queue_capacity,
            )?,
            overflow_policy: env.parse(
                "PRODUCT_CATALOG_OVERFLOW_POLICY",
                fanout_defaults.overflow_policy,
            )?,
        };

        let product_types_delay =
            Duration::from_millis(env.parse("PRODUCT_CATALOG_TYPES_DELAY_MS", 0_u64)?);

        let catalog_path = env.get("PRODUCT_CATALOG_PATH").map(PathBuf::from);

        Ok(Self {
            server,
            fanout,
            product_types_delay,
            catalog_path,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has a value that cannot be used.
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(value) = self.get(key) else {
            return Ok(default);
        };
        value.parse().map_err(|err: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: err.to_string(),
            value,
        })
    }

    fn positive(&self, key: &str, default: usize) -> Result<usize, ConfigError> {
        match self.parse(key, default)? {
            0 => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            }),
            n => Ok(n),
        }
    }
}
