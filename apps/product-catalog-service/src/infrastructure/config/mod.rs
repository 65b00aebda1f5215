//! Configuration Module
//!
//! Configuration loading for the product catalog service.

mod settings;

pub use settings::{ConfigError, FanoutSettings, ServerSettings, ServiceConfig};
