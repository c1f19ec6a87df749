//! Configuration Module
//!
//! Resolves the store endpoint from explicit fields with environment
//! variable fallbacks.

mod endpoint;

pub use endpoint::{
    ConfigError, Endpoint, EndpointConfig, DEFAULT_DATABASE, DEFAULT_HOSTNAME, DEFAULT_PORT,
    DEFAULT_TIMEOUT_SECS, ENV_BASTION_HOST, ENV_BASTION_PRIVATE_KEY, ENV_BASTION_USER,
    ENV_DATABASE, ENV_HOSTNAME, ENV_PORT, ENV_TIMEOUT_SECS, Scalar,
};
