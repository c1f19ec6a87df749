//! Store endpoint configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ssh::BastionConfig;

pub const ENV_HOSTNAME: &str = "REDISDB_HOSTNAME";
pub const ENV_PORT: &str = "REDISDB_PORT";
pub const ENV_DATABASE: &str = "REDISDB_DATABASE";
pub const ENV_TIMEOUT_SECS: &str = "REDISDB_TIMEOUT_SECS";
pub const ENV_BASTION_HOST: &str = "BASTION_HOST";
pub const ENV_BASTION_USER: &str = "BASTION_USER";
pub const ENV_BASTION_PRIVATE_KEY: &str = "BASTION_PRIVATE_KEY";

pub const DEFAULT_HOSTNAME: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_DATABASE: u32 = 0;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Placeholder some deployments export for an unset bastion host
const NIL_SENTINEL: &str = "nil";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port {0:?}: expected an integer in 1..=65535")]
    InvalidPort(String),

    #[error("Invalid database index {0:?}: expected a non-negative integer")]
    InvalidDatabase(String),

    #[error("Invalid timeout {0:?}: expected a positive number of seconds")]
    InvalidTimeout(String),
}

/// Resolved store endpoint descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub hostname: String,
    pub port: u16,
    pub database: u32,
    /// Present only when host, user and key were all supplied
    pub bastion: Option<BastionConfig>,
    /// Deadline for connection setup and for each store command
    pub timeout: Duration,
}

impl Endpoint {
    /// Direct endpoint with default database and timeout
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            database: DEFAULT_DATABASE,
            bastion: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_bastion(mut self, bastion: BastionConfig) -> Self {
        self.bastion = Some(bastion);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(DEFAULT_HOSTNAME, DEFAULT_PORT)
    }
}

/// A value that may arrive as a JSON string or number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(u64),
    Text(String),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Scalar::Number(n) => n.to_string(),
            Scalar::Text(s) => s,
        }
    }
}

/// Per-resource endpoint fields as supplied by the caller.
///
/// Every field is optional; unset fields fall back to the environment and
/// then to the built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub hostname: Option<String>,
    pub port: Option<Scalar>,
    pub database: Option<Scalar>,
    pub bastion_host: Option<String>,
    pub bastion_user: Option<String>,
    /// Inline key material or a path to a key file
    pub bastion_private_key: Option<String>,
    pub timeout_secs: Option<u64>,
    pub strict_host_key_checking: bool,
}

impl EndpointConfig {
    /// Resolve against the process environment
    pub fn resolve(self) -> Result<Endpoint, ConfigError> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve against an arbitrary variable lookup
    pub fn resolve_with<F>(self, env: F) -> Result<Endpoint, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |explicit: Option<String>, var: &str| -> Option<String> {
            explicit
                .or_else(|| env(var))
                .filter(|v| !v.trim().is_empty())
        };

        let hostname = pick(self.hostname, ENV_HOSTNAME)
            .unwrap_or_else(|| DEFAULT_HOSTNAME.to_string());

        let port = match pick(self.port.map(Scalar::into_text), ENV_PORT) {
            Some(raw) => parse_port(&raw)?,
            None => DEFAULT_PORT,
        };

        let database = match pick(self.database.map(Scalar::into_text), ENV_DATABASE) {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidDatabase(raw))?,
            None => DEFAULT_DATABASE,
        };

        let timeout_secs = match self.timeout_secs {
            Some(0) => return Err(ConfigError::InvalidTimeout("0".to_string())),
            Some(secs) => secs,
            None => match env(ENV_TIMEOUT_SECS).filter(|v| !v.trim().is_empty()) {
                Some(raw) => match raw.trim().parse::<u64>() {
                    Ok(secs) if secs > 0 => secs,
                    _ => return Err(ConfigError::InvalidTimeout(raw)),
                },
                None => DEFAULT_TIMEOUT_SECS,
            },
        };

        let bastion_host = pick(self.bastion_host, ENV_BASTION_HOST)
            .filter(|h| h.trim() != NIL_SENTINEL)
            .unwrap_or_default();
        let bastion_user = pick(self.bastion_user, ENV_BASTION_USER).unwrap_or_default();
        let bastion_key = pick(self.bastion_private_key, ENV_BASTION_PRIVATE_KEY).unwrap_or_default();

        let bastion = BastionConfig::from_parts(&bastion_host, &bastion_user, &bastion_key)
            .map(|b| b.strict(self.strict_host_key_checking));

        Ok(Endpoint {
            hostname,
            port,
            database,
            bastion,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    match raw.trim().parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(ConfigError::InvalidPort(raw.to_string())),
    }
}
