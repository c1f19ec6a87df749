//! SSH Client implementation using russh

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use russh::client::{self, Handle};
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::{PublicKey, PublicKeyBase64};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::config::BastionConfig;
use super::error::SshError;

/// Connects and authenticates to a bastion
pub struct SshClient {
    config: BastionConfig,
    timeout: Duration,
}

impl SshClient {
    pub fn new(config: BastionConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    /// Connect to the bastion and return an authenticated handle
    pub async fn connect(self) -> Result<Handle<ClientHandler>, SshError> {
        let addr = (self.config.host.clone(), self.config.port);

        info!("Connecting to bastion {}", self.config.destination());

        // Load the key first so a bad key never costs a handshake
        let key = self.config.private_key.load()?;

        let ssh_config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            ..Default::default()
        };

        let handler = ClientHandler::new(
            self.config.host.clone(),
            self.config.port,
            self.config.strict_host_key_checking,
        );

        let mut handle = tokio::time::timeout(
            self.timeout,
            client::connect(Arc::new(ssh_config), addr, handler),
        )
        .await
        .map_err(|_| SshError::Timeout("Bastion connection timed out".to_string()))??;

        debug!("SSH handshake completed");

        let key_with_hash = PrivateKeyWithHashAlg::new(Arc::new(key), None);
        let authenticated = tokio::time::timeout(
            self.timeout,
            handle.authenticate_publickey(&self.config.username, key_with_hash),
        )
        .await
        .map_err(|_| SshError::Timeout("Bastion authentication timed out".to_string()))?
        .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?;

        if !authenticated.success() {
            return Err(SshError::AuthenticationFailed(format!(
                "Public key rejected by {}",
                self.config.destination()
            )));
        }

        info!("SSH authentication successful");

        Ok(handle)
    }
}

/// Client handler for russh callbacks
///
/// Only host key verification is customized; the tunnel never accepts
/// server-initiated channels.
pub struct ClientHandler {
    host: String,
    port: u16,
    strict: bool,
}

impl ClientHandler {
    pub fn new(host: String, port: u16, strict: bool) -> Self {
        Self { host, port, strict }
    }
}

/// OpenSSH-style `SHA256:...` fingerprint
pub(crate) fn fingerprint(key: &PublicKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.public_key_bytes());
    let hash = hasher.finalize();
    format!("SHA256:{}", BASE64.encode(hash).trim_end_matches('='))
}

impl client::Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = fingerprint(server_public_key);

        if !self.strict {
            info!(
                "Accepting bastion host key for {}:{} (fingerprint: {})",
                self.host, self.port, fingerprint
            );
            return Ok(true);
        }

        match russh::keys::check_known_hosts(&self.host, self.port, server_public_key) {
            Ok(true) => {
                info!("Host key verified for {}:{}", self.host, self.port);
                Ok(true)
            }
            Ok(false) => {
                warn!(
                    "Unknown host key for {}:{} (fingerprint: {}). Strict mode enabled, rejecting.",
                    self.host, self.port, fingerprint
                );
                Err(SshError::HostKeyRejected(format!(
                    "unknown host {}:{} (fingerprint: {})",
                    self.host, self.port, fingerprint
                )))
            }
            Err(e) => {
                warn!(
                    "Host key check failed for {}:{} (fingerprint: {}): {}",
                    self.host, self.port, fingerprint, e
                );
                Err(SshError::HostKeyRejected(format!(
                    "{}:{} (fingerprint: {}): {}",
                    self.host, self.port, fingerprint, e
                )))
            }
        }
    }
}
