//! Connection acquisition
//!
//! Turns an endpoint descriptor into a ready store connection, dialing either
//! the store directly or a loopback port forwarded through the bastion.

use async_trait::async_trait;
use tracing::{info, warn};

use super::connection::StoreConnection;
use super::redis::RedisConnection;
use crate::config::Endpoint;
use crate::forwarding::Tunnel;
use crate::reconciler::ReconcileError;
use crate::ssh::BastionConfig;

/// Source of store connections for lifecycle operations.
///
/// Each call returns a fresh connection owned by the caller, who must
/// `release` it when done.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn acquire(&self, endpoint: &Endpoint)
        -> Result<Box<dyn StoreConnection>, ReconcileError>;
}

/// How store traffic reaches the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    /// Dial `host:port`
    Direct { host: &'a str, port: u16 },
    /// Forward a loopback port through `bastion` to `target_host:target_port`
    Tunneled {
        bastion: &'a BastionConfig,
        target_host: &'a str,
        target_port: u16,
    },
}

impl<'a> Route<'a> {
    pub fn for_endpoint(endpoint: &'a Endpoint) -> Self {
        match &endpoint.bastion {
            Some(bastion) => Route::Tunneled {
                bastion,
                target_host: &endpoint.hostname,
                target_port: endpoint.port,
            },
            None => Route::Direct {
                host: &endpoint.hostname,
                port: endpoint.port,
            },
        }
    }
}

/// Redis connection provider
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisConnector;

impl RedisConnector {
    pub fn new() -> Self {
        Self
    }

    async fn acquire_redis(&self, endpoint: &Endpoint) -> Result<RedisConnection, ReconcileError> {
        match Route::for_endpoint(endpoint) {
            Route::Direct { host, port } => {
                RedisConnection::dial(host, port, endpoint.database, endpoint.timeout)
                    .await
                    .map_err(|source| ReconcileError::Connection {
                        addr: format!("{}:{}", host, port),
                        source,
                    })
            }
            Route::Tunneled {
                bastion,
                target_host,
                target_port,
            } => {
                let mut tunnel = Tunnel::open(bastion, target_host, target_port, endpoint.timeout)
                    .await
                    .map_err(|source| ReconcileError::Tunnel {
                        bastion: bastion.destination(),
                        source,
                    })?;

                let local = tunnel.local_addr();
                info!(
                    "Dialing store {}:{} through tunnel at {}",
                    target_host, target_port, local
                );

                match RedisConnection::dial(
                    &local.ip().to_string(),
                    local.port(),
                    endpoint.database,
                    endpoint.timeout,
                )
                .await
                {
                    Ok(conn) => Ok(conn.with_tunnel(tunnel)),
                    Err(source) => {
                        warn!("Store dial through tunnel failed, closing tunnel");
                        tunnel.close().await;
                        Err(ReconcileError::Connection {
                            addr: format!("{}:{} via {}", target_host, target_port, local),
                            source,
                        })
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ConnectionProvider for RedisConnector {
    async fn acquire(
        &self,
        endpoint: &Endpoint,
    ) -> Result<Box<dyn StoreConnection>, ReconcileError> {
        let conn = self.acquire_redis(endpoint).await?;
        Ok(Box::new(conn))
    }
}
