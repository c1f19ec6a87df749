//! Redis-backed store connection

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::FromRedisValue;
use tracing::{debug, trace};

use super::connection::StoreConnection;
use super::error::StoreError;
use crate::forwarding::Tunnel;

/// Store connection, optionally routed through a bastion tunnel.
///
/// The tunnel is owned by the connection and closed by `release`.
pub struct RedisConnection {
    conn: MultiplexedConnection,
    tunnel: Option<Tunnel>,
    timeout: Duration,
    released: bool,
}

impl RedisConnection {
    /// Dial `host:port` and select `database`
    pub async fn dial(
        host: &str,
        port: u16,
        database: u32,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let url = redis_url(host, port, database);
        debug!("Dialing store at {}:{} (db {})", host, port, database);

        let client = redis::Client::open(url.as_str())
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let conn = tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| StoreError::Timeout {
                verb: "CONNECT",
                secs: timeout.as_secs(),
            })?
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self {
            conn,
            tunnel: None,
            timeout,
            released: false,
        })
    }

    /// Attach the tunnel this connection was dialed through
    pub(crate) fn with_tunnel(mut self, tunnel: Tunnel) -> Self {
        self.tunnel = Some(tunnel);
        self
    }

    async fn run<T>(&mut self, verb: &'static str, cmd: redis::Cmd) -> Result<T, StoreError>
    where
        T: FromRedisValue + Send,
    {
        trace!("Calling {}", verb);
        match tokio::time::timeout(self.timeout, cmd.query_async(&mut self.conn)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StoreError::Command {
                verb,
                message: e.to_string(),
            }),
            Err(_) => Err(StoreError::Timeout {
                verb,
                secs: self.timeout.as_secs(),
            }),
        }
    }
}

#[async_trait]
impl StoreConnection for RedisConnection {
    async fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        self.run::<()>("SET", cmd).await
    }

    async fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.run::<Option<String>>("GET", cmd).await
    }

    async fn del(&mut self, key: &str) -> Result<(), StoreError> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        self.run::<()>("DEL", cmd).await
    }

    async fn multi(&mut self) -> Result<(), StoreError> {
        self.run::<()>("MULTI", redis::cmd("MULTI")).await
    }

    async fn exec(&mut self) -> Result<(), StoreError> {
        self.run::<()>("EXEC", redis::cmd("EXEC")).await
    }

    async fn discard(&mut self) -> Result<(), StoreError> {
        self.run::<()>("DISCARD", redis::cmd("DISCARD")).await
    }

    async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Some(mut tunnel) = self.tunnel.take() {
            tunnel.close().await;
        }
    }
}

/// `redis://host:port/db`, bracketing IPv6 literals
fn redis_url(host: &str, port: u16, database: u32) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("redis://[{}]:{}/{}", host, port, database)
    } else {
        format!("redis://{}:{}/{}", host, port, database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_url() {
        assert_eq!(redis_url("127.0.0.1", 6379, 0), "redis://127.0.0.1:6379/0");
        assert_eq!(redis_url("cache.internal", 6380, 4), "redis://cache.internal:6380/4");
        assert_eq!(redis_url("::1", 6379, 1), "redis://[::1]:6379/1");
    }

    #[tokio::test]
    async fn test_dial_refused_is_connection_error() {
        // Bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = RedisConnection::dial("127.0.0.1", port, 0, Duration::from_secs(5)).await;
        assert!(matches!(
            result,
            Err(StoreError::Connection(_)) | Err(StoreError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_silent_server_hits_deadline() {
        // Accepts connections and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let deadline = Duration::from_millis(300);
        let started = std::time::Instant::now();
        let err = match RedisConnection::dial("127.0.0.1", port, 1, deadline).await {
            Err(e) => e,
            Ok(mut conn) => conn.get("k").await.unwrap_err(),
        };

        assert!(matches!(err, StoreError::Timeout { .. }), "unexpected error: {}", err);
        assert!(started.elapsed() < Duration::from_secs(5));
        server.abort();
    }
}
