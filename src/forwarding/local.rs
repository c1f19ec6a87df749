//! Local Port Forwarding
//!
//! Forwards connections from an ephemeral loopback port to a remote
//! host:port through SSH.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::ssh::{HandleController, SshError};

/// Loopback address the forward listens on
const LOOPBACK: &str = "127.0.0.1:0";

/// Idle timeout for forwarded connections (5 minutes)
const FORWARD_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Default deadline for the bastion to open a direct-tcpip channel
const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Copy buffer size per direction
const BRIDGE_BUFFER_SIZE: usize = 32768;

/// Local port forwarding target
#[derive(Debug, Clone)]
pub struct LocalForward {
    /// Host to connect to, resolved on the bastion side
    pub remote_host: String,
    /// Port to connect to
    pub remote_port: u16,
    /// How long to wait for the bastion to open each channel
    pub open_timeout: Duration,
}

impl LocalForward {
    pub fn new(remote_host: impl Into<String>, remote_port: u16) -> Self {
        Self {
            remote_host: remote_host.into(),
            remote_port,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
        }
    }

    pub fn with_open_timeout(mut self, open_timeout: Duration) -> Self {
        self.open_timeout = open_timeout;
        self
    }
}

/// Statistics for a port forward
#[derive(Debug, Clone, Default)]
pub struct ForwardStats {
    /// Total connections handled
    pub connection_count: u64,
    /// Active connections right now
    pub active_connections: u64,
    /// Total bytes sent (client -> server)
    pub bytes_sent: u64,
    /// Total bytes received (server -> client)
    pub bytes_received: u64,
}

/// Handle to a running local port forward
pub struct LocalForwardHandle {
    /// Forward configuration
    pub config: LocalForward,
    /// Bound loopback address (ephemeral port)
    pub bound_addr: SocketAddr,
    stop_tx: mpsc::Sender<()>,
    task: Option<JoinHandle<()>>,
    stats: Arc<parking_lot::RwLock<ForwardStats>>,
}

impl LocalForwardHandle {
    /// Stop accepting and wait for the accept loop to exit
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        info!("Stopping local port forward on {}", self.bound_addr);
        let _ = self.stop_tx.send(()).await;
        if let Err(e) = task.await {
            if !e.is_cancelled() {
                warn!("Forward task on {} ended abnormally: {}", self.bound_addr, e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Get current statistics
    pub fn stats(&self) -> ForwardStats {
        self.stats.read().clone()
    }
}

impl Drop for LocalForwardHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            debug!("Aborting unstopped forward on {}", self.bound_addr);
            task.abort();
        }
    }
}

/// Start local port forwarding
///
/// Binds an ephemeral loopback port, spawns the accept loop and returns once
/// the loop has signalled that it is accepting. Each accepted connection is
/// bridged to a direct-tcpip channel opened through `handle_controller`.
pub async fn start_local_forward(
    handle_controller: HandleController,
    config: LocalForward,
) -> Result<LocalForwardHandle, SshError> {
    let listener = TcpListener::bind(LOOPBACK).await.map_err(|e| {
        SshError::ConnectionFailed(format!("Failed to bind forward listener: {}", e))
    })?;

    let bound_addr = listener
        .local_addr()
        .map_err(|e| SshError::ConnectionFailed(format!("Failed to get bound address: {}", e)))?;

    let (stop_tx, stop_rx) = mpsc::channel::<()>(1);
    let (ready_tx, ready_rx) = oneshot::channel::<()>();
    let stats = Arc::new(parking_lot::RwLock::new(ForwardStats::default()));
    let disconnect_rx = handle_controller.subscribe_disconnect();

    let task = tokio::spawn(accept_loop(
        listener,
        handle_controller,
        config.clone(),
        stop_rx,
        disconnect_rx,
        ready_tx,
        stats.clone(),
    ));

    ready_rx.await.map_err(|_| {
        SshError::ConnectionFailed("Forward task exited before becoming ready".to_string())
    })?;

    info!(
        "Started local port forward: {} -> {}:{}",
        bound_addr, config.remote_host, config.remote_port
    );

    Ok(LocalForwardHandle {
        config,
        bound_addr,
        stop_tx,
        task: Some(task),
        stats,
    })
}

async fn accept_loop(
    listener: TcpListener,
    handle_controller: HandleController,
    config: LocalForward,
    mut stop_rx: mpsc::Receiver<()>,
    mut disconnect_rx: broadcast::Receiver<()>,
    ready_tx: oneshot::Sender<()>,
    stats: Arc<parking_lot::RwLock<ForwardStats>>,
) {
    let _ = ready_tx.send(());

    loop {
        tokio::select! {
            _ = disconnect_rx.recv() => {
                info!("Local port forward stopped: SSH disconnected");
                break;
            }

            _ = stop_rx.recv() => {
                info!("Local port forward stopped by request");
                break;
            }

            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!("Failed to set TCP_NODELAY: {}", e);
                        }

                        debug!("Accepted connection from {} for forward", peer_addr);

                        {
                            let mut s = stats.write();
                            s.connection_count += 1;
                            s.active_connections += 1;
                        }

                        let controller = handle_controller.clone();
                        let target = config.clone();
                        let stats_for_conn = stats.clone();

                        tokio::spawn(async move {
                            let result = handle_forward_connection(
                                controller,
                                stream,
                                peer_addr,
                                &target,
                                stats_for_conn.clone(),
                            )
                            .await;

                            {
                                let mut s = stats_for_conn.write();
                                s.active_connections = s.active_connections.saturating_sub(1);
                            }

                            if let Err(e) = result {
                                warn!("Forward connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }

    let s = stats.read().clone();
    info!(
        "Local port forward task exited ({} connections, {} bytes sent, {} bytes received)",
        s.connection_count, s.bytes_sent, s.bytes_received
    );
}

/// Bridge one accepted connection through a direct-tcpip channel
async fn handle_forward_connection(
    handle_controller: HandleController,
    local_stream: TcpStream,
    peer_addr: SocketAddr,
    target: &LocalForward,
    stats: Arc<parking_lot::RwLock<ForwardStats>>,
) -> Result<(), SshError> {
    let channel = tokio::time::timeout(
        target.open_timeout,
        handle_controller.open_direct_tcpip(
            &target.remote_host,
            target.remote_port as u32,
            &peer_addr.ip().to_string(),
            peer_addr.port() as u32,
        ),
    )
    .await
    .map_err(|_| {
        SshError::Timeout(format!(
            "Channel open to {}:{} timed out after {}s",
            target.remote_host,
            target.remote_port,
            target.open_timeout.as_secs()
        ))
    })??;

    debug!(
        "Opened channel for forward to {}:{}",
        target.remote_host, target.remote_port
    );

    if let Err(e) = bridge(local_stream, channel.into_stream(), FORWARD_IDLE_TIMEOUT, &stats).await {
        debug!("Forward bridge ended with error: {}", e);
    }

    debug!("Forward connection closed");
    Ok(())
}

/// Copy bytes both ways until each side has sent EOF.
///
/// The idle clock is shared: it restarts whenever data moves in either
/// direction, and the bridge closes once `idle` passes with no traffic at
/// all. A long-lived connection that keeps talking is never cut.
async fn bridge<L, R>(
    local: L,
    remote: R,
    idle: Duration,
    stats: &parking_lot::RwLock<ForwardStats>,
) -> std::io::Result<()>
where
    L: AsyncRead + AsyncWrite,
    R: AsyncRead + AsyncWrite,
{
    let (mut local_read, mut local_write) = tokio::io::split(local);
    let (mut remote_read, mut remote_write) = tokio::io::split(remote);
    let mut up = vec![0u8; BRIDGE_BUFFER_SIZE];
    let mut down = vec![0u8; BRIDGE_BUFFER_SIZE];
    let mut local_open = true;
    let mut remote_open = true;

    while local_open || remote_open {
        let step = async {
            tokio::select! {
                read = local_read.read(&mut up), if local_open => match read? {
                    0 => {
                        local_open = false;
                        remote_write.shutdown().await?;
                    }
                    n => {
                        remote_write.write_all(&up[..n]).await?;
                        stats.write().bytes_sent += n as u64;
                    }
                },
                read = remote_read.read(&mut down), if remote_open => match read? {
                    0 => {
                        remote_open = false;
                        local_write.shutdown().await?;
                    }
                    n => {
                        local_write.write_all(&down[..n]).await?;
                        stats.write().bytes_received += n as u64;
                    }
                },
            }
            Ok::<_, std::io::Error>(())
        };

        match tokio::time::timeout(idle, step).await {
            Ok(result) => result?,
            Err(_) => {
                debug!("Forward connection idle for {}s, closing", idle.as_secs());
                break;
            }
        }
    }

    Ok(())
}
