//! Handle Owner Task
//!
//! Only one task owns the `Handle<ClientHandler>`. Forwarding connections
//! talk to it through a cloneable `HandleController` which sends commands
//! over an mpsc channel, so the handle is never shared behind a lock.

use russh::client::{Handle, Msg};
use russh::{Channel, Disconnect};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use super::client::ClientHandler;
use super::error::SshError;

/// Commands sent to the Handle Owner Task
pub enum HandleCommand {
    /// Open a direct-tcpip channel to the tunnel target
    ChannelOpenDirectTcpip {
        host: String,
        port: u32,
        originator_host: String,
        originator_port: u32,
        reply_tx: oneshot::Sender<Result<Channel<Msg>, russh::Error>>,
    },

    /// Disconnect the SSH connection
    Disconnect,
}

/// Controller for sending commands to the Handle Owner Task
#[derive(Clone)]
pub struct HandleController {
    cmd_tx: mpsc::Sender<HandleCommand>,
    /// Fires once when the owner task exits
    disconnect_tx: broadcast::Sender<()>,
}

impl HandleController {
    /// Create a controller around a raw command sender.
    ///
    /// Used by tests to stand in for a real SSH connection.
    pub fn new(cmd_tx: mpsc::Sender<HandleCommand>) -> Self {
        let (disconnect_tx, _) = broadcast::channel(1);
        Self {
            cmd_tx,
            disconnect_tx,
        }
    }

    /// Subscribe to SSH disconnect notifications
    pub fn subscribe_disconnect(&self) -> broadcast::Receiver<()> {
        self.disconnect_tx.subscribe()
    }

    /// Open a direct-tcpip channel
    pub async fn open_direct_tcpip(
        &self,
        host: &str,
        port: u32,
        originator_host: &str,
        originator_port: u32,
    ) -> Result<Channel<Msg>, SshError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(HandleCommand::ChannelOpenDirectTcpip {
                host: host.to_string(),
                port,
                originator_host: originator_host.to_string(),
                originator_port,
                reply_tx,
            })
            .await
            .map_err(|_| SshError::Disconnected)?;
        reply_rx
            .await
            .map_err(|_| SshError::Disconnected)?
            .map_err(|e| SshError::ChannelError(e.to_string()))
    }

    /// Disconnect the SSH connection
    pub async fn disconnect(&self) {
        let _ = self.cmd_tx.send(HandleCommand::Disconnect).await;
    }

    /// Non-blocking disconnect request, for use from `Drop`
    pub fn try_disconnect(&self) {
        let _ = self.cmd_tx.try_send(HandleCommand::Disconnect);
    }
}

/// Spawn the Handle Owner Task
///
/// Consumes the handle and returns a controller. The task exits on
/// `Disconnect` or when every controller has been dropped.
pub fn spawn_handle_owner_task(handle: Handle<ClientHandler>, label: String) -> HandleController {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<HandleCommand>(64);
    let (disconnect_tx, _) = broadcast::channel::<()>(1);
    let disconnect_tx_clone = disconnect_tx.clone();

    tokio::spawn(async move {
        let handle = handle;

        info!("Handle owner task started for {}", label);

        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                HandleCommand::ChannelOpenDirectTcpip {
                    host,
                    port,
                    originator_host,
                    originator_port,
                    reply_tx,
                } => {
                    let result = handle
                        .channel_open_direct_tcpip(&host, port, &originator_host, originator_port)
                        .await;
                    if reply_tx.send(result).is_err() {
                        warn!("Caller dropped before receiving direct_tcpip result");
                    }
                }

                HandleCommand::Disconnect => {
                    debug!("Disconnect requested for {}", label);
                    if let Err(e) = handle
                        .disconnect(Disconnect::ByApplication, "", "en")
                        .await
                    {
                        debug!("Disconnect for {} returned error: {}", label, e);
                    }
                    break;
                }
            }
        }

        let _ = disconnect_tx_clone.send(());
        info!("Handle owner task exited for {}", label);
    });

    HandleController {
        cmd_tx,
        disconnect_tx,
    }
}
