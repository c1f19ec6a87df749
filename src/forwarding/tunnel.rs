//! Bastion tunnel
//!
//! Owns one SSH connection and one local forward. The tunnel lives exactly as
//! long as the store connection dialed through it: `close` tears down both
//! halves, and dropping an unclosed tunnel aborts the forward and requests
//! an SSH disconnect.

use std::net::SocketAddr;
use std::time::Duration;

use tracing::{info, warn};

use super::local::{start_local_forward, LocalForward, LocalForwardHandle};
use crate::ssh::{spawn_handle_owner_task, BastionConfig, HandleController, SshClient, SshError};

pub struct Tunnel {
    forward: LocalForwardHandle,
    controller: HandleController,
    closed: bool,
}

impl Tunnel {
    /// Connect to the bastion and start forwarding a loopback port to
    /// `target_host:target_port`.
    ///
    /// Returns only after the listener is accepting, so the caller may dial
    /// `local_addr()` immediately. `timeout` bounds the SSH connect and
    /// every channel open on the bastion.
    pub async fn open(
        bastion: &BastionConfig,
        target_host: &str,
        target_port: u16,
        timeout: Duration,
    ) -> Result<Self, SshError> {
        let handle = SshClient::new(bastion.clone(), timeout).connect().await?;
        let controller = spawn_handle_owner_task(handle, bastion.destination());

        let forward = match start_local_forward(
            controller.clone(),
            LocalForward::new(target_host, target_port).with_open_timeout(timeout),
        )
        .await
        {
            Ok(forward) => forward,
            Err(e) => {
                controller.disconnect().await;
                return Err(e);
            }
        };

        info!(
            "Tunnel {} -> {} -> {}:{} ready",
            forward.bound_addr,
            bastion.destination(),
            target_host,
            target_port
        );

        Ok(Self {
            forward,
            controller,
            closed: false,
        })
    }

    /// Loopback address to dial instead of the target
    pub fn local_addr(&self) -> SocketAddr {
        self.forward.bound_addr
    }

    /// Stop forwarding and disconnect from the bastion
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        self.forward.stop().await;
        self.controller.disconnect().await;
        info!("Tunnel on {} closed", self.forward.bound_addr);
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        if !self.closed {
            warn!("Tunnel on {} dropped without close", self.forward.bound_addr);
            self.controller.try_disconnect();
            // LocalForwardHandle aborts its own task on drop
        }
    }
}
