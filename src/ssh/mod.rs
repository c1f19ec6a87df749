//! SSH module - bastion connections for tunneled store access
//!
//! This module provides the SSH side of the tunnel using the russh library.
//!
//! # Features
//! - Public-key authentication with inline or file-based key material
//! - Host key policy: accept-and-log, or strict ~/.ssh/known_hosts checking
//! - Single-owner handle task shared by forwarding connections

mod client;
mod config;
mod error;
mod handle_owner;

pub use client::{ClientHandler, SshClient};
pub use config::{BastionConfig, PrivateKeySource, DEFAULT_SSH_PORT};
pub use error::SshError;
pub use handle_owner::{spawn_handle_owner_task, HandleCommand, HandleController};
