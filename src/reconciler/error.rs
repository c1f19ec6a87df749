//! Reconciler Error types

use thiserror::Error;

use super::resource::Lifecycle;
use crate::config::ConfigError;
use crate::ssh::SshError;
use crate::store::StoreError;

/// Failure of a lifecycle operation.
///
/// Every variant is terminal for the operation in progress; nothing is
/// retried. The display string names the deepest cause.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Invalid endpoint configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to connect to store at {addr}: {source}")]
    Connection {
        addr: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to open tunnel through {bastion}: {source}")]
    Tunnel {
        bastion: String,
        #[source]
        source: SshError,
    },

    #[error("SET failed on key {key:?}: {source}")]
    StoreWrite {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Update failed at {stage}: {source}")]
    StoreUpdate {
        stage: String,
        #[source]
        source: StoreError,
    },

    #[error("DEL failed on key {key:?}: {source}")]
    StoreDelete {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("GET failed on key {key:?}: {source}")]
    StoreRead {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Cannot {operation} a keyset that is {state}")]
    InvalidTransition {
        operation: &'static str,
        state: Lifecycle,
    },
}

// Diagnostics cross the orchestrator boundary as their rendered message
impl serde::Serialize for ReconcileError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
