//! Store Error types

use thiserror::Error;

/// Command-level store failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{verb} rejected: {message}")]
    Command { verb: &'static str, message: String },

    #[error("{verb} timed out after {secs}s")]
    Timeout { verb: &'static str, secs: u64 },

    #[error("Connection failed: {0}")]
    Connection(String),
}
