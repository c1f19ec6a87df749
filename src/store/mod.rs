//! Store Module
//!
//! Everything that talks to the key-value store.
//!
//! - `connection`: the command surface and the MULTI/EXEC/DISCARD block
//! - `provider`: endpoint routing and connection acquisition
//! - `redis`: the redis-backed connection

mod connection;
mod error;
#[cfg(test)]
pub(crate) mod memory;
mod provider;
mod redis;

pub use connection::{StoreConnection, Transaction, TransactionState};
pub use error::StoreError;
pub use provider::{ConnectionProvider, RedisConnector, Route};
pub use redis::RedisConnection;
