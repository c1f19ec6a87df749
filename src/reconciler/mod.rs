//! Reconciler Module
//!
//! Converges the store to a declared keyset.
//!
//! # Lifecycle
//! ```text
//! Absent --create--> Created --read--> Observed --update--> Observed ... --delete--> Deleted
//! ```
//!
//! `Reconciler` exposes the four lifecycle operations as plain functions of
//! their inputs; `ManagedKeyset` layers the resource state machine and the
//! write-once identity on top.

mod engine;
mod error;
mod resource;

pub use engine::Reconciler;
pub use error::ReconcileError;
pub use resource::{Lifecycle, ManagedKeyset};
