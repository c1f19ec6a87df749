//! Keyset Module
//!
//! The managed resource content: a flat map of string keys to string values,
//! plus the two pure computations over it.
//!
//! - `diff` turns two versions of a keyset into the minimal change set
//! - `identity` derives the fingerprint assigned once at creation

mod diff;
mod identity;
mod types;

pub use diff::{diff, Change};
pub use identity::{derive_identity, ResourceId};
pub use types::Keyset;
