//! Resource identity
//!
//! The fingerprint names a resource instance. It is derived from the keyset
//! once, at creation, and is never recomputed when the content later changes.
//!
//! Collisions between distinct keysets are possible (64-bit truncation) and
//! are not detected.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::types::Keyset;

/// Stable identifier of a managed keyset
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Adopt an existing identifier (e.g. on import)
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the fingerprint of a keyset's content.
///
/// Entries are hashed in key order with length prefixes, so the result only
/// depends on the (key, value) pairs. The first 8 bytes of the SHA-256 digest
/// are rendered as a decimal `u64`.
pub fn derive_identity(keyset: &Keyset) -> ResourceId {
    let mut hasher = Sha256::new();
    hasher.update((keyset.len() as u64).to_be_bytes());
    for (key, value) in keyset.iter() {
        hasher.update((key.len() as u64).to_be_bytes());
        hasher.update(key.as_bytes());
        hasher.update((value.len() as u64).to_be_bytes());
        hasher.update(value.as_bytes());
    }
    let digest = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    ResourceId(u64::from_be_bytes(prefix).to_string())
}
