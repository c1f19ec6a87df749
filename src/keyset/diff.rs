//! Keyset differ
//!
//! Computes the structural changes between two versions of a keyset by
//! walking both key-ordered maps in lockstep.

use std::cmp::Ordering;
use std::fmt;

use super::types::Keyset;

/// One unit of difference between two keysets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Key present only in the new keyset
    Create { key: String, value: String },
    /// Key present in both with a different value
    Update { key: String, value: String },
    /// Key present only in the old keyset
    Delete { key: String, old_value: String },
}

impl Change {
    pub fn key(&self) -> &str {
        match self {
            Change::Create { key, .. } | Change::Update { key, .. } | Change::Delete { key, .. } => {
                key
            }
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Create { key, .. } => write!(f, "create {}", key),
            Change::Update { key, .. } => write!(f, "update {}", key),
            Change::Delete { key, .. } => write!(f, "delete {}", key),
        }
    }
}

/// Diff `old` against `new`.
///
/// Records come out in ascending key order. Absence and the empty string are
/// distinct: `{"k": ""}` against `{}` is a Delete, not an Update.
pub fn diff(old: &Keyset, new: &Keyset) -> Vec<Change> {
    let mut changes = Vec::new();
    let mut old_iter = old.entries().peekable();
    let mut new_iter = new.entries().peekable();

    loop {
        let order = match (old_iter.peek(), new_iter.peek()) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some((old_key, _)), Some((new_key, _))) => old_key.cmp(new_key),
        };

        match order {
            Ordering::Less => {
                if let Some((key, old_value)) = old_iter.next() {
                    changes.push(Change::Delete {
                        key: key.clone(),
                        old_value: old_value.clone(),
                    });
                }
            }
            Ordering::Greater => {
                if let Some((key, value)) = new_iter.next() {
                    changes.push(Change::Create {
                        key: key.clone(),
                        value: value.clone(),
                    });
                }
            }
            Ordering::Equal => {
                if let (Some((_, old_value)), Some((key, value))) = (old_iter.next(), new_iter.next()) {
                    if old_value != value {
                        changes.push(Change::Update {
                            key: key.clone(),
                            value: value.clone(),
                        });
                    }
                }
            }
        }
    }

    changes
}
