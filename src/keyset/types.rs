//! Keyset type

use std::collections::btree_map;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A flat mapping of string keys to string values.
///
/// Backed by a `BTreeMap` so iteration is always in key order, which keeps
/// command sequences and fingerprints independent of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Keyset(BTreeMap<String, String>);

impl Keyset {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Insert or replace a value, returning the previous one
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub(crate) fn entries(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }
}

impl<K, V> FromIterator<(K, V)> for Keyset
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Keyset
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl IntoIterator for Keyset {
    type Item = (String, String);
    type IntoIter = btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_irrelevant() {
        let a = Keyset::from([("a", "1"), ("b", "2")]);
        let b = Keyset::from([("b", "2"), ("a", "1")]);
        assert_eq!(a, b);
        assert_eq!(a.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_json_is_flat_object() {
        let keyset: Keyset = serde_json::from_str(r#"{"x":"1","y":""}"#).unwrap();
        assert_eq!(keyset.get("x"), Some("1"));
        assert_eq!(keyset.get("y"), Some(""));
        assert_eq!(keyset.get("z"), None);
        assert_eq!(serde_json::to_string(&keyset).unwrap(), r#"{"x":"1","y":""}"#);
    }

    #[test]
    fn test_nested_values_rejected() {
        let result: Result<Keyset, _> = serde_json::from_str(r#"{"x":{"y":"1"}}"#);
        assert!(result.is_err());
    }
}
