//! The [`DataBag`] threaded through a pipeline run.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Accumulating key/value state of one pipeline run.
///
/// Created empty when a run starts, grown by merging each node's output and
/// dropped when the run ends. Merging is shallow and last-write-wins: a key
/// written by a later node replaces the earlier value wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataBag(Map<String, Value>);

impl DataBag {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns the value under `key` if it is a JSON string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Stores `value` under `key`, returning the value it replaced.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style [`DataBag::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Moves every entry of `other` into this bag, overwriting on collision.
    pub fn merge(&mut self, other: DataBag) {
        for (key, value) in other.0 {
            self.0.insert(key, value);
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the bag has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl From<Map<String, Value>> for DataBag {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for DataBag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_is_last_write_wins() {
        let mut bag = DataBag::new().with("x", 1).with("keep", "a");
        bag.merge(DataBag::new().with("x", 2).with("new", true));

        assert_eq!(bag.get("x"), Some(&json!(2)));
        assert_eq!(bag.get("keep"), Some(&json!("a")));
        assert_eq!(bag.get("new"), Some(&json!(true)));
        assert_eq!(bag.len(), 3);
    }

    #[test]
    fn test_merge_is_shallow() {
        let mut bag = DataBag::new().with("meta", json!({"a": 1, "b": 2}));
        bag.merge(DataBag::new().with("meta", json!({"c": 3})));
        assert_eq!(bag.get("meta"), Some(&json!({"c": 3})));
    }

    #[test]
    fn test_get_str_only_matches_strings() {
        let bag = DataBag::new().with("text", "hi").with("count", 3);
        assert_eq!(bag.get_str("text"), Some("hi"));
        assert_eq!(bag.get_str("count"), None);
        assert_eq!(bag.get_str("absent"), None);
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let bag: DataBag = [("a", 1)].into_iter().collect();
        assert_eq!(serde_json::to_value(&bag).unwrap(), json!({"a": 1}));
    }
}
