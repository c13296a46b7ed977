//! String-keyed map that keeps insertion order
//!
//! A thin wrapper over [`IndexMap`], serialized as a plain JSON object.
//! [`QuestionMap`] (short column key → question text) is the main user: its
//! order is the column order of the source file.

use crate::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderedMap<V> {
    entries: IndexMap<String, V>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; new keys go at the end, replaced keys keep their slot
    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        self.entries.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.entries.get_mut(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.entries.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Position of a key in map order
    pub fn position(&self, key: &str) -> Option<usize> {
        self.entries.get_index_of(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> FromIterator<(String, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<V: Serialize> OrderedMap<V> {
    /// Pretty JSON with four-space indentation
    pub fn to_json_pretty(&self) -> Result<String> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut ser)?;
        String::from_utf8(out).map_err(|e| Error::Internal(e.to_string()))
    }
}

impl<V: for<'de> Deserialize<'de>> OrderedMap<V> {
    /// Parse a JSON object
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Short column key (`q1`, `q2`, ...) → question text
pub type QuestionMap = OrderedMap<String>;

impl OrderedMap<String> {
    /// Generate `q1..qN` keys for the given headers
    pub fn from_headers(headers: &[String]) -> Self {
        headers
            .iter()
            .enumerate()
            .map(|(i, h)| (format!("q{}", i + 1), h.clone()))
            .collect()
    }

    /// Question text for a key, falling back to the key itself
    pub fn question_text<'a>(&'a self, key: &'a str) -> &'a str {
        self.get(key).map(String::as_str).unwrap_or(key)
    }

    pub fn values(&self) -> Vec<String> {
        self.entries.values().cloned().collect()
    }

    /// Question text → key, for renaming columns read with their original headers
    pub fn reversed(&self) -> HashMap<String, String> {
        self.entries
            .iter()
            .map(|(k, v)| (v.clone(), k.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_follow_header_order() {
        let headers = vec!["Age".to_string(), "Gender".to_string()];
        let map = QuestionMap::from_headers(&headers);
        assert_eq!(map.keys(), vec!["q1", "q2"]);
        assert_eq!(map.get("q2").map(String::as_str), Some("Gender"));
        assert_eq!(map.question_text("q9"), "q9");
    }

    #[test]
    fn test_json_order_preserved() {
        let text = r#"{"q10": "Last", "q2": "Second", "q1": "First"}"#;
        let map = QuestionMap::from_json(text).unwrap();
        assert_eq!(map.keys(), vec!["q10", "q2", "q1"]);

        let written = serde_json::to_string(&map).unwrap();
        assert_eq!(written, r#"{"q10":"Last","q2":"Second","q1":"First"}"#);
    }

    #[test]
    fn test_json_value_keeps_twelve_keys_in_order() {
        let headers: Vec<String> = (1..=12).map(|i| format!("Question {}", i)).collect();
        let map = QuestionMap::from_headers(&headers);
        let value: serde_json::Value = serde_json::from_str(&map.to_json_pretty().unwrap()).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(&keys[..3], &["q1", "q2", "q3"]);
        assert_eq!(keys[11], "q12");
    }

    #[test]
    fn test_pretty_json_uses_four_spaces() {
        let map = QuestionMap::from_headers(&["A".to_string()]);
        assert_eq!(map.to_json_pretty().unwrap(), "{\n    \"q1\": \"A\"\n}");
    }

    #[test]
    fn test_non_string_values_rejected() {
        assert!(QuestionMap::from_json(r#"{"q1": 5}"#).is_err());
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut map: OrderedMap<i32> = OrderedMap::new();
        map.insert("b", 1);
        map.insert("a", 2);
        map.insert("b", 3);
        assert_eq!(map.keys(), vec!["b", "a"]);
        assert_eq!(map.get("b"), Some(&3));
        assert_eq!(map.position("a"), Some(1));
        assert_eq!(map.remove("b"), Some(3));
        assert_eq!(map.position("a"), Some(0));
        assert_eq!(map.len(), 1);
    }
}
