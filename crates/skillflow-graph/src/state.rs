//! Shared state passed between graph nodes

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A node's output: the keys it wants to write.
pub type PartialState = BTreeMap<String, Value>;

/// How a written value combines with what the key already holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// Last write wins.
    #[default]
    Replace,
    /// Values accumulate into a JSON array.
    Append,
}

/// Key/value state with per-key merge strategies.
///
/// Keys without a declared strategy use [`KeyStrategy::Replace`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SharedState {
    values: BTreeMap<String, Value>,
    #[serde(default)]
    strategies: BTreeMap<String, KeyStrategy>,
}

impl SharedState {
    pub fn new() -> Self { Self::default() }

    pub fn with_strategies(strategies: BTreeMap<String, KeyStrategy>) -> Self {
        Self { values: BTreeMap::new(), strategies }
    }

    /// `None` when the key was never written. A stored JSON `null` is
    /// `Some(Value::Null)`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize { self.values.len() }

    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    pub fn values(&self) -> &BTreeMap<String, Value> { &self.values }

    pub fn into_values(self) -> BTreeMap<String, Value> { self.values }

    pub fn strategy(&self, key: &str) -> KeyStrategy {
        self.strategies.get(key).copied().unwrap_or_default()
    }

    /// Merge one value under the key's strategy.
    pub fn merge(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let merged = match self.strategy(&key) {
            KeyStrategy::Replace => value,
            KeyStrategy::Append => append(self.values.remove(&key), value),
        };
        self.values.insert(key, merged);
    }

    pub fn merge_all(&mut self, partial: PartialState) {
        for (key, value) in partial {
            self.merge(key, value);
        }
    }
}

fn append(existing: Option<Value>, incoming: Value) -> Value {
    let mut items = match existing {
        None => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => vec![other],
    };
    match incoming {
        Value::Array(more) => items.extend(more),
        other => items.push(other),
    }
    Value::Array(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn partial(pairs: &[(&str, Value)]) -> PartialState {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn replace_is_last_write_wins_and_idempotent() {
        let mut s = SharedState::new();
        s.merge_all(partial(&[("a", json!(1))]));
        s.merge_all(partial(&[("a", json!(2))]));
        assert_eq!(s.get("a"), Some(&json!(2)));

        let before = s.clone();
        s.merge_all(partial(&[("a", json!(2))]));
        assert_eq!(s, before);
    }

    #[test]
    fn append_accumulates() {
        let mut s = SharedState::with_strategies([("trace".to_string(), KeyStrategy::Append)].into());
        s.merge("trace", json!("a"));
        s.merge("trace", json!(["b", "c"]));
        s.merge("trace", json!("d"));
        assert_eq!(s.get("trace"), Some(&json!(["a", "b", "c", "d"])));
    }

    #[test]
    fn null_differs_from_absent() {
        let mut s = SharedState::new();
        s.merge("empty", Value::Null);
        assert_eq!(s.get("empty"), Some(&Value::Null));
        assert_eq!(s.get("missing"), None);
        assert!(s.contains("empty"));
        assert_eq!(s.get_str("empty"), None);
    }
}
