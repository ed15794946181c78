//! Per-instance key/value store threaded through every node executor.
//!
//! Values are opaque JSON to the engine. Workflows should declare their keys
//! once as [`ContextKey`] constants so reads and writes agree on the shape.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use crate::CoreError;

/// Key/value store owned by exactly one flow instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowContext {
    values: HashMap<String, Value>,
}

/// Typed handle for a context entry
pub struct ContextKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ContextKey<T> {
    /// Declare a key
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// Raw key name
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for ContextKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ContextKey<T> {}

impl<T> fmt::Debug for ContextKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContextKey").field(&self.name).finish()
    }
}

impl FlowContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value for a key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Raw value for a key, or `ContextValueMissing`
    pub fn require(&self, key: &str) -> Result<&Value, CoreError> {
        self.values
            .get(key)
            .ok_or_else(|| CoreError::ContextValueMissing(key.to_string()))
    }

    /// Store a raw value, returning the previous one
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    /// Remove a value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Whether the key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the context holds no entries
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over entries
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Deserialize a value if present
    pub fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CoreError> {
        match self.values.get(key) {
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
                CoreError::SerializationError(format!("Context key '{}': {}", key, e))
            }),
            None => Ok(None),
        }
    }

    /// Serialize and store a value
    pub fn set_typed<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> Result<(), CoreError> {
        let value = serde_json::to_value(value)?;
        self.values.insert(key.into(), value);
        Ok(())
    }

    /// Read a typed key, `None` when absent
    pub fn find<T: DeserializeOwned>(&self, key: ContextKey<T>) -> Result<Option<T>, CoreError> {
        self.get_typed(key.name())
    }

    /// Read a typed key that an earlier node must have written
    pub fn fetch<T: DeserializeOwned>(&self, key: ContextKey<T>) -> Result<T, CoreError> {
        self.find(key)?
            .ok_or_else(|| CoreError::ContextValueMissing(key.name().to_string()))
    }

    /// Write a typed key
    pub fn put<T: Serialize>(&mut self, key: ContextKey<T>, value: &T) -> Result<(), CoreError> {
        self.set_typed(key.name(), value)
    }
}

impl From<HashMap<String, Value>> for FlowContext {
    fn from(values: HashMap<String, Value>) -> Self {
        Self { values }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for FlowContext {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Allocation {
        hosts: Vec<String>,
    }

    const ALLOCATION: ContextKey<Allocation> = ContextKey::new("allocation");
    const CLUSTER_ID: ContextKey<String> = ContextKey::new("cluster_id");

    #[test]
    fn test_get_set() {
        let mut ctx = FlowContext::new();
        assert!(ctx.is_empty());
        assert!(ctx.get("missing").is_none());

        assert_eq!(ctx.set("cluster_id", json!("c-1")), None);
        assert_eq!(ctx.set("cluster_id", json!("c-2")), Some(json!("c-1")));
        assert_eq!(ctx.get("cluster_id"), Some(&json!("c-2")));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_require_missing() {
        let ctx = FlowContext::new();
        assert_eq!(
            ctx.require("task_id"),
            Err(CoreError::ContextValueMissing("task_id".to_string()))
        );
    }

    #[test]
    fn test_typed_keys() {
        let mut ctx = FlowContext::new();
        assert_eq!(ctx.find(ALLOCATION).unwrap(), None);
        assert!(matches!(ctx.fetch(CLUSTER_ID), Err(CoreError::ContextValueMissing(_))));

        let allocation = Allocation {
            hosts: vec!["10.0.0.1".to_string()],
        };
        ctx.put(ALLOCATION, &allocation).unwrap();
        ctx.put(CLUSTER_ID, &"c-9".to_string()).unwrap();

        assert_eq!(ctx.fetch(ALLOCATION).unwrap(), allocation);
        assert_eq!(ctx.fetch(CLUSTER_ID).unwrap(), "c-9");
    }

    #[test]
    fn test_typed_shape_mismatch() {
        let mut ctx = FlowContext::new();
        ctx.set("allocation", json!("not an allocation"));
        assert!(matches!(ctx.find(ALLOCATION), Err(CoreError::SerializationError(_))));
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let ctx: FlowContext = vec![("a", json!(1))].into_iter().collect();
        assert_eq!(serde_json::to_value(&ctx).unwrap(), json!({"a": 1}));

        let back: FlowContext = serde_json::from_value(json!({"a": 1})).unwrap();
        assert_eq!(back, ctx);
    }

    #[test]
    fn test_clones_are_isolated() {
        let mut original = FlowContext::new();
        original.set("k", json!("v"));

        let mut copy = original.clone();
        copy.set("k", json!("changed"));

        assert_eq!(original.get("k"), Some(&json!("v")));
    }
}
