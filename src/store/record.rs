//! Records and the shared handles callers mutate in place.

use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A JSON object stored under one identifier.
pub type Record = Map<String, Value>;

/// Live reference to a cached record.
///
/// Cloning the handle shares the record; every mutation made through any
/// clone is what the next flush writes out.
#[derive(Clone, Debug, Default)]
pub struct RecordHandle {
    inner: Arc<Mutex<Record>>,
}

impl RecordHandle {
    pub fn new(record: Record) -> Self {
        Self {
            inner: Arc::new(Mutex::new(record)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Record> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the record as it is right now.
    pub fn snapshot(&self) -> Record {
        self.lock().clone()
    }

    /// Mutate the record under its lock.
    pub fn update<T>(&self, f: impl FnOnce(&mut Record) -> T) -> T {
        let mut record = self.lock();
        f(&mut record)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    /// Set one key, returning the previous value.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.lock().insert(key.into(), value)
    }

    /// True when both handles point at the same cached record.
    pub fn ptr_eq(&self, other: &RecordHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Serialize with 2-space indentation while holding the record lock.
    pub(crate) fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&*self.lock())
    }
}

/// Fill `record` up to the key set of `base`.
///
/// The result has exactly the keys of `base`, in `base` order. Values come
/// from `record` when present, otherwise from the base defaults.
pub fn reconcile(base: &Record, record: &Record) -> Record {
    base.iter()
        .map(|(key, default)| {
            let value = record.get(key).unwrap_or(default).clone();
            (key.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_reconcile_fills_missing_keys() {
        let base = object(json!({"lang": "en", "muted": false, "count": 0}));
        let record = object(json!({"muted": true}));

        let result = reconcile(&base, &record);
        assert_eq!(Value::Object(result), json!({"lang": "en", "muted": true, "count": 0}));
    }

    #[test]
    fn test_reconcile_key_set_and_order_follow_base() {
        let base = object(json!({"b": 1, "a": 2, "c": 3}));
        let record = object(json!({"c": 30, "extra": "x", "a": null}));

        let result = reconcile(&base, &record);
        let keys: Vec<&str> = result.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
        assert_eq!(result["a"], Value::Null);
        assert_eq!(result["c"], json!(30));
        assert!(!result.contains_key("extra"));
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let base = object(json!({"x": [1, 2], "y": {"z": 1}}));
        let record = object(json!({"y": {"z": 5}}));

        let once = reconcile(&base, &record);
        let twice = reconcile(&base, &once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_handle_shares_mutations() {
        let handle = RecordHandle::new(object(json!({"n": 1})));
        let other = handle.clone();

        other.set("n", json!(2));
        handle.update(|r| {
            r.insert("m".to_string(), json!("hi"));
        });

        assert!(handle.ptr_eq(&other));
        assert_eq!(handle.get("n"), Some(json!(2)));
        assert_eq!(other.get("m"), Some(json!("hi")));
        assert_eq!(handle.snapshot().len(), 2);
    }

    #[test]
    fn test_pretty_json_uses_two_spaces() {
        let handle = RecordHandle::new(object(json!({"a": {"b": 1}})));
        let text = handle.to_pretty_json().unwrap();
        assert_eq!(text, "{\n  \"a\": {\n    \"b\": 1\n  }\n}");
    }
}
