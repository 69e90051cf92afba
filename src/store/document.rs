//! JSON document tree addressed by slash-separated logical paths.
//!
//! Shared by the in-memory and file-backed stores. Writes are applied as a
//! batch on a copy of the tree and swapped in only when every operation
//! succeeded, so a failed batch never leaves a partial write behind.

use super::{WriteBatch, WriteOp};
use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Sequence for server-generated push keys.
    next_key: u64,
    data: Value,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            next_key: 0,
            data: Value::Object(Map::new()),
        }
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Push keys sort lexicographically in arrival order.
fn push_key(seq: u64) -> String {
    format!("{:020}", seq)
}

impl Document {
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut node = &self.data;
        for seg in segments(path) {
            node = node.as_object()?.get(seg)?;
        }
        if node.is_null() { None } else { Some(node) }
    }

    /// Children of the object at `path`, ordered by key.
    pub fn list(&self, path: &str) -> Result<Vec<(String, Value)>, StoreError> {
        match self.get(path) {
            None => Ok(Vec::new()),
            Some(Value::Object(map)) => {
                let mut entries: Vec<(String, Value)> =
                    map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                Ok(entries)
            }
            Some(_) => Err(StoreError::NotAnObject(path.to_string())),
        }
    }

    /// Apply a batch atomically. Returns the keys generated by push operations,
    /// in operation order.
    pub fn apply(&mut self, batch: &WriteBatch) -> Result<Vec<String>, StoreError> {
        let mut next = self.clone();
        let mut keys = Vec::new();
        for op in batch.ops() {
            if let Some(key) = next.apply_op(op)? {
                keys.push(key);
            }
        }
        *self = next;
        Ok(keys)
    }

    fn apply_op(&mut self, op: &WriteOp) -> Result<Option<String>, StoreError> {
        match op {
            WriteOp::Merge { path, fields } => {
                let target = object_at(&mut self.data, path)?;
                for (k, v) in fields {
                    target.insert(k.clone(), v.clone());
                }
                Ok(None)
            }
            WriteOp::Set { path, value } => {
                let (parent, leaf) = match path.rsplit_once('/') {
                    Some((parent, leaf)) => (parent, leaf),
                    None => ("", path.as_str()),
                };
                if leaf.is_empty() {
                    return Err(StoreError::NotAnObject(path.clone()));
                }
                object_at(&mut self.data, parent)?.insert(leaf.to_string(), value.clone());
                Ok(None)
            }
            WriteOp::Push { path, value } => {
                let key = push_key(self.next_key);
                self.next_key += 1;
                object_at(&mut self.data, path)?.insert(key.clone(), value.clone());
                Ok(Some(key))
            }
        }
    }
}

/// Walk to the object at `path`, creating empty objects for absent or null
/// nodes on the way.
fn object_at<'a>(
    root: &'a mut Value,
    path: &str,
) -> Result<&'a mut Map<String, Value>, StoreError> {
    let mut node = root;
    for seg in segments(path) {
        let map = node
            .as_object_mut()
            .ok_or_else(|| StoreError::NotAnObject(path.to_string()))?;
        node = map.entry(seg.to_string()).or_insert(Value::Null);
        if node.is_null() {
            *node = Value::Object(Map::new());
        }
    }
    if node.is_null() {
        *node = Value::Object(Map::new());
    }
    node.as_object_mut()
        .ok_or_else(|| StoreError::NotAnObject(path.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_merge_keeps_other_fields() {
        let mut doc = Document::default();
        doc.apply(&WriteBatch::new().merge("config", fields(json!({"a": 1, "b": 2}))))
            .unwrap();
        doc.apply(&WriteBatch::new().merge("config", fields(json!({"b": 3, "c": 4}))))
            .unwrap();
        assert_eq!(doc.get("config"), Some(&json!({"a": 1, "b": 3, "c": 4})));
    }

    #[test]
    fn test_set_replaces_record() {
        let mut doc = Document::default();
        doc.apply(&WriteBatch::new().set("sensor/current", json!({"x": 1})))
            .unwrap();
        doc.apply(&WriteBatch::new().set("sensor/current", json!({"y": 2})))
            .unwrap();
        assert_eq!(doc.get("sensor/current"), Some(&json!({"y": 2})));
    }

    #[test]
    fn test_push_keys_keep_arrival_order() {
        let mut doc = Document::default();
        let mut keys = Vec::new();
        for i in 0..12 {
            keys.extend(
                doc.apply(&WriteBatch::new().push("sensor/readings", json!(i)))
                    .unwrap(),
            );
        }
        let listed = doc.list("sensor/readings").unwrap();
        assert_eq!(listed.len(), 12);
        for (i, (key, value)) in listed.iter().enumerate() {
            assert_eq!(key, &keys[i]);
            assert_eq!(value, &json!(i));
        }
    }

    #[test]
    fn test_failed_batch_leaves_document_untouched() {
        let mut doc = Document::default();
        doc.apply(&WriteBatch::new().set("leaf", json!(5))).unwrap();

        let batch = WriteBatch::new()
            .push("sensor/readings", json!(1))
            .merge("leaf/child", fields(json!({"a": 1})));
        assert!(doc.apply(&batch).is_err());

        assert!(doc.list("sensor/readings").unwrap().is_empty());
        assert_eq!(doc.get("leaf"), Some(&json!(5)));
        // The failed push must not consume a key either.
        let keys = doc
            .apply(&WriteBatch::new().push("sensor/readings", json!(2)))
            .unwrap();
        assert_eq!(keys, vec![push_key(0)]);
    }

    #[test]
    fn test_missing_paths() {
        let doc = Document::default();
        assert_eq!(doc.get("config"), None);
        assert!(doc.list("sensor/readings").unwrap().is_empty());
    }
}
