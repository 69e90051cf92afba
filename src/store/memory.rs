//! Volatile store, used for tests and `IRRIGATION_STORE=memory`.

use super::{Document, Store, WriteBatch};
use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

#[derive(Debug, Default)]
pub struct MemoryStore {
    doc: RwLock<Document>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.doc.read().get(path).cloned())
    }

    async fn list(&self, path: &str) -> Result<Vec<(String, Value)>, StoreError> {
        self.doc.read().list(path)
    }

    async fn apply(&self, batch: WriteBatch) -> Result<Vec<String>, StoreError> {
        self.doc.write().apply(&batch)
    }
}
