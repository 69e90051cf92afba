//! Persistent store behind the configuration and telemetry adapters.
//!
//! The store is a JSON tree addressed by logical paths (`config`,
//! `sensor/readings`, `sensor/current`). Writes go through a [`WriteBatch`]
//! that is applied all-or-nothing, which is what lets the ingest path append
//! to history and overwrite the current slot as one unit.

mod bounded;
mod document;
mod file;
mod memory;

pub use bounded::{BoundedStore, StorePolicy};
pub use document::Document;
pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::StoreError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

pub const CONFIG_PATH: &str = "config";
pub const READINGS_PATH: &str = "sensor/readings";
pub const CURRENT_READING_PATH: &str = "sensor/current";

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Field-level merge into the object at `path`.
    Merge {
        path: String,
        fields: Map<String, Value>,
    },
    /// Replace the value at `path`.
    Set { path: String, value: Value },
    /// Append under a server-generated, arrival-ordered key.
    Push { path: String, value: Value },
}

/// Ordered group of writes applied atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(mut self, path: impl Into<String>, fields: Map<String, Value>) -> Self {
        self.ops.push(WriteOp::Merge {
            path: path.into(),
            fields,
        });
        self
    }

    pub fn set(mut self, path: impl Into<String>, value: Value) -> Self {
        self.ops.push(WriteOp::Set {
            path: path.into(),
            value,
        });
        self
    }

    pub fn push(mut self, path: impl Into<String>, value: Value) -> Self {
        self.ops.push(WriteOp::Push {
            path: path.into(),
            value,
        });
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Value at `path`, or `None` if absent.
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Children of the object at `path` ordered by key.
    async fn list(&self, path: &str) -> Result<Vec<(String, Value)>, StoreError>;

    /// Apply every write in the batch or none of them. Returns push keys.
    async fn apply(&self, batch: WriteBatch) -> Result<Vec<String>, StoreError>;
}

fn decode<T: DeserializeOwned>(path: &str, value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Corrupt {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

/// Read and decode the record at `path`.
pub async fn read_record<T: DeserializeOwned>(
    store: &dyn Store,
    path: &str,
) -> Result<Option<T>, StoreError> {
    store
        .get(path)
        .await?
        .map(|value| decode(path, value))
        .transpose()
}

/// Read and decode every child of `path`, in key order.
pub async fn read_list<T: DeserializeOwned>(
    store: &dyn Store,
    path: &str,
) -> Result<Vec<T>, StoreError> {
    store
        .list(path)
        .await?
        .into_iter()
        .map(|(_, value)| decode(path, value))
        .collect()
}
