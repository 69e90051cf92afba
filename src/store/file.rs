//! File-backed store: the whole document is kept in memory and rewritten to a
//! JSON file on every batch.
//!
//! A batch is first applied to a copy of the document, written to a temporary
//! file and renamed over the previous one. Only then is the in-memory copy
//! replaced, so a failed write leaves both the file and memory untouched.

use super::{Document, Store, WriteBatch};
use crate::error::StoreError;
use async_trait::async_trait;
use log::{error, info};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct FileStore {
    path: Arc<PathBuf>,
    doc: Arc<Mutex<Document>>,
}

impl FileStore {
    /// Open the store at `path`. A missing file starts an empty document; an
    /// unreadable or unparsable one is an error rather than silently reset.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let doc = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let doc: Document =
                    serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    })?;
                info!("[Store] Loaded {:?}", path);
                doc
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("[Store] No data file at {:?} (first run)", path);
                Document::default()
            }
            Err(e) => {
                error!("[Store] Failed to read {:?}: {}", path, e);
                return Err(e.into());
            }
        };

        Ok(Self {
            path: Arc::new(path),
            doc: Arc::new(Mutex::new(doc)),
        })
    }
}

async fn save(path: &Path, doc: &Document) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let data = serde_json::to_vec(doc)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl Store for FileStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.doc.lock().await.get(path).cloned())
    }

    async fn list(&self, path: &str) -> Result<Vec<(String, Value)>, StoreError> {
        self.doc.lock().await.list(path)
    }

    async fn apply(&self, batch: WriteBatch) -> Result<Vec<String>, StoreError> {
        let file = self.path.clone();
        let doc = self.doc.clone();
        // Run the commit on its own task so a caller-side timeout cannot
        // cancel it between the rename and the in-memory swap.
        let commit = tokio::spawn(async move {
            let mut current = doc.lock().await;
            let mut next = current.clone();
            let keys = next.apply(&batch)?;
            save(&file, &next).await?;
            *current = next;
            Ok::<_, StoreError>(keys)
        });
        commit
            .await
            .map_err(|e| StoreError::Unavailable(format!("commit task failed: {}", e)))?
    }
}
