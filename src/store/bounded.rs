//! Timeout and bounded retry around any [`Store`].
//!
//! Reads are idempotent and retried up to `read_attempts` times, each attempt
//! bounded by `timeout`. Writes get a single attempt: retrying a push could
//! duplicate a history entry. A commit cannot be recalled once started, so a
//! write that outlives `timeout` is logged and awaited to its real outcome;
//! reporting it as failed while it lands later would leave subscribers behind
//! the store.

use super::{Store, WriteBatch};
use crate::error::StoreError;
use async_trait::async_trait;
use log::warn;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorePolicy {
    pub timeout: Duration,
    pub read_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for StorePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            read_attempts: 3,
            retry_backoff: Duration::from_millis(50),
        }
    }
}

pub struct BoundedStore<S> {
    inner: S,
    policy: StorePolicy,
}

impl<S: Store> BoundedStore<S> {
    pub fn new(inner: S, policy: StorePolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.policy.timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout(self.policy.timeout))?
    }

    async fn read<'a, T, F, Fut>(&'a self, what: &str, path: &str, op: F) -> Result<T, StoreError>
    where
        F: Fn(&'a S) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let attempts = self.policy.read_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.bounded(op(&self.inner)).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    warn!(
                        "[Store] {} {} failed (attempt {}/{}): {}",
                        what, path, attempt, attempts, e
                    );
                    tokio::time::sleep(self.policy.retry_backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<S: Store> Store for BoundedStore<S> {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.read("get", path, |s| s.get(path)).await
    }

    async fn list(&self, path: &str) -> Result<Vec<(String, Value)>, StoreError> {
        self.read("list", path, |s| s.list(path)).await
    }

    async fn apply(&self, batch: WriteBatch) -> Result<Vec<String>, StoreError> {
        let commit = self.inner.apply(batch);
        tokio::pin!(commit);
        match tokio::time::timeout(self.policy.timeout, &mut commit).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "[Store] Write still pending after {:?}, waiting for the commit",
                    self.policy.timeout
                );
                commit.await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` reads.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Store for Flaky {
        async fn get(&self, _path: &str) -> Result<Option<Value>, StoreError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(StoreError::Unavailable("flaky".into()))
            } else {
                Ok(Some(Value::Bool(true)))
            }
        }

        async fn list(&self, _path: &str) -> Result<Vec<(String, Value)>, StoreError> {
            Ok(Vec::new())
        }

        async fn apply(&self, _batch: WriteBatch) -> Result<Vec<String>, StoreError> {
            Ok(Vec::new())
        }
    }

    /// Commits on a task of its own after a delay, like `FileStore`.
    struct SlowCommit {
        inner: Arc<MemoryStore>,
        delay: Duration,
    }

    #[async_trait]
    impl Store for SlowCommit {
        async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
            self.inner.get(path).await
        }

        async fn list(&self, path: &str) -> Result<Vec<(String, Value)>, StoreError> {
            self.inner.list(path).await
        }

        async fn apply(&self, batch: WriteBatch) -> Result<Vec<String>, StoreError> {
            let inner = self.inner.clone();
            let delay = self.delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                inner.apply(batch).await
            })
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
        }
    }

    fn policy(read_attempts: u32) -> StorePolicy {
        StorePolicy {
            timeout: Duration::from_millis(50),
            read_attempts,
            retry_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_read_retried_until_success() {
        let store = BoundedStore::new(
            Flaky {
                failures: 2,
                calls: AtomicU32::new(0),
            },
            policy(3),
        );
        assert_eq!(store.get("config").await.unwrap(), Some(Value::Bool(true)));
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_read_gives_up_after_attempts() {
        let store = BoundedStore::new(
            Flaky {
                failures: 5,
                calls: AtomicU32::new(0),
            },
            policy(2),
        );
        assert!(store.get("config").await.is_err());
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slow_write_reports_its_real_outcome() {
        let store = BoundedStore::new(
            SlowCommit {
                inner: Arc::new(MemoryStore::new()),
                delay: Duration::from_millis(150),
            },
            policy(3),
        );
        let batch = WriteBatch::new().set("sensor/current", json!({ "moisturePercent": 30 }));
        store.apply(batch).await.unwrap();
        assert_eq!(
            store.get("sensor/current").await.unwrap(),
            Some(json!({ "moisturePercent": 30 }))
        );
    }

    #[tokio::test]
    async fn test_slow_write_failure_is_still_reported() {
        let store = BoundedStore::new(
            SlowCommit {
                inner: Arc::new(MemoryStore::new()),
                delay: Duration::from_millis(150),
            },
            policy(3),
        );
        let batch = WriteBatch::new()
            .set("config", json!(1))
            .merge("config/humidityMinPercent", serde_json::Map::new());
        assert!(store.apply(batch).await.is_err());
        assert_eq!(store.get("config").await.unwrap(), None);
    }
}
