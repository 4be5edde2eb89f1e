//! Async wrapper around KVDb that uses tokio::task::spawn_blocking
//!
//! SQLite calls block, so every operation is moved onto the blocking pool.
//! The connection itself is guarded by a mutex and shared between clones.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::{KVDb, KVStoreError};

#[derive(Clone)]
pub struct AsyncKVDb {
    path: PathBuf,
    inner: Arc<Mutex<KVDb>>,
}

fn join_error(e: tokio::task::JoinError) -> KVStoreError {
    KVStoreError::IOError(std::io::Error::other(format!(
        "Failed to spawn blocking task: {}",
        e
    )))
}

impl AsyncKVDb {
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, KVStoreError> {
        let path = path.as_ref().to_path_buf();
        let path_clone = path.clone();

        let kvdb = tokio::task::spawn_blocking(move || KVDb::new(path_clone))
            .await
            .map_err(join_error)??;

        Ok(Self {
            path,
            inner: Arc::new(Mutex::new(kvdb)),
        })
    }

    async fn with_db<T, F>(&self, f: F) -> Result<T, KVStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&KVDb) -> Result<T, KVStoreError> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let kvdb = inner.blocking_lock();
            f(&kvdb)
        })
        .await
        .map_err(join_error)?
    }

    pub async fn get<T: DeserializeOwned + Send + 'static>(
        &self,
        key: impl AsRef<str>,
    ) -> Result<Option<T>, KVStoreError> {
        let key = key.as_ref().to_string();
        self.with_db(move |db| db.get(&key)).await
    }

    /// Serializes the value to JSON before handing it to the blocking pool.
    pub async fn set<V: Serialize + ?Sized>(
        &self,
        key: impl AsRef<str>,
        value: &V,
    ) -> Result<(), KVStoreError> {
        let key = key.as_ref().to_string();
        let value_json = serde_json::to_string(value)?;
        self.with_db(move |db| db.set_raw(&key, &value_json)).await
    }

    pub async fn delete(&self, key: impl AsRef<str>) -> Result<bool, KVStoreError> {
        let key = key.as_ref().to_string();
        self.with_db(move |db| db.delete(&key)).await
    }

    pub async fn entries_with_prefix<T: DeserializeOwned + Send + 'static>(
        &self,
        prefix: impl AsRef<str>,
    ) -> Result<Vec<(String, T)>, KVStoreError> {
        let prefix = prefix.as_ref().to_string();
        self.with_db(move |db| db.entries_with_prefix(&prefix)).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_async_kvdb_basic_operations() -> Result<(), KVStoreError> {
        let db = AsyncKVDb::new(":memory:").await?;

        let test_value = "test_value".to_string();
        db.set("test_key", &test_value).await?;
        let value: Option<String> = db.get("test_key").await?;
        assert_eq!(value, Some(test_value));

        let missing: Option<String> = db.get("missing_key").await?;
        assert_eq!(missing, None);

        assert!(db.delete("test_key").await?);
        let gone: Option<String> = db.get("test_key").await?;
        assert_eq!(gone, None);

        Ok(())
    }

    #[tokio::test]
    async fn test_async_kvdb_concurrent_access() -> Result<(), KVStoreError> {
        let db = AsyncKVDb::new(":memory:").await?;

        let mut handles = vec![];
        for i in 0..10 {
            let db_clone = db.clone();
            handles.push(tokio::spawn(async move {
                let key = format!("key_{}", i);
                let value = format!("value_{}", i);
                db_clone.set(&key, &value).await?;
                let result: Option<String> = db_clone.get(&key).await?;
                assert_eq!(result, Some(value));
                Ok::<_, KVStoreError>(())
            }));
        }

        for handle in handles {
            handle.await.unwrap()?;
        }

        let all: Vec<(String, String)> = db.entries_with_prefix("key_").await?;
        assert_eq!(all.len(), 10);
        Ok(())
    }
}
