use crate::storage::blob_store::{validate_key, BlobStore};
use crate::storage::error::StorageError;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// `FakeBlobStore` is an in-memory implementation of the `BlobStore` trait for testing purposes.
/// It allows simulating write and delete failures.
#[derive(Clone, Default)]
pub struct FakeBlobStore {
    data: Arc<Mutex<BTreeMap<String, Bytes>>>,
    fail_puts: Arc<Mutex<bool>>,
    fail_deletes: Arc<Mutex<bool>>,
}

impl FakeBlobStore {
    /// Create a new empty FakeBlobStore instance
    pub fn new() -> Self {
        Self::default()
    }

    /// After calling this, every `put` fails
    pub async fn fake_fail_puts(&self, fail: bool) {
        *self.fail_puts.lock().await = fail;
    }

    /// After calling this, every `delete` of an existing key fails
    pub async fn fake_fail_deletes(&self, fail: bool) {
        *self.fail_deletes.lock().await = fail;
    }

    pub async fn fake_contains(&self, key: &str) -> bool {
        self.data.lock().await.contains_key(key)
    }

    pub async fn fake_len(&self) -> usize {
        self.data.lock().await.len()
    }
}

#[async_trait]
impl BlobStore for FakeBlobStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<String, StorageError> {
        validate_key(key)?;
        if *self.fail_puts.lock().await {
            return Err(StorageError::WriteError(
                key.to_string(),
                "simulated write failure".to_string(),
            ));
        }

        self.data.lock().await.insert(key.to_string(), data);
        Ok(key.to_string())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        validate_key(key)?;
        self.data
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::ObjectNotFound(key.to_string()))
    }

    async fn list(&self) -> Result<BTreeSet<String>, StorageError> {
        Ok(self.data.lock().await.keys().cloned().collect())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let mut data = self.data.lock().await;
        if !data.contains_key(key) {
            return Ok(());
        }
        if *self.fail_deletes.lock().await {
            return Err(StorageError::DeleteError(
                key.to_string(),
                "simulated delete failure".to_string(),
            ));
        }
        data.remove(key);
        Ok(())
    }
}
