use crate::storage::error::StorageError;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Check that `key` is a relative `/`-separated path without empty, `.` or
/// `..` segments. Every backend applies the same rule.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey(
            key.to_string(),
            "key is empty".to_string(),
        ));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(
            key.to_string(),
            "key must be a relative path using '/' separators".to_string(),
        ));
    }
    if let Some(segment) = key
        .split('/')
        .find(|segment| segment.is_empty() || *segment == "." || *segment == "..")
    {
        return Err(StorageError::InvalidKey(
            key.to_string(),
            format!("invalid path segment {segment:?}"),
        ));
    }
    Ok(())
}

/// BlobStore trait defining a flat key → bytes namespace for backup payloads
#[async_trait]
///
/// Keys failing `validate_key` are rejected with `InvalidKey` by every operation
/// except `list`.
pub trait BlobStore: Send + Sync + 'static {
    /// Store an object, creating whatever namespace structure the key implies
    ///
    /// * `key` - The object key to write
    /// * `data` - The payload
    async fn put(&self, key: &str, data: Bytes) -> Result<String, StorageError>;

    /// Get an object by its key, failing with `ObjectNotFound` if it is absent
    async fn get(&self, key: &str) -> Result<Bytes, StorageError>;

    /// List every key in the namespace
    async fn list(&self) -> Result<BTreeSet<String>, StorageError>;

    /// Delete an object. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Implementation of BlobStore trait for Arc<T> where T implements BlobStore
///
/// This allows sharing one store between the repository and both workers.
#[async_trait]
impl<T: BlobStore + ?Sized> BlobStore for Arc<T> {
    async fn put(&self, key: &str, data: Bytes) -> Result<String, StorageError> {
        (**self).put(key, data).await
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        (**self).get(key).await
    }

    async fn list(&self) -> Result<BTreeSet<String>, StorageError> {
        (**self).list().await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        (**self).delete(key).await
    }
}
