use crate::config::FilesystemConfig;
use crate::storage::blob_store::{validate_key, BlobStore};
use crate::storage::error::StorageError;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

/// Blob store keeping every object as a file below a root directory.
///
/// Key segments separated by `/` map to nested directories.
#[derive(Debug, Clone)]
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    /// Create a new FilesystemStore, creating the root directory if needed
    pub async fn new(config: &FilesystemConfig) -> Result<Self, StorageError> {
        let root = PathBuf::from(&config.root);
        fs::create_dir_all(&root).await.map_err(|e| {
            error!("Unable to create directory {}: {}", root.display(), e);
            StorageError::ConfigurationError(format!(
                "Unable to create directory {}: {}",
                root.display(),
                e
            ))
        })?;

        info!("Using file system as storage (see {})", root.display());
        Ok(Self { root })
    }

    /// Resolve a key to a path below the root, rejecting keys that escape it
    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;

        let mut path = self.root.clone();
        path.extend(key.split('/'));
        Ok(path)
    }

    async fn write_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::File::create(path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FilesystemStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<String, StorageError> {
        let path = self.resolve(key)?;

        if let Err(e) = Self::write_file(&path, &data).await {
            error!("Unable to write file {}: {}", path.display(), e);
            // Do not leave a truncated payload behind
            if let Err(cleanup) = fs::remove_file(&path).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!(
                        "Partial file {} could not be removed: {}",
                        path.display(),
                        cleanup
                    );
                }
            }
            return Err(StorageError::WriteError(key.to_string(), e.to_string()));
        }

        info!(
            "New file has been written: {} ({} bytes)",
            path.display(),
            data.len()
        );
        Ok(key.to_string())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let path = self.resolve(key)?;
        debug!("Reading file {}", path.display());

        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::ObjectNotFound(key.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                Err(StorageError::AccessDenied(key.to_string(), e.to_string()))
            }
            Err(e) => {
                error!("Unable to open file {}: {}", path.display(), e);
                Err(StorageError::ReadError(key.to_string(), e.to_string()))
            }
        }
    }

    async fn list(&self) -> Result<BTreeSet<String>, StorageError> {
        let mut keys = BTreeSet::new();
        let mut pending = vec![(self.root.clone(), String::new())];

        while let Some((dir, prefix)) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    error!("Unable to read directory {}: {}", dir.display(), e);
                    return Err(StorageError::ListError(e.to_string()));
                }
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StorageError::ListError(e.to_string()))?
            {
                let name = entry.file_name().to_string_lossy().into_owned();
                let key = if prefix.is_empty() {
                    name
                } else {
                    format!("{prefix}/{name}")
                };

                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| StorageError::ListError(e.to_string()))?;
                if file_type.is_dir() {
                    pending.push((entry.path(), key));
                } else {
                    keys.insert(key);
                }
            }
        }

        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.resolve(key)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("File {} has been removed", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(
                    "Won't remove file {} since it doesn't exist",
                    path.display()
                );
                Ok(())
            }
            Err(e) => {
                error!("Unable to remove file {}: {}", path.display(), e);
                Err(StorageError::DeleteError(key.to_string(), e.to_string()))
            }
        }
    }
}
