pub mod blob_store;
pub mod error;
#[cfg(test)]
pub mod fake;
pub mod fs;
pub mod s3;

use std::sync::Arc;
use tracing::info;

use crate::config::{StorageBackend, StorageConfig};

pub use blob_store::BlobStore;
pub use error::StorageError;
#[cfg(test)]
pub use fake::FakeBlobStore;
pub use fs::FilesystemStore;
pub use s3::S3Store;

/// Open the blob store backend selected by configuration.
///
/// Called once at startup; the returned store is shared for the process lifetime.
pub async fn open(config: &StorageConfig) -> Result<Arc<dyn BlobStore>, StorageError> {
    info!("Opening {:?} blob store", config.backend);

    match config.backend {
        StorageBackend::Filesystem => {
            let fs_config = config.filesystem.as_ref().ok_or_else(|| {
                StorageError::ConfigurationError(
                    "backend is \"filesystem\" but [storage.filesystem] is missing".to_string(),
                )
            })?;
            Ok(Arc::new(FilesystemStore::new(fs_config).await?))
        }
        StorageBackend::S3 => {
            let s3_config = config.s3.as_ref().ok_or_else(|| {
                StorageError::ConfigurationError(
                    "backend is \"s3\" but [storage.s3] is missing".to_string(),
                )
            })?;
            Ok(Arc::new(S3Store::new(s3_config).await?))
        }
    }
}
