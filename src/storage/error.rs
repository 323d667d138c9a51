use thiserror::Error;

/// Errors that can occur when interacting with the blob store
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to connect to storage: {0}")]
    ConnectionError(String),

    #[error("Object with key {0} not found")]
    ObjectNotFound(String),

    #[error("Invalid object key {0}: {1}")]
    InvalidKey(String, String),

    #[error("Access denied for object {0}: {1}")]
    AccessDenied(String, String),

    #[error("Failed to read object {0}: {1}")]
    ReadError(String, String),

    #[error("Failed to write object {0}: {1}")]
    WriteError(String, String),

    #[error("Failed to delete object {0}: {1}")]
    DeleteError(String, String),

    #[error("Failed to list objects: {0}")]
    ListError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}
