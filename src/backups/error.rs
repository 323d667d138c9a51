use crate::ledger::LedgerError;
use crate::storage::StorageError;
use serde::Serialize;
use thiserror::Error;

/// Coarse error classes surfaced to callers of the repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AccessDenied,
    Conflict,
    BadRequest,
    Internal,
}

impl ErrorKind {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::AccessDenied => "access_denied",
            ErrorKind::Conflict => "conflict",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Internal => "internal_error",
        }
    }
}

/// Errors returned by the backup repository
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Project \"{0}\" doesn't exist")]
    ProjectNotFound(String),

    #[error("Backup \"{0}\" doesn't exist")]
    BackupNotFound(String),

    #[error("Access denied to project \"{0}\"")]
    AccessDenied(String),

    #[error("Project \"{0}\" already exists")]
    Conflict(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Ledger error: {0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for BackupError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::ProjectNotFound(id) => BackupError::ProjectNotFound(id),
            LedgerError::BackupNotFound(id) => BackupError::BackupNotFound(id),
            LedgerError::ProjectExists(id) => BackupError::Conflict(id),
            other => BackupError::Ledger(other),
        }
    }
}

impl BackupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackupError::ProjectNotFound(_) | BackupError::BackupNotFound(_) => ErrorKind::NotFound,
            BackupError::AccessDenied(_) => ErrorKind::AccessDenied,
            BackupError::Conflict(_) => ErrorKind::Conflict,
            BackupError::InvalidArgument(_) => ErrorKind::BadRequest,
            BackupError::Storage(StorageError::ObjectNotFound(_)) => ErrorKind::NotFound,
            BackupError::Storage(StorageError::AccessDenied(_, _)) => ErrorKind::AccessDenied,
            BackupError::Storage(StorageError::InvalidKey(_, _)) => ErrorKind::BadRequest,
            BackupError::Storage(_) | BackupError::Ledger(_) => ErrorKind::Internal,
        }
    }
}
