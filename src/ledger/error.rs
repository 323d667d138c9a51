use thiserror::Error;

/// Errors that can occur when interacting with the backup ledger
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Failed to open ledger: {0}")]
    OpenError(String),

    #[error("Ledger operation failed: {0}")]
    OperationError(String),

    #[error("Project {0} not found")]
    ProjectNotFound(String),

    #[error("Backup {0} not found")]
    BackupNotFound(String),

    #[error("Project {0} already exists")]
    ProjectExists(String),

    #[error("Ledger is locked")]
    Locked,
}
