pub mod error;
#[cfg(test)]
pub mod fake;
pub mod ledger_storage;
pub mod models;
pub mod sqlite;
pub mod status;

pub use error::LedgerError;
#[cfg(test)]
pub use fake::FakeLedgerStorage;
pub use ledger_storage::LedgerStorage;
pub use models::{Backup, BackupKind, BackupStatus, NotificationTargets, Project};
pub use sqlite::SqliteLedger;
pub use status::StatusTransition;
