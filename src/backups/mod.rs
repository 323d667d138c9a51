pub mod error;
pub mod models;
pub mod naming;
pub mod repository;

pub use error::{BackupError, ErrorKind};
pub use models::{
    BackupFile, ProjectCreateParams, ProjectSummary, ProjectUpdateParams, REASON_RETENTION,
    REASON_USER,
};
pub use repository::BackupRepository;
