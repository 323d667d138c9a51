use crate::ledger::error::LedgerError;
use crate::ledger::ledger_storage::LedgerStorage;
use crate::ledger::models::{Backup, BackupKind, BackupStatus, NotificationTargets, Project};
use crate::ledger::status::{apply_status, StatusTransition};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::task;
use tracing::{debug, error, info};

const PROJECT_COLUMNS: &str = "id, name, retention_count, check_period_seconds, active, \
     notify_enabled, targets, backup_status, last_backup_id, last_notified_at";

const BACKUP_COLUMNS: &str =
    "id, project_id, file_name, storage_ref, uploaded_at, size_bytes, kind";

/// A SQLite implementation of the LedgerStorage trait
pub struct SqliteLedger {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteLedger {
    /// Create a new SqliteLedger with the given database path
    pub fn new(db_path: &str) -> Result<Self, LedgerError> {
        info!("Creating SQLite ledger at path: {db_path}");

        if db_path != ":memory:" {
            if let Some(parent) = Path::new(db_path).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    debug!("Creating parent directory: {:?}", parent);
                    fs::create_dir_all(parent).map_err(|e| {
                        error!("Failed to create directory {parent:?}: {e}");
                        LedgerError::OpenError(format!("Failed to create directory: {e}"))
                    })?;
                }
            }
        }

        let connection = Connection::open(db_path).map_err(|e| {
            error!("Failed to open SQLite database at {db_path}: {e}");
            LedgerError::OpenError(format!("Failed to open SQLite database: {e}"))
        })?;

        connection
            .execute_batch(
                "PRAGMA foreign_keys = ON;

                CREATE TABLE IF NOT EXISTS projects (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    retention_count INTEGER NOT NULL,
                    check_period_seconds INTEGER NOT NULL,
                    active INTEGER NOT NULL,
                    notify_enabled INTEGER NOT NULL,
                    targets TEXT NOT NULL,
                    backup_status TEXT NOT NULL DEFAULT 'NONE',
                    last_backup_id TEXT,
                    last_notified_at TEXT
                );

                CREATE TABLE IF NOT EXISTS backups (
                    id TEXT PRIMARY KEY,
                    project_id TEXT NOT NULL REFERENCES projects(id),
                    file_name TEXT NOT NULL,
                    storage_ref TEXT NOT NULL UNIQUE,
                    uploaded_at TEXT NOT NULL,
                    size_bytes INTEGER NOT NULL,
                    kind TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_backups_project_uploaded
                    ON backups(project_id, uploaded_at);",
            )
            .map_err(|e| {
                error!("Failed to create ledger schema: {e}");
                LedgerError::OpenError(format!("Failed to create ledger schema: {e}"))
            })?;

        info!("SQLite ledger initialized successfully at: {db_path}");
        Ok(SqliteLedger {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Run `op` on the connection from the blocking pool
    async fn with_connection<T, F>(&self, what: &'static str, op: F) -> Result<T, LedgerError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, LedgerError> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);

        task::spawn_blocking(move || {
            let mut conn = match connection.lock() {
                Ok(conn) => conn,
                Err(_) => {
                    error!("Failed to acquire database lock");
                    return Err(LedgerError::Locked);
                }
            };
            op(&mut *conn)
        })
        .await
        .map_err(|e| {
            error!("Task panic while running {what}: {e}");
            LedgerError::OperationError(format!("Task panic: {e}"))
        })?
    }
}

// Fixed width keeps lexicographic order equal to chronological order
fn datetime_to_string(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn string_to_datetime(s: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LedgerError::OperationError(format!("Failed to parse datetime: {e}")))
}

fn sql_error(what: &str) -> impl Fn(rusqlite::Error) -> LedgerError + '_ {
    move |e| {
        error!("Failed to {what}: {e}");
        LedgerError::OperationError(format!("Failed to {what}: {e}"))
    }
}

fn to_i64(value: u64, field: &str) -> Result<i64, LedgerError> {
    i64::try_from(value)
        .map_err(|_| LedgerError::OperationError(format!("{field} out of range: {value}")))
}

fn to_u64(value: i64, field: &str) -> Result<u64, LedgerError> {
    u64::try_from(value)
        .map_err(|_| LedgerError::OperationError(format!("{field} out of range: {value}")))
}

/// Raw `projects` row as SQLite returns it
struct ProjectRow {
    id: String,
    name: String,
    retention_count: i64,
    check_period_seconds: i64,
    active: bool,
    notify_enabled: bool,
    targets: String,
    backup_status: String,
    last_backup_id: Option<String>,
    last_notified_at: Option<String>,
}

impl ProjectRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            retention_count: row.get(2)?,
            check_period_seconds: row.get(3)?,
            active: row.get(4)?,
            notify_enabled: row.get(5)?,
            targets: row.get(6)?,
            backup_status: row.get(7)?,
            last_backup_id: row.get(8)?,
            last_notified_at: row.get(9)?,
        })
    }

    fn into_project(self) -> Result<Project, LedgerError> {
        let targets: NotificationTargets = serde_json::from_str(&self.targets).map_err(|e| {
            LedgerError::OperationError(format!("Invalid targets for project {}: {e}", self.id))
        })?;
        let backup_status: BackupStatus = self
            .backup_status
            .parse()
            .map_err(LedgerError::OperationError)?;
        let retention_count = u32::try_from(self.retention_count).map_err(|_| {
            LedgerError::OperationError(format!(
                "retention_count out of range: {}",
                self.retention_count
            ))
        })?;

        Ok(Project {
            retention_count,
            check_period_seconds: to_u64(self.check_period_seconds, "check_period_seconds")?,
            active: self.active,
            notify_enabled: self.notify_enabled,
            targets,
            backup_status,
            last_backup_id: self.last_backup_id,
            last_notified_at: self
                .last_notified_at
                .as_deref()
                .map(string_to_datetime)
                .transpose()?,
            id: self.id,
            name: self.name,
        })
    }
}

/// Raw `backups` row as SQLite returns it
struct BackupRow {
    id: String,
    project_id: String,
    file_name: String,
    storage_ref: String,
    uploaded_at: String,
    size_bytes: i64,
    kind: String,
}

impl BackupRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            file_name: row.get(2)?,
            storage_ref: row.get(3)?,
            uploaded_at: row.get(4)?,
            size_bytes: row.get(5)?,
            kind: row.get(6)?,
        })
    }

    fn into_backup(self) -> Result<Backup, LedgerError> {
        let kind: BackupKind = self.kind.parse().map_err(LedgerError::OperationError)?;
        Ok(Backup {
            uploaded_at: string_to_datetime(&self.uploaded_at)?,
            size_bytes: to_u64(self.size_bytes, "size_bytes")?,
            kind,
            id: self.id,
            project_id: self.project_id,
            file_name: self.file_name,
            storage_ref: self.storage_ref,
        })
    }
}

fn load_project(conn: &Connection, id: &str) -> Result<Option<Project>, LedgerError> {
    conn.query_row(
        &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
        params![id],
        ProjectRow::from_row,
    )
    .optional()
    .map_err(sql_error("query project"))?
    .map(ProjectRow::into_project)
    .transpose()
}

fn load_backup(conn: &Connection, id: &str) -> Result<Option<Backup>, LedgerError> {
    conn.query_row(
        &format!("SELECT {BACKUP_COLUMNS} FROM backups WHERE id = ?1"),
        params![id],
        BackupRow::from_row,
    )
    .optional()
    .map_err(sql_error("query backup"))?
    .map(BackupRow::into_backup)
    .transpose()
}

fn load_backups(conn: &Connection, project_id: &str) -> Result<Vec<Backup>, LedgerError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {BACKUP_COLUMNS} FROM backups WHERE project_id = ?1
             ORDER BY uploaded_at DESC, rowid DESC"
        ))
        .map_err(sql_error("prepare backups query"))?;

    let rows = stmt
        .query_map(params![project_id], BackupRow::from_row)
        .map_err(sql_error("query backups"))?;

    let mut backups = Vec::new();
    for row in rows {
        backups.push(row.map_err(sql_error("read backup row"))?.into_backup()?);
    }
    Ok(backups)
}

/// Re-establish the CURRENT backup and the derived status of a project
fn rederive(
    conn: &Connection,
    project_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<StatusTransition>, LedgerError> {
    let mut project = load_project(conn, project_id)?
        .ok_or_else(|| LedgerError::ProjectNotFound(project_id.to_string()))?;
    let backups = load_backups(conn, project_id)?;
    let current = backups.first();

    if let Some(current) = current {
        conn.execute(
            "UPDATE backups
             SET kind = CASE WHEN id = ?1 THEN 'CURRENT' ELSE 'ARCHIVE' END
             WHERE project_id = ?2",
            params![current.id, project_id],
        )
        .map_err(sql_error("classify backups"))?;
    }

    let transition = apply_status(&mut project, current, now);

    conn.execute(
        "UPDATE projects SET backup_status = ?1, last_backup_id = ?2, last_notified_at = ?3
         WHERE id = ?4",
        params![
            project.backup_status.as_str(),
            project.last_backup_id,
            project.last_notified_at.map(datetime_to_string),
            project_id
        ],
    )
    .map_err(sql_error("update project status"))?;

    if let Some(transition) = transition {
        info!(
            "Project {} status changed from {} to {}",
            project_id, transition.from, transition.to
        );
    }
    Ok(transition)
}

#[async_trait]
impl LedgerStorage for SqliteLedger {
    async fn insert_project(&self, project: Project) -> Result<(), LedgerError> {
        debug!("Inserting project: id={}", project.id);

        let targets = serde_json::to_string(&project.targets)
            .map_err(|e| LedgerError::OperationError(format!("Failed to encode targets: {e}")))?;
        let check_period = to_i64(project.check_period_seconds, "check_period_seconds")?;

        self.with_connection("insert_project", move |conn| {
            let tx = conn.transaction().map_err(sql_error("begin transaction"))?;

            let exists: bool = tx
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM projects WHERE id = ?1)",
                    params![project.id],
                    |row| row.get(0),
                )
                .map_err(sql_error("check project"))?;
            if exists {
                return Err(LedgerError::ProjectExists(project.id));
            }

            tx.execute(
                &format!("INSERT INTO projects ({PROJECT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
                params![
                    project.id,
                    project.name,
                    i64::from(project.retention_count),
                    check_period,
                    project.active,
                    project.notify_enabled,
                    targets,
                    project.backup_status.as_str(),
                    project.last_backup_id,
                    project.last_notified_at.map(datetime_to_string),
                ],
            )
            .map_err(sql_error("insert project"))?;

            tx.commit().map_err(sql_error("commit project"))?;
            debug!("Successfully inserted project {}", project.id);
            Ok(())
        })
        .await
    }

    async fn update_project(&self, project: &Project) -> Result<(), LedgerError> {
        debug!("Updating project settings: id={}", project.id);

        let targets = serde_json::to_string(&project.targets)
            .map_err(|e| LedgerError::OperationError(format!("Failed to encode targets: {e}")))?;
        let check_period = to_i64(project.check_period_seconds, "check_period_seconds")?;
        let id = project.id.clone();
        let name = project.name.clone();
        let retention = i64::from(project.retention_count);
        let active = project.active;
        let notify_enabled = project.notify_enabled;

        self.with_connection("update_project", move |conn| {
            let updated = conn
                .execute(
                    "UPDATE projects
                     SET name = ?1, retention_count = ?2, check_period_seconds = ?3,
                         active = ?4, notify_enabled = ?5, targets = ?6
                     WHERE id = ?7",
                    params![name, retention, check_period, active, notify_enabled, targets, id],
                )
                .map_err(sql_error("update project"))?;

            if updated == 0 {
                return Err(LedgerError::ProjectNotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn get_project(&self, id: &str) -> Result<Option<Project>, LedgerError> {
        let id = id.to_string();
        self.with_connection("get_project", move |conn| load_project(conn, &id))
            .await
    }

    async fn list_projects(&self) -> Result<Vec<Project>, LedgerError> {
        self.with_connection("list_projects", |conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY id ASC"))
                .map_err(sql_error("prepare projects query"))?;
            let rows = stmt
                .query_map([], ProjectRow::from_row)
                .map_err(sql_error("query projects"))?;

            let mut projects = Vec::new();
            for row in rows {
                projects.push(row.map_err(sql_error("read project row"))?.into_project()?);
            }
            Ok(projects)
        })
        .await
    }

    async fn delete_project(&self, id: &str) -> Result<(), LedgerError> {
        let id = id.to_string();
        self.with_connection("delete_project", move |conn| {
            let deleted = conn
                .execute("DELETE FROM projects WHERE id = ?1", params![id])
                .map_err(sql_error("delete project"))?;
            if deleted == 0 {
                return Err(LedgerError::ProjectNotFound(id));
            }
            info!("Project {} has been removed from the ledger", id);
            Ok(())
        })
        .await
    }

    async fn set_last_notified(&self, id: &str, at: DateTime<Utc>) -> Result<(), LedgerError> {
        let id = id.to_string();
        let at = datetime_to_string(at);
        self.with_connection("set_last_notified", move |conn| {
            let updated = conn
                .execute(
                    "UPDATE projects SET last_notified_at = ?1 WHERE id = ?2",
                    params![at, id],
                )
                .map_err(sql_error("update last notification"))?;
            if updated == 0 {
                return Err(LedgerError::ProjectNotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn insert_backup(
        &self,
        backup: Backup,
        now: DateTime<Utc>,
    ) -> Result<Backup, LedgerError> {
        debug!(
            "Inserting backup: id={}, project_id={}, storage_ref={}",
            backup.id, backup.project_id, backup.storage_ref
        );

        let size = to_i64(backup.size_bytes, "size_bytes")?;

        self.with_connection("insert_backup", move |conn| {
            let tx = conn.transaction().map_err(sql_error("begin transaction"))?;

            if load_project(&tx, &backup.project_id)?.is_none() {
                return Err(LedgerError::ProjectNotFound(backup.project_id));
            }

            tx.execute(
                &format!("INSERT INTO backups ({BACKUP_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                params![
                    backup.id,
                    backup.project_id,
                    backup.file_name,
                    backup.storage_ref,
                    datetime_to_string(backup.uploaded_at),
                    size,
                    BackupKind::Archive.as_str(),
                ],
            )
            .map_err(sql_error("insert backup"))?;

            rederive(&tx, &backup.project_id, now)?;
            let stored = load_backup(&tx, &backup.id)?
                .ok_or_else(|| LedgerError::BackupNotFound(backup.id.clone()))?;

            tx.commit().map_err(sql_error("commit backup"))?;
            debug!("Successfully inserted backup {}", stored.id);
            Ok(stored)
        })
        .await
    }

    async fn delete_backup(&self, id: &str, now: DateTime<Utc>) -> Result<Backup, LedgerError> {
        let id = id.to_string();

        self.with_connection("delete_backup", move |conn| {
            let tx = conn.transaction().map_err(sql_error("begin transaction"))?;

            let backup =
                load_backup(&tx, &id)?.ok_or_else(|| LedgerError::BackupNotFound(id.clone()))?;

            tx.execute("DELETE FROM backups WHERE id = ?1", params![id])
                .map_err(sql_error("delete backup"))?;
            rederive(&tx, &backup.project_id, now)?;

            tx.commit().map_err(sql_error("commit backup deletion"))?;
            debug!("Successfully deleted backup row {}", id);
            Ok(backup)
        })
        .await
    }

    async fn get_backup(&self, id: &str) -> Result<Option<Backup>, LedgerError> {
        let id = id.to_string();
        self.with_connection("get_backup", move |conn| load_backup(conn, &id))
            .await
    }

    async fn list_backups(&self, project_id: &str) -> Result<Vec<Backup>, LedgerError> {
        let project_id = project_id.to_string();
        self.with_connection("list_backups", move |conn| load_backups(conn, &project_id))
            .await
    }

    async fn current_backup(&self, project_id: &str) -> Result<Option<Backup>, LedgerError> {
        let project_id = project_id.to_string();
        self.with_connection("current_backup", move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {BACKUP_COLUMNS} FROM backups
                     WHERE project_id = ?1 AND kind = 'CURRENT'"
                ),
                params![project_id],
                BackupRow::from_row,
            )
            .optional()
            .map_err(sql_error("query current backup"))?
            .map(BackupRow::into_backup)
            .transpose()
        })
        .await
    }

    async fn refresh_status(
        &self,
        project_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<StatusTransition>, LedgerError> {
        let project_id = project_id.to_string();
        self.with_connection("refresh_status", move |conn| {
            let tx = conn.transaction().map_err(sql_error("begin transaction"))?;
            let transition = rederive(&tx, &project_id, now)?;
            tx.commit().map_err(sql_error("commit status"))?;
            Ok(transition)
        })
        .await
    }

    async fn all_storage_refs(&self) -> Result<BTreeSet<String>, LedgerError> {
        self.with_connection("all_storage_refs", |conn| {
            let mut stmt = conn
                .prepare("SELECT storage_ref FROM backups")
                .map_err(sql_error("prepare storage ref query"))?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(sql_error("query storage refs"))?;

            let mut refs = BTreeSet::new();
            for row in rows {
                refs.insert(row.map_err(sql_error("read storage ref"))?);
            }
            Ok(refs)
        })
        .await
    }
}
