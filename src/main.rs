// src/main.rs
use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::{error, info};

mod backups;
mod clock;
mod config;
mod ledger;
mod logging;
mod policy;
mod storage;
#[cfg(test)]
mod test_utils;

use crate::backups::{
    BackupError, BackupRepository, ProjectCreateParams, ProjectUpdateParams, REASON_USER,
};
use crate::clock::SystemClock;
use crate::ledger::{NotificationTargets, SqliteLedger};
use crate::policy::LogNotifier;
use crate::storage::BlobStore;

type Repository = BackupRepository<SqliteLedger, dyn BlobStore>;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config.toml",
        global = true
    )]
    config: String,

    /// Show verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the retention and notification workers until interrupted
    Run,
    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommand),
    /// Manage backups
    #[command(subcommand)]
    Backup(BackupCommand),
    /// Report blobs that no backup references
    Orphans {
        /// Delete the reported blobs
        #[arg(long)]
        delete: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ProjectCommand {
    /// Register a new project
    Create {
        /// Project slug; normalized to lowercase [a-z0-9_-]
        id: String,
        #[arg(long, default_value = "")]
        name: String,
        /// Number of newest backups to keep
        #[arg(long, allow_negative_numbers = true)]
        retention: Option<i64>,
        /// Maximum backup age in seconds before the project is outdated
        #[arg(long, allow_negative_numbers = true)]
        check_period: Option<i64>,
        /// Register the project as inactive
        #[arg(long)]
        inactive: bool,
        #[command(flatten)]
        targets: TargetArgs,
    },
    /// Change settings of a project
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, allow_negative_numbers = true)]
        retention: Option<i64>,
        #[arg(long, allow_negative_numbers = true)]
        check_period: Option<i64>,
        #[arg(long)]
        active: Option<bool>,
        #[arg(long)]
        notify: Option<bool>,
        /// Replace notification targets with the ones given
        #[arg(long)]
        replace_targets: bool,
        #[command(flatten)]
        targets: TargetArgs,
    },
    /// List all projects
    List,
    /// Show one project with its status and current backup
    Show { id: String },
    /// Delete a project and all of its backups
    Delete { id: String },
}

#[derive(Args, Debug, Default)]
struct TargetArgs {
    /// Slack user or channel to alert (repeatable)
    #[arg(long = "slack")]
    slack: Vec<String>,
    /// Telegram chat to alert (repeatable)
    #[arg(long = "telegram")]
    telegram: Vec<String>,
    /// Webhook URL to alert (repeatable)
    #[arg(long = "webhook")]
    webhook: Vec<String>,
}

impl TargetArgs {
    fn into_targets(self) -> NotificationTargets {
        NotificationTargets {
            slack: self.slack,
            telegram: self.telegram,
            webhook: self.webhook,
        }
    }
}

#[derive(Subcommand, Debug)]
enum BackupCommand {
    /// Upload a file as a new backup of a project
    Upload {
        project: String,
        file: PathBuf,
        /// File name to record instead of the local one
        #[arg(long)]
        name: Option<String>,
    },
    /// List backups of a project, newest first
    List { project: String },
    /// Write a backup's payload to a file
    Download {
        id: String,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Delete a backup
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match config::load_config(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            process::exit(1);
        }
    };

    let _log_guard = logging::init_logging(config.logging.as_ref(), cli.verbose)?;

    info!("Backup Monitor v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from: {}", cli.config);

    let repo = initialize_repository(&config).await?;

    let result = match cli.command {
        Commands::Run => run_workers(repo, &config).await,
        Commands::Project(command) => run_project_command(&repo, command).await,
        Commands::Backup(command) => run_backup_command(&repo, command).await,
        Commands::Orphans { delete } => run_orphans_command(&repo, delete).await,
    };

    if let Err(e) = result {
        match e.downcast_ref::<BackupError>() {
            Some(backup_error) => {
                error!("{} ({})", backup_error, backup_error.kind().code())
            }
            None => error!("{:#}", e),
        }
        process::exit(1);
    }

    Ok(())
}

async fn initialize_repository(config: &config::Config) -> Result<Arc<Repository>> {
    let ledger = SqliteLedger::new(&config.database.path)?;
    let blobs = storage::open(&config.storage).await?;
    let repo = BackupRepository::new(
        Arc::new(ledger),
        blobs,
        Arc::new(SystemClock),
        config.projects,
    );

    info!("Backup repository initialized successfully");
    Ok(Arc::new(repo))
}

/// Run both workers until SIGINT or SIGTERM
async fn run_workers(repo: Arc<Repository>, config: &config::Config) -> Result<()> {
    let workers = policy::start_workers(repo, Arc::new(LogNotifier), &config.workers);

    shutdown_signal().await;
    workers.shutdown().await;

    info!("Graceful shutdown complete");
    Ok(())
}

async fn run_project_command(repo: &Repository, command: ProjectCommand) -> Result<()> {
    match command {
        ProjectCommand::Create {
            id,
            name,
            retention,
            check_period,
            inactive,
            targets,
        } => {
            let targets = targets.into_targets();
            let notify_enabled = !targets.is_empty();
            let summary = repo
                .create_project(ProjectCreateParams {
                    id,
                    name,
                    retention_count: retention,
                    check_period_seconds: check_period,
                    active: Some(!inactive),
                    notify_enabled: Some(notify_enabled),
                    targets: Some(targets),
                })
                .await?;
            print_json(&summary)
        }
        ProjectCommand::Update {
            id,
            name,
            retention,
            check_period,
            active,
            notify,
            replace_targets,
            targets,
        } => {
            let summary = repo
                .update_project(
                    &id,
                    ProjectUpdateParams {
                        name,
                        retention_count: retention,
                        check_period_seconds: check_period,
                        active,
                        notify_enabled: notify,
                        targets: replace_targets.then(|| targets.into_targets()),
                    },
                )
                .await?;
            print_json(&summary)
        }
        ProjectCommand::List => print_json(&repo.list_projects().await?),
        ProjectCommand::Show { id } => {
            repo.refresh_status(&id).await?;
            print_json(&repo.get_project(&id).await?)
        }
        ProjectCommand::Delete { id } => {
            repo.delete_project(&id).await?;
            info!("Project {} deleted", id);
            Ok(())
        }
    }
}

async fn run_backup_command(repo: &Repository, command: BackupCommand) -> Result<()> {
    match command {
        BackupCommand::Upload {
            project,
            file,
            name,
        } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let file_name = match name {
                Some(name) => name,
                None => local_file_name(&file)?,
            };
            let backup = repo.upload(&project, &file_name, Bytes::from(data)).await?;
            print_json(&backup)
        }
        BackupCommand::List { project } => print_json(&repo.list(&project).await?),
        BackupCommand::Download { id, output } => {
            let file = repo.download(&id).await?;
            tokio::fs::write(&output, &file.data)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!(
                "Backup {} ({} bytes) written to {}",
                file.backup.id,
                file.data.len(),
                output.display()
            );
            print_json(&file.backup)
        }
        BackupCommand::Delete { id } => {
            let backup = repo.delete(&id, REASON_USER).await?;
            print_json(&backup)
        }
    }
}

async fn run_orphans_command(repo: &Repository, delete: bool) -> Result<()> {
    if delete {
        let removed = repo.remove_orphans().await?;
        info!("Removed {} orphaned blob(s)", removed.len());
        print_json(&removed)
    } else {
        let orphans = repo.find_orphans().await?;
        info!("Found {} orphaned blob(s)", orphans.len());
        print_json(&orphans)
    }
}

fn local_file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .with_context(|| format!("{} has no usable file name", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
