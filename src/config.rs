use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub projects: ProjectDefaults,
    #[serde(default)]
    pub workers: WorkersConfig,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite ledger file, or `:memory:`
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "var/backupmonitor.db".to_string(),
        }
    }
}

/// Which blob store backend the process uses. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Filesystem,
    S3,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub filesystem: Option<FilesystemConfig>,
    pub s3: Option<S3Config>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilesystemConfig {
    pub root: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
}

/// Values applied to new projects when the caller leaves them unset
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ProjectDefaults {
    #[serde(default = "default_retention")]
    pub default_retention: u32,
    #[serde(default = "default_check_period_seconds")]
    pub default_check_period_seconds: u64,
}

fn default_retention() -> u32 {
    10
}

fn default_check_period_seconds() -> u64 {
    (24 + 8) * 3600
}

impl Default for ProjectDefaults {
    fn default() -> Self {
        Self {
            default_retention: default_retention(),
            default_check_period_seconds: default_check_period_seconds(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    #[serde(default = "default_eight_hours")]
    pub alert_frequency_seconds: u64,
    #[serde(default = "default_eight_hours")]
    pub quiet_period_seconds: u64,
}

fn default_interval_seconds() -> u64 {
    60
}

fn default_eight_hours() -> u64 {
    8 * 3600
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            alert_frequency_seconds: default_eight_hours(),
            quiet_period_seconds: default_eight_hours(),
        }
    }
}

impl WorkersConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(1))
    }

    /// Combined debounce window between two alerts of the same staleness episode
    pub fn alert_cooldown(&self) -> chrono::Duration {
        let seconds = self
            .alert_frequency_seconds
            .saturating_add(self.quiet_period_seconds);
        i64::try_from(seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub path: String,
    /// Maximum size of one log file in MiB
    #[serde(default = "default_log_size")]
    pub size: u64,
    #[serde(default = "default_log_files")]
    pub max_files: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_size() -> u64 {
    10
}

fn default_log_files() -> usize {
    5
}

pub fn load_config(path: &str) -> Result<Config> {
    let config_text = fs::read_to_string(Path::new(path))
        .with_context(|| format!("Failed to read configuration file {path}"))?;
    parse_config(&config_text)
}

pub fn parse_config(text: &str) -> Result<Config> {
    let config: Config = toml::from_str(text).context("Failed to parse configuration")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse_config(
            r#"
            [storage]
            backend = "filesystem"

            [storage.filesystem]
            root = "var/blob"
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.backend, StorageBackend::Filesystem);
        assert_eq!(config.projects.default_retention, 10);
        assert_eq!(config.projects.default_check_period_seconds, 115_200);
        assert_eq!(config.workers.interval(), Duration::from_secs(60));
        assert_eq!(config.workers.alert_cooldown(), chrono::Duration::hours(16));
        assert!(config.logging.is_none());
    }

    #[test]
    fn s3_backend_is_parsed() {
        let config = parse_config(
            r#"
            [database]
            path = ":memory:"

            [storage]
            backend = "s3"

            [storage.s3]
            endpoint = "http://localhost:9000"
            region = "us-east-1"
            bucket = "backups"
            force_path_style = true

            [workers]
            interval_seconds = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.backend, StorageBackend::S3);
        let s3 = config.storage.s3.unwrap();
        assert_eq!(s3.bucket, "backups");
        assert!(s3.force_path_style);
        assert!(s3.access_key_id.is_none());
        assert_eq!(config.workers.interval_seconds, 5);
        assert_eq!(config.workers.alert_frequency_seconds, 28_800);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let result = parse_config(
            r#"
            [storage]
            backend = "ftp"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn oversized_alert_windows_saturate() {
        let workers = WorkersConfig {
            interval_seconds: 60,
            alert_frequency_seconds: u64::MAX,
            quiet_period_seconds: u64::MAX,
        };
        assert_eq!(workers.alert_cooldown(), chrono::Duration::MAX);

        let workers = WorkersConfig {
            interval_seconds: 60,
            alert_frequency_seconds: i64::MAX as u64,
            quiet_period_seconds: 1,
        };
        assert_eq!(workers.alert_cooldown(), chrono::Duration::MAX);
    }
}
