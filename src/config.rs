// SPDX-License-Identifier: Apache-2.0

//! Service configuration
//!
//! Defaults, optionally overlaid by a JSON file, then by `LINEAGE_SYNC_*`
//! environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};

const ENV_DATA_DIR: &str = "LINEAGE_SYNC_DATA_DIR";
const ENV_REPOSITORY_TIMEOUT_MS: &str = "LINEAGE_SYNC_REPOSITORY_TIMEOUT_MS";
const ENV_COLUMN_CONCURRENCY: &str = "LINEAGE_SYNC_COLUMN_CONCURRENCY";
const ENV_RETRY_MAX_ATTEMPTS: &str = "LINEAGE_SYNC_RETRY_MAX_ATTEMPTS";

/// Log filter used when neither the config file nor `RUST_LOG` sets one
pub const DEFAULT_LOG_FILTER: &str = "lineage_sync=info,lineage_sync_lib=info,lineage_core=info";

/// What to do when a stale column cannot be deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleColumnPolicy {
    /// Audit the failure; the next run sees the column as stale again and retries
    RetryNextRun,
    /// Log only
    Ignore,
}

impl Default for StaleColumnPolicy {
    fn default() -> Self {
        Self::RetryNextRun
    }
}

/// Backoff settings for retryable failures of a whole notification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    pub enabled: bool,
    pub max_entries: usize,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
        }
    }
}

/// Top-level configuration of the reconciliation service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Name recorded in service lifecycle audit entries
    pub server_name: String,
    /// Per-call timeout applied to every repository operation
    pub repository_timeout_ms: u64,
    /// Upper bound of concurrently processed columns within one table
    pub column_concurrency: usize,
    pub retry: RetrySettings,
    pub audit: AuditSettings,
    /// Directory holding the audit log and logs
    pub data_dir: PathBuf,
    pub stale_column_policy: StaleColumnPolicy,
    /// `tracing` filter directives; `RUST_LOG` takes precedence
    pub log_filter: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_name: "lineage-sync".to_string(),
            repository_timeout_ms: 10_000,
            column_concurrency: 8,
            retry: RetrySettings::default(),
            audit: AuditSettings::default(),
            data_dir: default_data_dir(),
            stale_column_policy: StaleColumnPolicy::default(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl SyncConfig {
    /// Loads defaults, then the file (if given), then environment overrides
    pub fn load(path: Option<&Path>) -> SyncResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                debug!("No config file given, using defaults");
                Self::default()
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> SyncResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SyncError::config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| SyncError::config(format!("Failed to parse config: {}", e)))
    }

    /// Applies overrides from a variable lookup
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(value) = parse_env(&lookup, ENV_REPOSITORY_TIMEOUT_MS) {
            self.repository_timeout_ms = value;
        }
        if let Some(value) = parse_env(&lookup, ENV_COLUMN_CONCURRENCY) {
            self.column_concurrency = value;
        }
        if let Some(value) = parse_env(&lookup, ENV_RETRY_MAX_ATTEMPTS) {
            self.retry.max_attempts = value;
        }
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.repository_timeout_ms == 0 {
            return Err(SyncError::config("repository_timeout_ms must be non-zero"));
        }
        if self.column_concurrency == 0 {
            return Err(SyncError::config("column_concurrency must be non-zero"));
        }
        if self.retry.max_attempts == 0 {
            return Err(SyncError::config("retry.max_attempts must be at least 1"));
        }
        if self.retry.multiplier < 1.0 {
            return Err(SyncError::config("retry.multiplier must be >= 1.0"));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(SyncError::config(
                "retry.initial_delay_ms must not exceed retry.max_delay_ms",
            ));
        }
        Ok(())
    }

    pub fn repository_timeout(&self) -> Duration {
        Duration::from_millis(self.repository_timeout_ms)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

fn parse_env<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid value for {}: {:?}", key, raw);
            None
        }
    }
}

fn default_data_dir() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);
    path.push("lineage-sync");
    path
}
