// ABOUTME: Configuration management for gitgroup
// Handles group behavior, file watching, workspace scanning and logging settings

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::app::GroupSettings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application version
    #[serde(default = "default_version")]
    pub version: String,

    /// Working copy and group command behavior
    #[serde(default)]
    pub group: GroupConfig,

    /// File system watching
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Workspace discovery
    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Show untracked files in the unstaged list
    #[serde(default = "default_true")]
    pub include_untracked: bool,

    /// Stage everything before committing
    #[serde(default)]
    pub auto_stage_before_commit: bool,

    /// Files per `git add`/`git reset` when only part of a repository is selected
    #[serde(default = "default_stage_batch_size")]
    pub stage_batch_size: usize,

    #[serde(default)]
    pub pull_use_rebase: bool,

    /// Add a Signed-off-by trailer to commits
    #[serde(default)]
    pub sign_off: bool,

    /// Commit messages remembered per repository
    #[serde(default = "default_commit_history_limit")]
    pub commit_history_limit: usize,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            include_untracked: default_true(),
            auto_stage_before_commit: false,
            stage_batch_size: default_stage_batch_size(),
            pull_use_rebase: false,
            sign_off: false,
            commit_history_limit: default_commit_history_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Poll interval for backends without native events
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl WatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Directory names to skip in addition to the built-in ones
    #[serde(default)]
    pub exclude_paths: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            exclude_paths: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_true() -> bool {
    true
}

fn default_stage_batch_size() -> usize {
    10
}

fn default_commit_history_limit() -> usize {
    10
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_max_depth() -> usize {
    3
}

fn default_log_filter() -> String {
    "gitgroup=info".to_string()
}

impl AppConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_paths())
    }

    /// Load and merge `paths`, the first path taking precedence.
    ///
    /// Files are layered key by key, so any value a file sets explicitly wins over the files
    /// after it, even when it equals the default. Arrays are unioned.
    pub fn load_from(paths: &[PathBuf]) -> Result<Self> {
        let mut layered = toml::Table::new();

        for path in paths.iter().rev() {
            if path.exists() {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config from {}", path.display()))?;

                // Type errors are attributed to the file that caused them
                toml::from_str::<AppConfig>(&content)
                    .with_context(|| format!("Failed to parse config from {}", path.display()))?;
                let table: toml::Table = toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config from {}", path.display()))?;

                debug!("Merging config from {}", path.display());
                merge_tables(&mut layered, table);
            }
        }

        toml::Value::Table(layered)
            .try_into()
            .context("Failed to combine configuration files")
    }

    /// Save configuration to user config directory
    pub fn save(&self) -> Result<()> {
        let config_dir = Self::get_user_config_dir()?;
        self.save_to(&config_dir.join("config.toml"))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get configuration file paths in order of precedence
    fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        // 1. Local project config
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd.join(".gitgroup").join("config.toml"));
        }

        // 2. User config (~/.gitgroup/config.toml)
        if let Ok(config_dir) = Self::get_user_config_dir() {
            paths.push(config_dir.join("config.toml"));
        }

        paths
    }

    /// Get user configuration directory
    pub fn get_user_config_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home_dir.join(".gitgroup"))
    }

    /// Directory for JSON log files
    pub fn log_dir() -> Result<PathBuf> {
        Ok(Self::get_user_config_dir()?.join("logs"))
    }

    pub fn group_settings(&self) -> GroupSettings {
        GroupSettings {
            include_untracked: self.group.include_untracked,
            auto_stage_before_commit: self.group.auto_stage_before_commit,
            stage_batch_size: self.group.stage_batch_size.max(1),
            pull_use_rebase: self.group.pull_use_rebase,
            sign_off: self.group.sign_off,
            commit_history_limit: self.group.commit_history_limit.max(1),
        }
    }
}

/// Overlay `upper` onto `base`: tables merge recursively, arrays are unioned, anything else
/// is replaced.
fn merge_tables(base: &mut toml::Table, upper: toml::Table) {
    for (key, value) in upper {
        let slot = match base.entry(key) {
            toml::map::Entry::Vacant(entry) => {
                entry.insert(value);
                continue;
            }
            toml::map::Entry::Occupied(entry) => entry.into_mut(),
        };
        match (slot, value) {
            (toml::Value::Table(lower), toml::Value::Table(upper)) => merge_tables(lower, upper),
            (toml::Value::Array(lower), toml::Value::Array(upper)) => {
                for item in upper {
                    if !lower.contains(&item) {
                        lower.push(item);
                    }
                }
            }
            (slot, value) => *slot = value,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            group: GroupConfig::default(),
            watcher: WatcherConfig::default(),
            scanner: ScannerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
