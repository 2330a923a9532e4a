// ABOUTME: Shared CLI setup - loads config, builds the group tree and opens every repository
//
// Every command works on one group built from either a saved layout or a fresh scan.
// Notifications raised by the engine are collected and printed when the command ends.

use anyhow::{anyhow, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::{Cli, OutputFormat};
use crate::app::{NotificationLog, RepositoryGroup, TaskHost, WorkspaceRegistry};
use crate::config::AppConfig;
use crate::git::{CliBackend, GroupLayout, WorkspaceScanner};
use crate::models::RepositoryNode;

pub struct Workspace {
    pub config: AppConfig,
    pub log: NotificationLog,
    pub group: RepositoryGroup,
}

impl Workspace {
    /// Build the group described by `cli` and load every repository's changes and branches.
    pub async fn open(cli: &Cli) -> Result<Self> {
        let config = AppConfig::load()?;
        let root = load_tree(cli.layout.as_deref(), &cli.root, &config)?;

        let log = NotificationLog::new();
        let host = TaskHost::new(root.name.clone(), Arc::new(log.clone()));
        let mut group = RepositoryGroup::new(
            root,
            Arc::new(CliBackend::default()),
            WorkspaceRegistry::shared(),
            host,
            config.group_settings(),
        );
        let failures = group.reload().await;
        info!(
            "Opened group {} with {} repositories ({} failed to load)",
            group.root().name,
            group.repositories().len(),
            failures
        );

        Ok(Self { config, log, group })
    }

    /// Print collected notifications and fail if any of them is an error.
    pub fn finish(&self, format: OutputFormat) -> Result<()> {
        let notifications = self.log.drain();
        let errors = notifications.iter().filter(|n| n.is_error).count();

        match format {
            OutputFormat::Json => {
                if !notifications.is_empty() {
                    eprintln!("{}", serde_json::to_string_pretty(&notifications)?);
                }
            }
            OutputFormat::Text => {
                for n in &notifications {
                    let level = if n.is_error { "error" } else { "info" };
                    eprintln!("{level}: {}: {}", n.scope, n.message);
                }
            }
        }

        if errors > 0 {
            return Err(anyhow!("{errors} operation(s) failed"));
        }
        Ok(())
    }
}

/// The group tree from `layout` if given, otherwise scanned from `root`.
pub fn load_tree(layout: Option<&Path>, root: &Path, config: &AppConfig) -> Result<RepositoryNode> {
    match layout {
        Some(path) => Ok(GroupLayout::load(path)?.root),
        None => WorkspaceScanner::new()
            .with_max_depth(config.scanner.max_depth)
            .with_exclude_paths(config.scanner.exclude_paths.clone())
            .scan(root),
    }
}

/// Truncate a string to fit in the given width (character-aware for UTF-8)
pub fn truncate(s: &str, max_len: usize) -> String {
    if max_len <= 3 {
        return ".".repeat(max_len);
    }
    let char_count = s.chars().count();
    if char_count <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
