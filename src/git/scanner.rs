// ABOUTME: Workspace discovery - walks a directory for git repositories and builds a node tree
// Includes JSON persistence of a group's tree layout

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::models::RepositoryNode;

// ============================================================================
// Group Layout - persisted node tree
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupLayout {
    /// Layout format version for compatibility
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub root: RepositoryNode,
}

impl GroupLayout {
    const VERSION: u32 = 1;

    pub fn new(root: RepositoryNode) -> Self {
        Self {
            version: Self::VERSION,
            saved_at: Utc::now(),
            root,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)
            .with_context(|| format!("Failed to open layout {}", path.display()))?;
        let layout: Self = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse layout {}", path.display()))?;

        if layout.version != Self::VERSION {
            warn!(
                "Layout {} has version {} (expected {})",
                path.display(),
                layout.version,
                Self::VERSION
            );
        }
        debug!("Loaded layout from {}", path.display());
        Ok(layout)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        info!("Saved layout to {} ({} repos)", path.display(), self.root.repository_ids().len());
        Ok(())
    }
}

// ============================================================================
// Workspace Scanner
// ============================================================================

pub struct WorkspaceScanner {
    max_depth: usize,
    ignore_patterns: Vec<String>,
}

impl Default for WorkspaceScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkspaceScanner {
    pub fn new() -> Self {
        Self {
            max_depth: 3,
            ignore_patterns: vec![
                "node_modules".to_string(),
                ".git".to_string(),
                "target".to_string(),
                "dist".to_string(),
                "build".to_string(),
            ],
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Add additional exclude patterns from config
    pub fn with_exclude_paths(mut self, exclude_paths: Vec<String>) -> Self {
        for pattern in exclude_paths {
            if !self.ignore_patterns.contains(&pattern) {
                self.ignore_patterns.push(pattern);
            }
        }
        self
    }

    /// Build the node tree rooted at `root`. The root itself becomes an expanded folder
    /// named after the directory, or a single repository leaf if it is one.
    pub fn scan(&self, root: &Path) -> Result<RepositoryNode> {
        let root = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", root.display()))?;
        info!("Scanning {} (max depth {})", root.display(), self.max_depth);

        if is_repository(&root) {
            return Ok(RepositoryNode::folder(dir_name(&root))
                .expanded()
                .with_children(vec![RepositoryNode::repository(path_id(&root))]));
        }

        let children = self.scan_directory(&root, 0);
        let node = RepositoryNode::folder(dir_name(&root)).expanded().with_children(children);
        info!("Scan complete: found {} repositories", node.repository_ids().len());
        Ok(node)
    }

    fn scan_directory(&self, path: &Path, current_depth: usize) -> Vec<RepositoryNode> {
        if current_depth >= self.max_depth {
            return Vec::new();
        }

        let entries = match fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                return Vec::new();
            }
        };

        let mut dirs: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|p| p.is_dir())
            .filter(|p| !self.is_ignored(p))
            .collect();
        dirs.sort();

        let mut nodes = Vec::new();
        for dir in dirs {
            if is_repository(&dir) {
                debug!("Found git repository at: {}", dir.display());
                // Don't recurse into git repositories
                nodes.push(RepositoryNode::repository(path_id(&dir)));
                continue;
            }

            let children = self.scan_directory(&dir, current_depth + 1);
            if !children.is_empty() {
                nodes.push(RepositoryNode::folder(dir_name(&dir)).expanded().with_children(children));
            }
        }
        nodes
    }

    fn is_ignored(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| self.ignore_patterns.iter().any(|pattern| name == pattern))
    }
}

fn is_repository(path: &Path) -> bool {
    path.join(".git").exists() && git2::Repository::open(path).is_ok()
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("workspace")
        .to_string()
}

fn path_id(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
