// ABOUTME: Change record model - one file's index/work-tree status inside one repository

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};

use crate::git::repository::Repository;

/// Status of a path on one side (index or work tree) of `git status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeState {
    #[default]
    None,
    Modified,
    TypeChanged,
    Added,
    Deleted,
    Renamed,
    Copied,
    Unmerged,
    Untracked,
}

impl ChangeState {
    /// Porcelain-style single letter, space for `None`.
    pub fn symbol(self) -> char {
        match self {
            Self::None => ' ',
            Self::Modified => 'M',
            Self::TypeChanged => 'T',
            Self::Added => 'A',
            Self::Deleted => 'D',
            Self::Renamed => 'R',
            Self::Copied => 'C',
            Self::Unmerged => 'U',
            Self::Untracked => '?',
        }
    }
}

impl fmt::Display for ChangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Identity of a change used for diffing two change sets.
pub type ChangeKey = (String, ChangeState, ChangeState);

/// One file's status in one repository.
///
/// Records are produced fresh by every change-detection pass and replaced wholesale;
/// only `repository` and `group_path` are assigned after creation.
#[derive(Debug, Clone, Default)]
pub struct ChangeRecord {
    pub path: String,
    pub original_path: String,
    pub index: ChangeState,
    pub work_tree: ChangeState,
    pub group_path: String,
    repository: Weak<Repository>,
}

impl ChangeRecord {
    pub fn new(path: impl Into<String>, index: ChangeState, work_tree: ChangeState) -> Self {
        let mut change = Self {
            path: path.into(),
            ..Self::default()
        };
        change.set(index, work_tree);
        change
    }

    /// Assign both states, splitting rename records (`old\tnew` or `old -> new`)
    /// and unquoting paths.
    pub fn set(&mut self, index: ChangeState, work_tree: ChangeState) {
        self.index = index;
        self.work_tree = work_tree;

        if index == ChangeState::Renamed || work_tree == ChangeState::Renamed {
            if let Some((old, new)) = self.path.split_once('\t') {
                self.original_path = old.to_string();
                self.path = new.to_string();
            } else if let Some(idx) = self.path.find(" -> ").filter(|idx| *idx > 0) {
                self.original_path = self.path[..idx].to_string();
                self.path = self.path[idx + 4..].to_string();
            }
        }

        self.path = unquote(&self.path);
        self.original_path = unquote(&self.original_path);
        if self.group_path.is_empty() {
            self.group_path = self.path.clone();
        }
    }

    pub fn is_conflicted(&self) -> bool {
        matches!(
            (self.index, self.work_tree),
            (ChangeState::Unmerged, _)
                | (_, ChangeState::Unmerged)
                | (ChangeState::Added, ChangeState::Added)
                | (ChangeState::Deleted, ChangeState::Deleted)
        )
    }

    /// Has something to show on the unstaged side.
    pub fn is_unstaged(&self) -> bool {
        self.work_tree != ChangeState::None
    }

    /// Has something recorded in the index.
    pub fn is_staged(&self) -> bool {
        self.index != ChangeState::None && self.index != ChangeState::Untracked
    }

    pub fn key(&self) -> ChangeKey {
        (self.group_path.clone(), self.work_tree, self.index)
    }

    pub fn repository(&self) -> Option<Arc<Repository>> {
        self.repository.upgrade()
    }

    /// Full path of the owning repository, if it is still open.
    pub fn repository_path(&self) -> Option<String> {
        self.repository().map(|repo| repo.full_path().to_string())
    }

    pub fn set_repository(&mut self, repository: &Arc<Repository>) {
        self.repository = Arc::downgrade(repository);
    }

    /// Stamp the owning repository and derive `group_path` from the group's common prefix.
    pub fn attach(&mut self, repository: &Arc<Repository>, path_prefix: &str) {
        self.set_repository(repository);
        self.group_path = group_path(repository.full_path(), path_prefix, &self.path);
    }
}

/// `<repo path relative to prefix>/<path>` with surrounding slashes trimmed.
pub fn group_path(repo_full_path: &str, path_prefix: &str, path: &str) -> String {
    let relative = repo_full_path
        .strip_prefix(path_prefix)
        .unwrap_or(repo_full_path);
    format!("{relative}/{path}").trim_matches('/').to_string()
}

fn unquote(path: &str) -> String {
    if path.len() >= 2 && path.starts_with('"') && path.ends_with('"') {
        path[1..path.len() - 1].to_string()
    } else {
        path.to_string()
    }
}
