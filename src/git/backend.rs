// ABOUTME: Default git backend - libgit2 for discovery and status queries, the git CLI for mutations

use git2::{BranchType, Repository as GitRepository, Status, StatusOptions};
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, error};

use super::{GitBackend, GitCommand, GitError};
use crate::models::{BranchSummary, ChangeRecord, ChangeState};

#[derive(Debug, Clone, Default)]
pub struct CliBackend;

impl CliBackend {
    pub fn new() -> Self {
        Self
    }

    fn open(repo_path: &str) -> Result<GitRepository, GitError> {
        GitRepository::open(repo_path).map_err(|_| GitError::NotARepository(repo_path.to_string()))
    }

    fn run(repo_path: &str, args: &[String]) -> Result<String, GitError> {
        debug!("Running git {:?} in {}", args, repo_path);
        let output = Command::new("git")
            .args(args)
            .current_dir(repo_path)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_ASKPASS", "echo")
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!("git {} failed in {}: {}", args.join(" "), repo_path, stderr);
            return Err(GitError::CommandFailed {
                command: args.first().cloned().unwrap_or_default(),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl GitBackend for CliBackend {
    fn query_git_dir(&self, path: &str) -> Option<PathBuf> {
        match GitRepository::open(path) {
            Ok(repo) if !repo.is_bare() => Some(repo.path().to_path_buf()),
            Ok(_) => None,
            Err(e) => {
                debug!("{} is not a repository: {}", path, e);
                None
            }
        }
    }

    fn query_changes(&self, repo_path: &str, include_untracked: bool) -> Result<Vec<ChangeRecord>, GitError> {
        let repo = Self::open(repo_path)?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(include_untracked)
            .recurse_untracked_dirs(true)
            .include_ignored(false)
            .include_unmodified(false)
            .renames_head_to_index(true)
            .renames_index_to_workdir(true);

        let statuses = repo.statuses(Some(&mut opts))?;
        let mut changes = Vec::with_capacity(statuses.len());

        for entry in statuses.iter() {
            let status = entry.status();
            let path = entry.path().unwrap_or_default().to_string();

            if status.is_conflicted() {
                changes.push(ChangeRecord::new(path, ChangeState::Unmerged, ChangeState::Unmerged));
                continue;
            }
            if status.is_wt_new() && !status.intersects(index_flags()) {
                changes.push(ChangeRecord::new(path, ChangeState::Untracked, ChangeState::Untracked));
                continue;
            }

            let index = index_state(status);
            let work_tree = work_tree_state(status);
            if index == ChangeState::None && work_tree == ChangeState::None {
                continue;
            }

            let renamed_from = entry
                .head_to_index()
                .or_else(|| entry.index_to_workdir())
                .filter(|_| index == ChangeState::Renamed || work_tree == ChangeState::Renamed)
                .and_then(|delta| delta.old_file().path().map(|p| p.to_string_lossy().to_string()));

            let path = match renamed_from {
                Some(old) if old != path => format!("{old}\t{path}"),
                _ => path,
            };
            changes.push(ChangeRecord::new(path, index, work_tree));
        }

        debug!("{} changes in {}", changes.len(), repo_path);
        Ok(changes)
    }

    fn query_branches(&self, repo_path: &str) -> Result<BranchSummary, GitError> {
        let repo = Self::open(repo_path)?;
        let mut summary = BranchSummary::default();

        if let Ok(head) = repo.head() {
            if head.is_branch() {
                summary.current = head.shorthand().map(str::to_string);
            }
            if let (Some(name), Some(local_oid)) = (summary.current.clone(), head.target()) {
                let upstream = repo
                    .find_branch(&name, BranchType::Local)
                    .and_then(|branch| branch.upstream());
                if let Ok(upstream) = upstream {
                    if let Some(upstream_oid) = upstream.get().target() {
                        let (ahead, behind) = repo.graph_ahead_behind(local_oid, upstream_oid)?;
                        summary.ahead = ahead;
                        summary.behind = behind;
                    }
                }
            }
        }

        for branch in repo.branches(Some(BranchType::Local))? {
            let (branch, _) = branch?;
            if let Some(name) = branch.name()? {
                summary.local.push(name.to_string());
            }
        }
        summary.local.sort();

        Ok(summary)
    }

    fn exec(&self, repo_path: &str, command: &GitCommand) -> Result<String, GitError> {
        let mut stdout = String::new();
        for args in command.invocations() {
            stdout.push_str(&Self::run(repo_path, &args)?);
        }
        Ok(stdout)
    }
}

fn index_flags() -> Status {
    Status::INDEX_NEW
        | Status::INDEX_MODIFIED
        | Status::INDEX_DELETED
        | Status::INDEX_RENAMED
        | Status::INDEX_TYPECHANGE
}

fn index_state(status: Status) -> ChangeState {
    if status.is_index_new() {
        ChangeState::Added
    } else if status.is_index_deleted() {
        ChangeState::Deleted
    } else if status.is_index_renamed() {
        ChangeState::Renamed
    } else if status.is_index_typechange() {
        ChangeState::TypeChanged
    } else if status.is_index_modified() {
        ChangeState::Modified
    } else {
        ChangeState::None
    }
}

fn work_tree_state(status: Status) -> ChangeState {
    if status.is_wt_new() {
        ChangeState::Untracked
    } else if status.is_wt_deleted() {
        ChangeState::Deleted
    } else if status.is_wt_renamed() {
        ChangeState::Renamed
    } else if status.is_wt_typechange() {
        ChangeState::TypeChanged
    } else if status.is_wt_modified() {
        ChangeState::Modified
    } else {
        ChangeState::None
    }
}
