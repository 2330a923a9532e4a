// ABOUTME: Git collaborator contracts - discovery, change detection, command execution - and their default implementation

pub mod backend;
pub mod in_progress;
pub mod repository;
pub mod scanner;
pub mod watcher;

use std::path::PathBuf;
use thiserror::Error;

use crate::models::{BranchSummary, ChangeRecord, InProgressKind};

pub use backend::CliBackend;
pub use repository::{ChangeObserver, ObserverId, Repository, WatchGate};
pub use scanner::{GroupLayout, WorkspaceScanner};
pub use watcher::FileWatcher;

#[derive(Error, Debug)]
pub enum GitError {
    #[error("Git repository error: {0}")]
    Git(#[from] git2::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Not a git repository: {0}")]
    NotARepository(String),
    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// A named operation against one repository's work tree.
///
/// Batched variants carry the explicit file subset they apply to; `None` means the whole tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitCommand {
    Add { files: Option<Vec<String>>, include_untracked: bool },
    Reset { files: Option<Vec<String>> },
    UnstageForAmend { files: Vec<String> },
    Commit { message: String, amend: bool, sign_off: bool },
    UseTheirs { files: Vec<String> },
    UseMine { files: Vec<String> },
    Fetch,
    Pull { rebase: bool, auto_stash: bool },
    Push,
    Checkout { branch: String, discard_local: bool },
    Restore { files: Vec<String> },
    Clean { files: Vec<String> },
    DiscardAll { include_ignored: bool },
    Abort(InProgressKind),
}

impl GitCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Reset { .. } | Self::UnstageForAmend { .. } => "reset",
            Self::Commit { .. } => "commit",
            Self::UseTheirs { .. } | Self::UseMine { .. } | Self::Checkout { .. } => "checkout",
            Self::Fetch => "fetch",
            Self::Pull { .. } => "pull",
            Self::Push => "push",
            Self::Restore { .. } => "restore",
            Self::Clean { .. } => "clean",
            Self::DiscardAll { .. } => "discard",
            Self::Abort(kind) => kind.command(),
        }
    }

    /// Files this command is restricted to, empty for whole-tree commands.
    pub fn files(&self) -> &[String] {
        match self {
            Self::Add { files: Some(files), .. } | Self::Reset { files: Some(files) } => files,
            Self::UnstageForAmend { files }
            | Self::UseTheirs { files }
            | Self::UseMine { files }
            | Self::Restore { files }
            | Self::Clean { files } => files,
            _ => &[],
        }
    }

    /// `git` argument vectors, run in order, that carry out this command.
    pub fn invocations(&self) -> Vec<Vec<String>> {
        fn argv(head: &[&str], files: &[String]) -> Vec<String> {
            let mut args: Vec<String> = head.iter().map(|s| (*s).to_string()).collect();
            if !files.is_empty() {
                args.push("--".to_string());
                args.extend(files.iter().cloned());
            }
            args
        }

        match self {
            Self::Add { files: Some(files), .. } => vec![argv(&["add"], files)],
            Self::Add { files: None, include_untracked: true } => vec![argv(&["add", "."], &[])],
            Self::Add { files: None, include_untracked: false } => vec![argv(&["add", "-u", "."], &[])],
            Self::Reset { files: Some(files) } => vec![argv(&["reset", "-q"], files)],
            Self::Reset { files: None } => vec![argv(&["reset", "-q"], &[])],
            Self::UnstageForAmend { files } => vec![argv(&["reset", "-q", "HEAD^"], files)],
            Self::Commit { message, amend, sign_off } => {
                let mut args = argv(&["commit", "--no-gpg-sign", "-m"], &[]);
                args.push(message.clone());
                if *amend {
                    args.push("--amend".to_string());
                }
                if *sign_off {
                    args.push("--signoff".to_string());
                }
                vec![args]
            }
            Self::UseTheirs { files } => vec![argv(&["checkout", "--theirs"], files)],
            Self::UseMine { files } => vec![argv(&["checkout", "--ours"], files)],
            Self::Fetch => vec![argv(&["fetch", "--all", "--prune"], &[])],
            Self::Pull { rebase, auto_stash } => {
                let mut args = argv(&["pull", "--verbose"], &[]);
                args.push(if *rebase { "--rebase" } else { "--no-rebase" }.to_string());
                if *auto_stash {
                    args.push("--autostash".to_string());
                }
                vec![args]
            }
            Self::Push => vec![argv(&["push"], &[])],
            Self::Checkout { branch, discard_local } => {
                let mut args = argv(&["checkout"], &[]);
                if *discard_local {
                    args.push("--force".to_string());
                }
                args.push(branch.clone());
                vec![args]
            }
            Self::Restore { files } => vec![argv(&["checkout", "-f", "-q"], files)],
            Self::Clean { files } => vec![argv(&["clean", "-f", "-q"], files)],
            Self::DiscardAll { include_ignored } => vec![
                argv(&["reset", "--hard", "-q"], &[]),
                argv(if *include_ignored { &["clean", "-qfdx"] } else { &["clean", "-qfd"] }, &[]),
            ],
            Self::Abort(kind) => vec![argv(&[kind.command(), "--abort"], &[])],
        }
    }
}

/// Everything the engine needs from the version-control tool. Implementations block;
/// callers run them on worker threads.
#[cfg_attr(test, mockall::automock)]
pub trait GitBackend: Send + Sync {
    /// Git directory of the repository at `path`, `None` if it is not one.
    fn query_git_dir(&self, path: &str) -> Option<PathBuf>;

    /// Current change records of the repository, both index and work-tree side.
    fn query_changes(&self, repo_path: &str, include_untracked: bool) -> Result<Vec<ChangeRecord>, GitError>;

    fn query_branches(&self, repo_path: &str) -> Result<BranchSummary, GitError>;

    /// Run `command`, returning its standard output.
    fn exec(&self, repo_path: &str, command: &GitCommand) -> Result<String, GitError>;
}
