// ABOUTME: Multi-repository engine - task host, repository groups, working copy aggregation

pub mod notifications;
pub mod registry;
pub mod repository_group;
pub mod task_host;
pub mod tasks;
pub mod working_copy;

use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::git::{ChangeObserver, GitError};

pub use notifications::{Notification, NotificationLog, Notifier, TracingNotifier};
pub use registry::WorkspaceRegistry;
pub use repository_group::{longest_common_prefix, RepositoryGroup, RepositorySet, TreeRow};
pub use task_host::{Popup, TaskHost};
pub use working_copy::{BusyFlags, ChangeAction, DetailContext, GroupSettings, WorkingCopyAggregator};

// === Group Errors ===

/// Failures raised by group operations, each tied to the repository path or node it concerns.
#[derive(Debug, Error)]
pub enum GroupError {
    /// User input rejected before anything was run
    #[error("{message}")]
    Validation { scope: String, message: String },

    /// Another operation is already in progress on the host
    #[error("Another operation is in progress")]
    Busy { scope: String },

    /// The git tool reported a failure
    #[error("{source}")]
    Tool {
        scope: String,
        #[source]
        source: GitError,
    },

    #[error("Not a git repository")]
    NotARepository { scope: String },

    /// Selection mixes conflicted and non-conflicted changes
    #[error("Selection mixes conflicted and non-conflicted changes")]
    ConflictingSelection { scope: String },

    #[error("Unknown node: {id}")]
    UnknownNode { id: String },
}

impl GroupError {
    pub fn scope(&self) -> &str {
        match self {
            Self::Validation { scope, .. }
            | Self::Busy { scope }
            | Self::Tool { scope, .. }
            | Self::NotARepository { scope }
            | Self::ConflictingSelection { scope } => scope,
            Self::UnknownNode { id } => id,
        }
    }

    pub fn validation(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            scope: scope.into(),
            message: message.into(),
        }
    }

    pub fn tool(scope: impl Into<String>, source: GitError) -> Self {
        Self::Tool {
            scope: scope.into(),
            source,
        }
    }
}

/// Result type for group operations
pub type GroupResult<T> = Result<T, GroupError>;

// === Group Events ===

/// Signals delivered to the task that owns a group's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupEvent {
    /// The file watcher saw the work tree change
    WorkTreeChanged { repo_id: String },
    /// A repository's change lists were replaced by a dirty pass
    ChangesUpdated { repo_id: String },
}

impl ChangeObserver for UnboundedSender<GroupEvent> {
    fn on_changes_updated(&self, repo_id: &str) {
        let _ = self.send(GroupEvent::ChangesUpdated {
            repo_id: repo_id.to_string(),
        });
    }
}
