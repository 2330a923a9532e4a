// ABOUTME: File system watcher for one repository - reports work tree changes while its gate is open

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Component, Path};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use super::{GitError, Repository, WatchGate};
use crate::app::GroupEvent;

pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    repo_id: String,
}

impl FileWatcher {
    /// Start watching `repo`'s work tree and index. Events arriving while the
    /// repository's watch gate is closed are dropped.
    pub fn new(
        repo: &Repository,
        poll_interval: Duration,
        sender: UnboundedSender<GroupEvent>,
    ) -> Result<Self, GitError> {
        let gate: WatchGate = repo.watch_gate();
        let repo_id = repo.node_id().to_string();
        let event_repo_id = repo_id.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if !gate.is_enabled() || event.paths.iter().all(|p| is_ignored(p)) {
                        return;
                    }
                    let _ = sender.send(GroupEvent::WorkTreeChanged {
                        repo_id: event_repo_id.clone(),
                    });
                }
                Err(e) => warn!("Watcher error for {}: {}", event_repo_id, e),
            },
            Config::default().with_poll_interval(poll_interval),
        )
        .map_err(|e| GitError::Worker(e.to_string()))?;

        watcher
            .watch(Path::new(repo.full_path()), RecursiveMode::Recursive)
            .map_err(|e| GitError::Worker(e.to_string()))?;

        let index_path = repo.git_dir().join("index");
        if index_path.exists() {
            let _ = watcher.watch(&index_path, RecursiveMode::NonRecursive);
        }

        debug!("Watching {}", repo_id);
        Ok(Self {
            _watcher: watcher,
            repo_id,
        })
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }
}

/// Object database and lock-file churn never changes what `status` reports.
fn is_ignored(path: &Path) -> bool {
    let mut components = path.components().skip_while(|c| *c != Component::Normal(".git".as_ref()));
    if components.next().is_none() {
        return false;
    }
    match components.next() {
        Some(Component::Normal(name)) => name == "objects" || name == "logs" || name.to_string_lossy().ends_with(".lock"),
        _ => false,
    }
}
