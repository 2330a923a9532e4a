// ABOUTME: Opened repository handle - cached working copy and branches, watcher gate, change subscribers

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use super::{GitBackend, GitCommand, GitError};
use crate::models::{BranchSummary, ChangeRecord, InProgressKind};

/// Receives a notification whenever a repository's staged or unstaged list changes.
pub trait ChangeObserver: Send + Sync {
    fn on_changes_updated(&self, repo_id: &str);
}

pub type ObserverId = u64;

/// Shared on/off switch consulted by the file watcher before it reports anything.
#[derive(Debug, Clone)]
pub struct WatchGate(Arc<AtomicBool>);

impl Default for WatchGate {
    fn default() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }
}

impl WatchGate {
    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.0.store(enabled, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct RepositoryState {
    changes: Vec<ChangeRecord>,
    branches: BranchSummary,
    commit_messages: VecDeque<String>,
    include_untracked: bool,
}

pub struct Repository {
    node_id: String,
    full_path: String,
    git_dir: PathBuf,
    backend: Arc<dyn GitBackend>,
    watch_gate: WatchGate,
    commit_history_limit: usize,
    state: Mutex<RepositoryState>,
    observers: Mutex<Vec<(ObserverId, Arc<dyn ChangeObserver>)>>,
    next_observer: AtomicU64,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("full_path", &self.full_path)
            .field("git_dir", &self.git_dir)
            .finish_non_exhaustive()
    }
}

impl Repository {
    /// Open a handle for the repository leaf `node_id` whose git directory is `git_dir`.
    pub fn open(node_id: &str, git_dir: PathBuf, backend: Arc<dyn GitBackend>) -> Arc<Self> {
        debug!("Opening repository {} (git dir {})", node_id, git_dir.display());
        Arc::new(Self {
            node_id: node_id.to_string(),
            full_path: node_id.trim_end_matches('/').to_string(),
            git_dir,
            backend,
            watch_gate: WatchGate::default(),
            commit_history_limit: 10,
            state: Mutex::new(RepositoryState {
                include_untracked: true,
                ..RepositoryState::default()
            }),
            observers: Mutex::new(Vec::new()),
            next_observer: AtomicU64::new(1),
        })
    }

    pub fn with_commit_history_limit(self: Arc<Self>, limit: usize) -> Arc<Self> {
        match Arc::try_unwrap(self) {
            Ok(mut repo) => {
                repo.commit_history_limit = limit.max(1);
                Arc::new(repo)
            }
            Err(shared) => shared,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn full_path(&self) -> &str {
        &self.full_path
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn name(&self) -> &str {
        self.full_path.rsplit('/').next().unwrap_or(&self.full_path)
    }

    fn state(&self) -> MutexGuard<'_, RepositoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records with something in the index.
    pub fn staged(&self) -> Vec<ChangeRecord> {
        self.state().changes.iter().filter(|c| c.is_staged()).cloned().collect()
    }

    /// Records with something in the work tree.
    pub fn unstaged(&self) -> Vec<ChangeRecord> {
        self.state().changes.iter().filter(|c| c.is_unstaged()).cloned().collect()
    }

    pub fn branches(&self) -> BranchSummary {
        self.state().branches.clone()
    }

    pub fn include_untracked(&self) -> bool {
        self.state().include_untracked
    }

    pub fn set_include_untracked(&self, include: bool) {
        self.state().include_untracked = include;
    }

    pub fn watch_gate(&self) -> WatchGate {
        self.watch_gate.clone()
    }

    pub fn is_watcher_enabled(&self) -> bool {
        self.watch_gate.is_enabled()
    }

    pub fn set_watcher_enabled(&self, enabled: bool) {
        debug!("Watcher for {} {}", self.full_path, if enabled { "enabled" } else { "disabled" });
        self.watch_gate.set_enabled(enabled);
    }

    /// Most recent first.
    pub fn commit_messages(&self) -> Vec<String> {
        self.state().commit_messages.iter().cloned().collect()
    }

    pub fn push_commit_message(&self, message: &str) {
        let message = message.trim();
        if message.is_empty() {
            return;
        }
        let limit = self.commit_history_limit;
        let mut state = self.state();
        state.commit_messages.retain(|m| m != message);
        state.commit_messages.push_front(message.to_string());
        state.commit_messages.truncate(limit);
    }

    pub fn subscribe(&self, observer: Arc<dyn ChangeObserver>) -> ObserverId {
        let id = self.next_observer.fetch_add(1, Ordering::SeqCst);
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));
        id
    }

    pub fn unsubscribe(&self, id: ObserverId) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(observer_id, _)| *observer_id != id);
    }

    fn notify_changes_updated(&self) {
        let observers: Vec<_> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            observer.on_changes_updated(&self.node_id);
        }
    }

    /// Run `command` on a worker thread and wait for it.
    pub async fn exec(&self, command: GitCommand) -> Result<String, GitError> {
        debug!("git {} in {} ({} files)", command.name(), self.full_path, command.files().len());
        let backend = Arc::clone(&self.backend);
        let path = self.full_path.clone();
        let name = command.name();
        let result = tokio::task::spawn_blocking(move || backend.exec(&path, &command))
            .await
            .map_err(|e| GitError::Worker(e.to_string()))?;
        if let Err(e) = &result {
            warn!("git {} failed in {}: {}", name, self.full_path, e);
        }
        result
    }

    /// Re-run change detection, replace the cached records and notify subscribers
    /// when the staged or unstaged list differs.
    pub async fn mark_working_copy_dirty(self: &Arc<Self>) -> Result<(), GitError> {
        let backend = Arc::clone(&self.backend);
        let path = self.full_path.clone();
        let include_untracked = self.include_untracked();
        let mut changes = tokio::task::spawn_blocking(move || backend.query_changes(&path, include_untracked))
            .await
            .map_err(|e| GitError::Worker(e.to_string()))??;

        for change in &mut changes {
            change.set_repository(self);
        }

        let changed = {
            let mut state = self.state();
            let changed = !same_changes(&state.changes, &changes);
            state.changes = changes;
            changed
        };

        if changed {
            debug!("Working copy of {} changed", self.full_path);
            self.notify_changes_updated();
        }
        Ok(())
    }

    pub async fn mark_branches_dirty(&self) -> Result<(), GitError> {
        let backend = Arc::clone(&self.backend);
        let path = self.full_path.clone();
        let branches = tokio::task::spawn_blocking(move || backend.query_branches(&path))
            .await
            .map_err(|e| GitError::Worker(e.to_string()))??;
        self.state().branches = branches;
        Ok(())
    }

    /// Best-effort scan of the git directory for an unfinished multi-step operation.
    pub fn in_progress(&self) -> Option<InProgressKind> {
        super::in_progress::scan(&self.git_dir)
    }
}

fn same_changes(old: &[ChangeRecord], new: &[ChangeRecord]) -> bool {
    old.len() == new.len() && old.iter().zip(new).all(|(a, b)| a.key() == b.key())
}
