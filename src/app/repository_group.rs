// ABOUTME: Repository group - a searchable node tree, the repositories opened under it,
// their common path prefix, and group-wide fetch/pull/push/checkout fan-out

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use super::task_host::TaskHost;
use super::tasks::{AbortInProgress, Checkout, Fetch, Pull, Push};
use super::working_copy::{GroupSettings, WorkingCopyAggregator};
use super::{GroupError, GroupEvent, Notifier, WorkspaceRegistry};
use crate::git::{ChangeObserver, GitBackend, Repository};
use crate::models::{ChangeRecord, InProgressContext, RepositoryNode};

// === Repository Set ===

/// Repositories opened by one group and their common path prefix.
/// Shared between the group and its working copy aggregator.
#[derive(Debug, Default)]
pub struct RepositorySet {
    repos: Vec<Arc<Repository>>,
    path_prefix: String,
}

impl RepositorySet {
    pub fn repositories(&self) -> &[Arc<Repository>] {
        &self.repos
    }

    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }

    pub fn get(&self, node_id: &str) -> Option<&Arc<Repository>> {
        self.repos.iter().find(|r| r.node_id() == node_id)
    }

    fn recompute_prefix(&mut self) {
        let mut iter = self.repos.iter();
        self.path_prefix = match iter.next() {
            Some(first) => iter.fold(first.full_path().to_string(), |prefix, repo| {
                longest_common_prefix(&prefix, repo.full_path())
            }),
            None => String::new(),
        };
    }

    /// Staged then unstaged records of every repository, stamped with their owner and
    /// group path. The first record seen for a group path wins.
    pub fn merged_changes(&self) -> Vec<ChangeRecord> {
        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for repo in &self.repos {
            for mut change in repo.staged().into_iter().chain(repo.unstaged()) {
                change.attach(repo, &self.path_prefix);
                if seen.insert(change.group_path.clone()) {
                    merged.push(change);
                }
            }
        }
        merged
    }

    /// One context per repository that is mid-operation, highest priority first.
    pub fn scan_in_progress(&self) -> Vec<InProgressContext> {
        let mut contexts: Vec<InProgressContext> = self
            .repos
            .iter()
            .filter_map(|repo| {
                repo.in_progress().map(|kind| InProgressContext {
                    kind,
                    repository: repo.full_path().to_string(),
                })
            })
            .collect();
        contexts.sort_by_key(|c| c.kind);
        contexts
    }
}

/// Character-wise common prefix; empty if either side is empty.
pub fn longest_common_prefix(a: &str, b: &str) -> String {
    if a.is_empty() || b.is_empty() {
        return String::new();
    }
    a.chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x)
        .collect()
}

// === Tree Rows ===

/// One visible node in the flattened tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRow {
    pub id: String,
    pub name: String,
    pub depth: usize,
    pub is_repository: bool,
}

fn make_rows(rows: &mut Vec<TreeRow>, nodes: &mut [RepositoryNode], depth: usize) {
    for node in nodes.iter_mut().filter(|n| n.is_visible) {
        node.depth = depth;
        rows.push(TreeRow {
            id: node.id.clone(),
            name: node.name.clone(),
            depth,
            is_repository: node.is_repository,
        });
        if node.is_expanded && node.has_children() {
            make_rows(rows, &mut node.sub_nodes, depth + 1);
        }
    }
}

fn reset_visibility(node: &mut RepositoryNode) {
    node.is_visible = true;
    for sub in &mut node.sub_nodes {
        reset_visibility(sub);
    }
}

/// `filter` must already be lowercase.
fn set_visibility_by_search(node: &mut RepositoryNode, filter: &str) {
    if node.is_repository {
        node.is_visible =
            node.name.to_lowercase().contains(filter) || node.id.to_lowercase().contains(filter);
        return;
    }
    if node.name.to_lowercase().contains(filter) {
        reset_visibility(node);
        return;
    }
    let mut any_visible = false;
    for sub in &mut node.sub_nodes {
        set_visibility_by_search(sub, filter);
        any_visible |= sub.is_visible;
    }
    node.is_visible = any_visible;
}

// === Repository Group ===

pub struct RepositoryGroup {
    root: RepositoryNode,
    rows: Vec<TreeRow>,
    search_filter: String,
    set: Arc<RwLock<RepositorySet>>,
    backend: Arc<dyn GitBackend>,
    registry: Arc<Mutex<WorkspaceRegistry>>,
    host: TaskHost,
    notifier: Arc<dyn Notifier>,
    settings: GroupSettings,
    events: UnboundedSender<GroupEvent>,
    event_rx: Option<UnboundedReceiver<GroupEvent>>,
    working_copy: Option<WorkingCopyAggregator>,
    current: Option<String>,
    /// Leaves already reported as not being repositories
    reported_missing: HashSet<String>,
}

impl RepositoryGroup {
    pub fn new(
        root: RepositoryNode,
        backend: Arc<dyn GitBackend>,
        registry: Arc<Mutex<WorkspaceRegistry>>,
        host: TaskHost,
        settings: GroupSettings,
    ) -> Self {
        let (events, event_rx) = mpsc::unbounded_channel();
        let notifier = host.notifier();
        let mut group = Self {
            root,
            rows: Vec::new(),
            search_filter: String::new(),
            set: Arc::new(RwLock::new(RepositorySet::default())),
            backend,
            registry,
            host,
            notifier,
            settings,
            events,
            event_rx: Some(event_rx),
            working_copy: None,
            current: None,
            reported_missing: HashSet::new(),
        };
        group.refresh();
        group
    }

    fn set(&self) -> RwLockReadGuard<'_, RepositorySet> {
        self.set.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_mut(&self) -> RwLockWriteGuard<'_, RepositorySet> {
        self.set.write().unwrap_or_else(PoisonError::into_inner)
    }

    // === Accessors ===

    pub fn id(&self) -> &str {
        &self.root.id
    }

    pub fn root(&self) -> &RepositoryNode {
        &self.root
    }

    pub fn node(&self, id: &str) -> Option<&RepositoryNode> {
        self.root.find(id)
    }

    pub fn rows(&self) -> &[TreeRow] {
        &self.rows
    }

    pub fn search_filter(&self) -> &str {
        &self.search_filter
    }

    pub fn path_prefix(&self) -> String {
        self.set().path_prefix().to_string()
    }

    pub fn repositories(&self) -> Vec<Arc<Repository>> {
        self.set().repositories().to_vec()
    }

    pub fn repository(&self, node_id: &str) -> Option<Arc<Repository>> {
        self.set().get(node_id).cloned()
    }

    /// The repository most recently opened or re-visited.
    pub fn current_repository(&self) -> Option<Arc<Repository>> {
        self.current.as_deref().and_then(|id| self.repository(id))
    }

    pub fn host(&self) -> &TaskHost {
        &self.host
    }

    pub fn settings(&self) -> &GroupSettings {
        &self.settings
    }

    pub fn event_sender(&self) -> UnboundedSender<GroupEvent> {
        self.events.clone()
    }

    /// The receiving end of watcher and change events; can be taken once.
    pub fn take_event_receiver(&mut self) -> Option<UnboundedReceiver<GroupEvent>> {
        self.event_rx.take()
    }

    pub fn working_copy(&self) -> Option<&WorkingCopyAggregator> {
        self.working_copy.as_ref()
    }

    pub fn working_copy_mut(&mut self) -> Option<&mut WorkingCopyAggregator> {
        self.working_copy.as_mut()
    }

    /// Only reported while the working copy view is open.
    pub fn in_progress_contexts(&self) -> Vec<InProgressContext> {
        self.working_copy
            .as_ref()
            .map(|wc| wc.in_progress_contexts().to_vec())
            .unwrap_or_default()
    }

    pub fn primary_in_progress(&self) -> Option<InProgressContext> {
        self.working_copy.as_ref().and_then(|wc| wc.primary_in_progress().cloned())
    }

    pub fn has_unsolved_conflicts(&self) -> bool {
        self.working_copy.as_ref().is_some_and(WorkingCopyAggregator::has_unsolved_conflicts)
    }

    // === Tree ===

    /// Recompute visibility, rebuild rows, open every visible repository leaf and
    /// recompute the common path prefix.
    pub fn refresh(&mut self) {
        let filter = self.search_filter.trim().to_lowercase();
        if filter.is_empty() {
            reset_visibility(&mut self.root);
        } else {
            set_visibility_by_search(&mut self.root, &filter);
        }

        let mut rows = Vec::new();
        make_rows(&mut rows, std::slice::from_mut(&mut self.root), 0);
        self.rows = rows;

        for id in self.root.visible_repository_ids() {
            self.open_repo(&id);
        }

        let mut set = self.set_mut();
        set.recompute_prefix();
        debug!(
            "Group {} refreshed: {} rows, {} repositories, prefix '{}'",
            self.root.name,
            self.rows.len(),
            set.repositories().len(),
            set.path_prefix()
        );
    }

    pub fn set_search_filter(&mut self, filter: impl Into<String>) {
        let filter = filter.into();
        if filter != self.search_filter {
            self.search_filter = filter;
            self.refresh();
        }
    }

    pub fn clear_search_filter(&mut self) {
        self.set_search_filter(String::new());
    }

    /// Flip a node's expansion and splice its visible subtree into or out of the rows.
    pub fn toggle_node_is_expanded(&mut self, id: &str) -> bool {
        let Some(node) = self.root.find_mut(id) else {
            self.notifier.report(&GroupError::UnknownNode { id: id.to_string() });
            return false;
        };
        node.is_expanded = !node.is_expanded;
        let depth = node.depth;

        let Some(idx) = self.rows.iter().position(|row| row.id == id) else {
            return true;
        };

        if node.is_expanded {
            let mut sub_rows = Vec::new();
            make_rows(&mut sub_rows, &mut node.sub_nodes, depth + 1);
            self.rows.splice(idx + 1..idx + 1, sub_rows);
        } else {
            let end = self.rows[idx + 1..]
                .iter()
                .position(|row| row.depth <= depth)
                .map_or(self.rows.len(), |offset| idx + 1 + offset);
            self.rows.drain(idx + 1..end);
        }
        true
    }

    /// Attach `node` under the folder `parent` (the root if `None`).
    pub fn add_node(&mut self, parent: Option<&str>, node: RepositoryNode) -> bool {
        let parent_id = parent.unwrap_or(&self.root.id).to_string();
        match self.root.find_mut(&parent_id) {
            Some(folder) if !folder.is_repository => {
                folder.sub_nodes.push(node);
            }
            Some(_) => {
                self.notifier.report(&GroupError::validation(parent_id, "Cannot add a node under a repository"));
                return false;
            }
            None => {
                self.notifier.report(&GroupError::UnknownNode { id: parent_id });
                return false;
            }
        }
        self.refresh();
        true
    }

    /// Remove a node and close every repository under it.
    pub fn remove_node(&mut self, id: &str) -> bool {
        if id == self.root.id {
            self.notifier.report(&GroupError::validation(id, "Cannot remove the group root"));
            return false;
        }
        let Some(removed) = self.root.remove(id) else {
            self.notifier.report(&GroupError::UnknownNode { id: id.to_string() });
            return false;
        };

        let closed = removed.repository_ids();
        {
            let mut set = self.set_mut();
            set.repos.retain(|repo| !closed.contains(&repo.node_id().to_string()));
        }
        {
            let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            for repo_id in &closed {
                registry.unregister(repo_id);
            }
        }
        if let Some(wc) = self.working_copy.as_mut() {
            for repo_id in &closed {
                wc.untrack(repo_id);
            }
        }
        if self.current.as_ref().is_some_and(|current| closed.contains(current)) {
            self.current = None;
        }
        for repo_id in &closed {
            self.reported_missing.remove(repo_id);
        }

        info!("Removed node {} ({} repositories closed)", id, closed.len());
        self.refresh();
        true
    }

    /// Move `id` into the folder `to` (the root if `None`).
    pub fn move_node(&mut self, id: &str, to: Option<&str>) -> bool {
        let target = to.unwrap_or(&self.root.id).to_string();
        let Some(node) = self.root.find(id) else {
            self.notifier.report(&GroupError::UnknownNode { id: id.to_string() });
            return false;
        };
        if id == self.root.id || node.find(&target).is_some() {
            self.notifier.report(&GroupError::validation(id, "Cannot move a node into itself"));
            return false;
        }
        match self.root.find(&target) {
            Some(folder) if !folder.is_repository => {}
            Some(_) => {
                self.notifier.report(&GroupError::validation(target, "Cannot move a node into a repository"));
                return false;
            }
            None => {
                self.notifier.report(&GroupError::UnknownNode { id: target });
                return false;
            }
        }

        let Some(node) = self.root.remove(id) else {
            return false;
        };
        if let Some(folder) = self.root.find_mut(&target) {
            folder.sub_nodes.push(node);
        }
        self.refresh();
        true
    }

    /// Open (or re-use) the repository handle for a leaf node.
    pub fn open_repo(&mut self, id: &str) -> Option<Arc<Repository>> {
        let node = self.root.find(id)?;
        if !node.is_repository {
            return None;
        }

        if let Some(repo) = self.repository(id) {
            self.current = Some(id.to_string());
            return Some(repo);
        }

        let existing = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .repository(id);

        let repo = match existing {
            Some(repo) => repo,
            None => {
                let Some(git_dir) = self.backend.query_git_dir(id) else {
                    if self.reported_missing.insert(id.to_string()) {
                        warn!("{} is not a git repository", id);
                        self.notifier.report(&GroupError::NotARepository { scope: id.to_string() });
                    }
                    return None;
                };
                self.reported_missing.remove(id);
                let repo = Repository::open(id, git_dir, Arc::clone(&self.backend))
                    .with_commit_history_limit(self.settings.commit_history_limit);
                repo.set_include_untracked(self.settings.include_untracked);
                repo
            }
        };

        {
            let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.register(&self.root.id, Arc::clone(&repo));
            registry.add_group(&self.root.id);
        }
        self.set_mut().repos.push(Arc::clone(&repo));
        if let Some(wc) = self.working_copy.as_mut() {
            wc.track(&repo);
        }
        self.current = Some(id.to_string());
        Some(repo)
    }

    // === Group-wide commands ===

    pub async fn fetch(&self) {
        for repo in self.repositories() {
            self.host.show_and_start_popup(Box::new(Fetch::new(repo))).await;
        }
    }

    pub async fn pull(&self) {
        for repo in self.repositories() {
            self.host
                .show_and_start_popup(Box::new(Pull::new(repo, self.settings.pull_use_rebase)))
                .await;
        }
    }

    /// Push every repository whose current branch has outgoing commits.
    /// Returns how many pushes were enqueued.
    pub async fn push(&self) -> usize {
        let mut count = 0;
        for repo in self.repositories() {
            if !repo.branches().has_outgoing() {
                debug!("Skipping push for {}: nothing outgoing", repo.full_path());
                continue;
            }
            self.host.show_and_start_popup(Box::new(Push::new(repo))).await;
            count += 1;
        }
        count
    }

    /// Local branch names present in every opened repository.
    pub fn common_branches(&self) -> Vec<String> {
        let repos = self.repositories();
        let mut iter = repos.iter();
        let Some(first) = iter.next() else {
            return Vec::new();
        };
        let mut common: BTreeSet<String> = first.branches().local.into_iter().collect();
        for repo in iter {
            let local: HashSet<String> = repo.branches().local.into_iter().collect();
            common.retain(|branch| local.contains(branch));
        }
        common.into_iter().collect()
    }

    /// Check out `branch` in every repository, discarding local changes.
    pub async fn checkout(&self, branch: &str) -> bool {
        if !self.common_branches().iter().any(|b| b == branch) {
            self.notifier.report(&GroupError::validation(
                self.id(),
                format!("Branch '{branch}' does not exist in every repository"),
            ));
            return false;
        }
        for repo in self.repositories() {
            self.host
                .show_and_start_popup(Box::new(Checkout::new(repo, branch, true)))
                .await;
        }
        true
    }

    /// Abort every in-progress merge, rebase, cherry-pick or revert. Returns how many were enqueued.
    pub async fn abort_in_progress(&self) -> usize {
        let mut count = 0;
        for repo in self.repositories() {
            if let Some(kind) = repo.in_progress() {
                self.host
                    .show_and_start_popup(Box::new(AbortInProgress::new(repo, kind)))
                    .await;
                count += 1;
            }
        }
        count
    }

    // === Working copy ===

    /// Open the merged working copy view and populate it.
    pub fn changes(&mut self) -> &mut WorkingCopyAggregator {
        let set = Arc::clone(&self.set);
        let host = self.host.clone();
        let settings = self.settings.clone();
        let observer: Arc<dyn ChangeObserver> = Arc::new(self.events.clone());
        let wc = self
            .working_copy
            .get_or_insert_with(|| WorkingCopyAggregator::new(set, host, settings, observer));
        wc.refresh();
        wc
    }

    pub fn close_changes(&mut self) {
        if let Some(mut wc) = self.working_copy.take() {
            wc.cleanup();
        }
    }

    /// Re-merge every repository's change lists into the working copy view, if open.
    ///
    /// Until the event receiver is taken, events queued so far are dropped here since this
    /// re-merge covers them.
    pub fn mark_working_copy_dirty_manually(&mut self) -> bool {
        if let Some(rx) = self.event_rx.as_mut() {
            let mut dropped = 0;
            while rx.try_recv().is_ok() {
                dropped += 1;
            }
            if dropped > 0 {
                debug!("Dropped {} unhandled group events", dropped);
            }
        }
        match self.working_copy.as_mut() {
            Some(wc) => wc.refresh(),
            None => false,
        }
    }

    /// Re-query every repository's working copy and branches, then re-merge.
    pub async fn reload(&mut self) -> usize {
        let mut failures = 0;
        for repo in self.repositories() {
            let result = match repo.mark_working_copy_dirty().await {
                Ok(()) => repo.mark_branches_dirty().await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                failures += 1;
                self.notifier.report(&GroupError::tool(repo.full_path(), e));
            }
        }
        self.mark_working_copy_dirty_manually();
        failures
    }

    /// React to an event from a watcher or a repository subscription.
    pub async fn handle_event(&mut self, event: GroupEvent) {
        match event {
            GroupEvent::WorkTreeChanged { repo_id } => {
                if let Some(repo) = self.repository(&repo_id) {
                    if let Err(e) = repo.mark_working_copy_dirty().await {
                        self.notifier.report(&GroupError::tool(repo_id, e));
                    }
                }
            }
            GroupEvent::ChangesUpdated { .. } => {
                self.mark_working_copy_dirty_manually();
            }
        }
    }
}

impl Drop for RepositoryGroup {
    fn drop(&mut self) {
        self.close_changes();
    }
}
