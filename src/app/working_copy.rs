// ABOUTME: Working copy aggregator - merges change lists of many repositories into one staged/unstaged view
// Drives selection and dispatches stage, unstage, commit and conflict resolution to the owning repositories

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

use super::repository_group::RepositorySet;
use super::task_host::TaskHost;
use super::tasks::{self, group_by_repository, Discard, Push};
use super::{GroupError, GroupResult, Notifier};
use crate::git::{ChangeObserver, GitCommand, ObserverId, Repository};
use crate::models::{ChangeKey, ChangeRecord, InProgressContext};

/// Engine-facing view of the `[group]` configuration section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSettings {
    pub include_untracked: bool,
    pub auto_stage_before_commit: bool,
    /// Maximum files per batched stage/unstage command
    pub stage_batch_size: usize,
    pub pull_use_rebase: bool,
    pub sign_off: bool,
    pub commit_history_limit: usize,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            include_untracked: true,
            auto_stage_before_commit: false,
            stage_batch_size: 10,
            pull_use_rebase: false,
            sign_off: false,
            commit_history_limit: 10,
        }
    }
}

/// Busy flags, shared so a display layer can poll them while an operation is awaited.
#[derive(Debug, Clone, Default)]
pub struct BusyFlags {
    staging: Arc<AtomicBool>,
    unstaging: Arc<AtomicBool>,
    committing: Arc<AtomicBool>,
}

impl BusyFlags {
    pub fn is_staging(&self) -> bool {
        self.staging.load(Ordering::SeqCst)
    }

    pub fn is_unstaging(&self) -> bool {
        self.unstaging.load(Ordering::SeqCst)
    }

    pub fn is_committing(&self) -> bool {
        self.committing.load(Ordering::SeqCst)
    }

    pub fn is_busy(&self) -> bool {
        self.is_staging() || self.is_unstaging() || self.is_committing()
    }
}

/// Detail pane for a single selected change.
#[derive(Debug, Clone)]
pub enum DetailContext {
    Conflict { repository: String, change: ChangeRecord },
    Diff { repository: String, change: ChangeRecord, unstaged: bool },
}

impl DetailContext {
    fn for_change(change: &ChangeRecord, unstaged: bool) -> Self {
        let repository = change.repository_path().unwrap_or_default();
        if change.is_conflicted() && unstaged {
            Self::Conflict {
                repository,
                change: change.clone(),
            }
        } else {
            Self::Diff {
                repository,
                change: change.clone(),
                unstaged,
            }
        }
    }

    pub fn change(&self) -> &ChangeRecord {
        match self {
            Self::Conflict { change, .. } | Self::Diff { change, .. } => change,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Actions applicable to the current selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Stage,
    Discard,
    UseTheirs,
    UseMine,
    Unstage,
}

#[derive(Clone, Copy)]
enum Side {
    Theirs,
    Mine,
}

pub struct WorkingCopyAggregator {
    set: Arc<RwLock<RepositorySet>>,
    host: TaskHost,
    notifier: Arc<dyn Notifier>,
    settings: GroupSettings,
    observer: Arc<dyn ChangeObserver>,
    subscriptions: Vec<(Arc<Repository>, ObserverId)>,

    cached: Vec<ChangeRecord>,
    unstaged: Vec<ChangeRecord>,
    staged: Vec<ChangeRecord>,
    selected_unstaged: Vec<ChangeRecord>,
    selected_staged: Vec<ChangeRecord>,
    detail: Option<DetailContext>,
    loading: bool,

    commit_message: String,
    use_amend: bool,
    busy: BusyFlags,

    in_progress: Vec<InProgressContext>,
    has_unsolved_conflicts: bool,
}

impl WorkingCopyAggregator {
    /// Build an aggregator over `set`, subscribing `observer` to every repository in it.
    pub fn new(
        set: Arc<RwLock<RepositorySet>>,
        host: TaskHost,
        settings: GroupSettings,
        observer: Arc<dyn ChangeObserver>,
    ) -> Self {
        let notifier = host.notifier();
        let mut aggregator = Self {
            set,
            host,
            notifier,
            settings,
            observer,
            subscriptions: Vec::new(),
            cached: Vec::new(),
            unstaged: Vec::new(),
            staged: Vec::new(),
            selected_unstaged: Vec::new(),
            selected_staged: Vec::new(),
            detail: None,
            loading: false,
            commit_message: String::new(),
            use_amend: false,
            busy: BusyFlags::default(),
            in_progress: Vec::new(),
            has_unsolved_conflicts: false,
        };
        for repo in aggregator.repositories() {
            aggregator.track(&repo);
        }
        aggregator
    }

    fn repositories(&self) -> Vec<Arc<Repository>> {
        self.set.read().unwrap_or_else(PoisonError::into_inner).repositories().to_vec()
    }

    /// Subscribe to a repository opened after construction.
    pub fn track(&mut self, repo: &Arc<Repository>) {
        if self.subscriptions.iter().any(|(r, _)| Arc::ptr_eq(r, repo)) {
            return;
        }
        repo.set_include_untracked(self.settings.include_untracked);
        let id = repo.subscribe(Arc::clone(&self.observer));
        self.subscriptions.push((Arc::clone(repo), id));
    }

    pub fn untrack(&mut self, repo_id: &str) {
        self.subscriptions.retain(|(repo, id)| {
            if repo.node_id() == repo_id {
                repo.unsubscribe(*id);
                false
            } else {
                true
            }
        });
    }

    // === Accessors ===

    pub fn unstaged(&self) -> &[ChangeRecord] {
        &self.unstaged
    }

    pub fn staged(&self) -> &[ChangeRecord] {
        &self.staged
    }

    pub fn cached(&self) -> &[ChangeRecord] {
        &self.cached
    }

    pub fn selected_unstaged(&self) -> &[ChangeRecord] {
        &self.selected_unstaged
    }

    pub fn selected_staged(&self) -> &[ChangeRecord] {
        &self.selected_staged
    }

    pub fn detail(&self) -> Option<&DetailContext> {
        self.detail.as_ref()
    }

    pub fn commit_message(&self) -> &str {
        &self.commit_message
    }

    pub fn set_commit_message(&mut self, message: impl Into<String>) {
        self.commit_message = message.into();
    }

    pub fn busy(&self) -> BusyFlags {
        self.busy.clone()
    }

    pub fn use_amend(&self) -> bool {
        self.use_amend
    }

    pub fn set_use_amend(&mut self, use_amend: bool) {
        self.use_amend = use_amend;
    }

    pub fn include_untracked(&self) -> bool {
        self.settings.include_untracked
    }

    /// Propagated to every repository; takes effect on their next dirty pass.
    pub fn set_include_untracked(&mut self, include: bool) {
        if self.settings.include_untracked == include {
            return;
        }
        self.settings.include_untracked = include;
        for repo in self.repositories() {
            repo.set_include_untracked(include);
        }
    }

    pub fn auto_stage_before_commit(&self) -> bool {
        self.settings.auto_stage_before_commit
    }

    pub fn set_auto_stage_before_commit(&mut self, auto_stage: bool) {
        self.settings.auto_stage_before_commit = auto_stage;
    }

    /// In-progress operations, one per repository, highest priority first.
    pub fn in_progress_contexts(&self) -> &[InProgressContext] {
        &self.in_progress
    }

    pub fn primary_in_progress(&self) -> Option<&InProgressContext> {
        self.in_progress.first()
    }

    pub fn has_unsolved_conflicts(&self) -> bool {
        self.has_unsolved_conflicts
    }

    /// Commit message history of every repository, most recent first, without duplicates.
    pub fn commit_message_history(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.repositories()
            .iter()
            .flat_map(|repo| repo.commit_messages())
            .filter(|message| seen.insert(message.clone()))
            .collect()
    }

    // === Data ===

    /// Replace the cached change set if it differs from `changes`.
    /// Returns whether any change is conflicted.
    pub fn set_data(&mut self, changes: Vec<ChangeRecord>) -> bool {
        if !is_changed(&self.cached, &changes) {
            self.refresh_detail();
            return self.cached.iter().any(ChangeRecord::is_conflicted);
        }

        let last_unstaged: HashSet<String> = self.selected_unstaged.iter().map(|c| c.group_path.clone()).collect();
        let last_staged: HashSet<String> = if last_unstaged.is_empty() {
            self.selected_staged.iter().map(|c| c.group_path.clone()).collect()
        } else {
            HashSet::new()
        };

        self.cached = changes;

        let unstaged: Vec<ChangeRecord> = self.cached.iter().filter(|c| c.is_unstaged()).cloned().collect();
        let has_conflict = unstaged.iter().any(ChangeRecord::is_conflicted);
        let selected_unstaged: Vec<ChangeRecord> = unstaged
            .iter()
            .filter(|c| last_unstaged.contains(&c.group_path))
            .cloned()
            .collect();

        let staged = self.staged_changes();
        let selected_staged: Vec<ChangeRecord> = staged
            .iter()
            .filter(|c| last_staged.contains(&c.group_path))
            .cloned()
            .collect();

        debug!(
            "Working copy changed: {} unstaged, {} staged, conflict: {}",
            unstaged.len(),
            staged.len(),
            has_conflict
        );

        self.loading = true;
        self.unstaged = unstaged;
        self.staged = staged;
        self.set_selected_unstaged(selected_unstaged);
        self.set_selected_staged(selected_staged);
        self.loading = false;
        self.refresh_detail();

        has_conflict
    }

    fn staged_changes(&self) -> Vec<ChangeRecord> {
        self.cached.iter().filter(|c| c.is_staged()).cloned().collect()
    }

    fn refresh_detail(&mut self) {
        if self.selected_unstaged.len() == 1 {
            self.set_detail(Some(self.selected_unstaged[0].clone()), true);
        } else if self.selected_staged.len() == 1 {
            self.set_detail(Some(self.selected_staged[0].clone()), false);
        } else {
            self.set_detail(None, false);
        }
    }

    fn set_detail(&mut self, change: Option<ChangeRecord>, unstaged: bool) {
        if self.loading {
            return;
        }
        self.detail = change.map(|c| DetailContext::for_change(&c, unstaged));
    }

    // === Selection ===

    pub fn set_selected_unstaged(&mut self, selection: Vec<ChangeRecord>) {
        self.selected_unstaged = selection;
        if self.selected_unstaged.is_empty() {
            if self.selected_staged.is_empty() {
                self.set_detail(None, true);
            }
            return;
        }
        if !self.selected_staged.is_empty() {
            self.set_selected_staged(Vec::new());
        }
        let single = (self.selected_unstaged.len() == 1).then(|| self.selected_unstaged[0].clone());
        self.set_detail(single, true);
    }

    pub fn set_selected_staged(&mut self, selection: Vec<ChangeRecord>) {
        self.selected_staged = selection;
        if self.selected_staged.is_empty() {
            if self.selected_unstaged.is_empty() {
                self.set_detail(None, false);
            }
            return;
        }
        if !self.selected_unstaged.is_empty() {
            self.set_selected_unstaged(Vec::new());
        }
        let single = (self.selected_staged.len() == 1).then(|| self.selected_staged[0].clone());
        self.set_detail(single, false);
    }

    /// Select unstaged records by group path, ignoring unknown paths.
    pub fn select_unstaged_paths(&mut self, paths: &[String]) {
        let selection = select_by_path(&self.unstaged, paths);
        self.set_selected_unstaged(selection);
    }

    pub fn select_staged_paths(&mut self, paths: &[String]) {
        let selection = select_by_path(&self.staged, paths);
        self.set_selected_staged(selection);
    }

    /// Actions for the unstaged selection; `None` when nothing is selected or the
    /// selection mixes conflicted and non-conflicted records.
    pub fn unstaged_actions(&self) -> Option<Vec<ChangeAction>> {
        if self.selected_unstaged.is_empty() {
            return None;
        }
        let conflicted = self.selected_unstaged.iter().filter(|c| c.is_conflicted()).count();
        if conflicted == self.selected_unstaged.len() {
            Some(vec![ChangeAction::UseTheirs, ChangeAction::UseMine])
        } else if conflicted == 0 {
            Some(vec![ChangeAction::Stage, ChangeAction::Discard])
        } else {
            let scope = self.selected_unstaged[0].repository_path().unwrap_or_default();
            self.notifier.report(&GroupError::ConflictingSelection { scope });
            None
        }
    }

    pub fn staged_actions(&self) -> Option<Vec<ChangeAction>> {
        (!self.selected_staged.is_empty()).then(|| vec![ChangeAction::Unstage])
    }

    // === Refresh ===

    /// Re-merge every repository's cached change lists and feed them through `set_data`.
    pub fn refresh(&mut self) -> bool {
        let (changes, in_progress) = {
            let set = self.set.read().unwrap_or_else(PoisonError::into_inner);
            (set.merged_changes(), set.scan_in_progress())
        };
        let has_conflict = self.set_data(changes);
        self.in_progress = in_progress;
        self.has_unsolved_conflicts = has_conflict;
        has_conflict
    }

    // === Staging ===

    pub async fn stage_selected(&mut self, next: Option<ChangeRecord>) -> bool {
        let changes = self.selected_unstaged.clone();
        self.stage_changes(changes, next).await
    }

    pub async fn stage_all(&mut self) -> bool {
        let changes = self.unstaged.clone();
        self.stage_changes(changes, None).await
    }

    /// Stage `changes` repository by repository, then select `next`.
    pub async fn stage_changes(&mut self, changes: Vec<ChangeRecord>, next: Option<ChangeRecord>) -> bool {
        if self.unstaged.is_empty() || changes.is_empty() {
            return false;
        }

        self.selected_unstaged = next.into_iter().collect();
        self.busy.staging.store(true, Ordering::SeqCst);

        let mut ok = true;
        for (repo, group) in group_by_repository(&changes) {
            let bulk = group.len() == count_for(&self.unstaged, &repo);
            info!(
                "Staging {} changes in {} ({})",
                group.len(),
                repo.full_path(),
                if bulk { "bulk" } else { "batched" }
            );

            repo.set_watcher_enabled(false);
            let result = if bulk {
                tasks::run(
                    &repo,
                    GitCommand::Add {
                        files: None,
                        include_untracked: repo.include_untracked(),
                    },
                )
                .await
                .map(|_| ())
            } else {
                self.run_batches(&repo, &group, |files| GitCommand::Add {
                    files: Some(files),
                    include_untracked: true,
                })
                .await
            };
            ok &= self.finish_repository(&repo, result).await;
        }

        self.busy.staging.store(false, Ordering::SeqCst);
        self.refresh();
        ok
    }

    pub async fn unstage_selected(&mut self, next: Option<ChangeRecord>) -> bool {
        let changes = self.selected_staged.clone();
        self.unstage_changes(changes, next).await
    }

    pub async fn unstage_all(&mut self) -> bool {
        let changes = self.staged.clone();
        self.unstage_changes(changes, None).await
    }

    /// Unstage `changes` repository by repository, then select `next`.
    pub async fn unstage_changes(&mut self, changes: Vec<ChangeRecord>, next: Option<ChangeRecord>) -> bool {
        if self.staged.is_empty() || changes.is_empty() {
            return false;
        }

        self.selected_staged = next.into_iter().collect();
        self.busy.unstaging.store(true, Ordering::SeqCst);

        let mut ok = true;
        for (repo, group) in group_by_repository(&changes) {
            repo.set_watcher_enabled(false);
            let result = if self.use_amend {
                let files = group.iter().map(|c| c.path.clone()).collect();
                tasks::run(&repo, GitCommand::UnstageForAmend { files }).await.map(|_| ())
            } else if group.len() == count_for(&self.staged, &repo) {
                tasks::run(&repo, GitCommand::Reset { files: None }).await.map(|_| ())
            } else {
                self.run_batches(&repo, &group, |files| GitCommand::Reset { files: Some(files) })
                    .await
            };
            ok &= self.finish_repository(&repo, result).await;
        }

        self.busy.unstaging.store(false, Ordering::SeqCst);
        self.refresh();
        ok
    }

    async fn run_batches(
        &self,
        repo: &Repository,
        changes: &[ChangeRecord],
        command: impl Fn(Vec<String>) -> GitCommand,
    ) -> GroupResult<()> {
        let batch_size = self.settings.stage_batch_size.max(1);
        for batch in changes.chunks(batch_size) {
            let files = batch.iter().map(|c| c.path.clone()).collect();
            tasks::run(repo, command(files)).await?;
        }
        Ok(())
    }

    /// Report a failed step, re-run the dirty pass, and re-open the watcher.
    async fn finish_repository(&self, repo: &Arc<Repository>, result: GroupResult<()>) -> bool {
        let ok = match result {
            Ok(()) => true,
            Err(e) => {
                self.notifier.report(&e);
                false
            }
        };
        if let Err(e) = repo.mark_working_copy_dirty().await {
            self.notifier.report(&GroupError::tool(repo.full_path(), e));
        }
        repo.set_watcher_enabled(true);
        ok
    }

    // === Discard ===

    /// Ask for confirmation to discard `changes`. The popup runs on `TaskHost::process_popup`.
    pub fn discard(&mut self, changes: Vec<ChangeRecord>) -> bool {
        let shown = !changes.is_empty()
            && self.host.can_create_popup()
            && self.host.show_popup(Box::new(Discard::changes(changes)));
        self.refresh();
        shown
    }

    pub fn discard_selected(&mut self) -> bool {
        let changes = self.selected_unstaged.clone();
        self.discard(changes)
    }

    pub fn discard_all(&mut self, include_ignored: bool) -> bool {
        let repos = self.repositories();
        let shown = !repos.is_empty()
            && self.host.can_create_popup()
            && self.host.show_popup(Box::new(Discard::all(repos, include_ignored)));
        self.refresh();
        shown
    }

    // === Commit ===

    pub async fn commit(&mut self) -> bool {
        let auto_stage = self.settings.auto_stage_before_commit;
        self.do_commit(auto_stage, false).await
    }

    pub async fn commit_with_auto_stage(&mut self) -> bool {
        self.do_commit(true, false).await
    }

    pub async fn commit_with_push(&mut self) -> bool {
        let auto_stage = self.settings.auto_stage_before_commit;
        self.do_commit(auto_stage, true).await
    }

    fn commit_targets(&self, auto_stage: bool) -> Vec<Arc<Repository>> {
        let mut changes = self.staged.clone();
        if auto_stage {
            changes.extend(self.unstaged.iter().cloned());
        }
        let targets: Vec<Arc<Repository>> = group_by_repository(&changes).into_iter().map(|(repo, _)| repo).collect();
        if targets.is_empty() && self.use_amend {
            // Message-only amend of every repository's last commit
            return self.repositories();
        }
        targets
    }

    fn validate_commit(&self, targets: &[Arc<Repository>]) -> GroupResult<()> {
        let scope = targets
            .first()
            .map(|repo| repo.full_path().to_string())
            .unwrap_or_else(|| self.set.read().unwrap_or_else(PoisonError::into_inner).path_prefix().to_string());

        if !self.host.can_create_popup() {
            return Err(GroupError::Busy { scope });
        }
        if self.commit_message.trim().is_empty() {
            return Err(GroupError::validation(scope, "Commit without message is not allowed"));
        }
        if targets.is_empty() {
            return Err(GroupError::validation(scope, "No files added to commit"));
        }
        Ok(())
    }

    /// Commit the shared message in every repository with staged changes.
    pub async fn do_commit(&mut self, auto_stage: bool, auto_push: bool) -> bool {
        let targets = self.commit_targets(auto_stage);
        if let Err(e) = self.validate_commit(&targets) {
            warn!("Commit refused: {}", e);
            self.notifier.report(&e);
            return false;
        }

        let message = self.commit_message.trim().to_string();
        self.busy.committing.store(true, Ordering::SeqCst);

        let mut committed = Vec::new();
        for repo in &targets {
            repo.push_commit_message(&message);
            repo.set_watcher_enabled(false);

            let mut result = Ok(());
            if auto_stage && count_for(&self.unstaged, repo) > 0 {
                result = tasks::run(
                    repo,
                    GitCommand::Add {
                        files: None,
                        include_untracked: repo.include_untracked(),
                    },
                )
                .await
                .map(|_| ());
            }
            if result.is_ok() {
                result = tasks::run(
                    repo,
                    GitCommand::Commit {
                        message: message.clone(),
                        amend: self.use_amend,
                        sign_off: self.settings.sign_off,
                    },
                )
                .await
                .map(|_| ());
            }

            match result {
                Ok(()) => {
                    info!("Committed in {}", repo.full_path());
                    committed.push(Arc::clone(repo));
                }
                Err(e) => self.notifier.report(&e),
            }

            if let Err(e) = repo.mark_branches_dirty().await {
                warn!("Branch rescan failed for {}: {}", repo.full_path(), e);
            }
            if let Err(e) = repo.mark_working_copy_dirty().await {
                warn!("Working copy rescan failed for {}: {}", repo.full_path(), e);
            }
            repo.set_watcher_enabled(true);
        }

        let all_ok = committed.len() == targets.len();
        if all_ok {
            self.commit_message.clear();
        }
        self.busy.committing.store(false, Ordering::SeqCst);
        self.refresh();

        if auto_push && !self.use_amend {
            for repo in committed {
                self.host.show_and_start_popup(Box::new(Push::new(repo))).await;
            }
        }
        all_ok
    }

    // === Conflict resolution ===

    pub async fn use_theirs(&mut self, changes: Vec<ChangeRecord>) -> bool {
        self.resolve(changes, Side::Theirs).await
    }

    pub async fn use_mine(&mut self, changes: Vec<ChangeRecord>) -> bool {
        self.resolve(changes, Side::Mine).await
    }

    async fn resolve(&mut self, changes: Vec<ChangeRecord>, side: Side) -> bool {
        let conflicted: Vec<ChangeRecord> = changes.into_iter().filter(ChangeRecord::is_conflicted).collect();
        if conflicted.is_empty() {
            return false;
        }

        let mut ok = true;
        for (repo, group) in group_by_repository(&conflicted) {
            let files: Vec<String> = group.iter().map(|c| c.path.clone()).collect();
            repo.set_watcher_enabled(false);

            let resolve = match side {
                Side::Theirs => GitCommand::UseTheirs { files: files.clone() },
                Side::Mine => GitCommand::UseMine { files: files.clone() },
            };
            let mut result = tasks::run(&repo, resolve).await.map(|_| ());
            if result.is_ok() {
                result = tasks::run(
                    &repo,
                    GitCommand::Add {
                        files: Some(files),
                        include_untracked: true,
                    },
                )
                .await
                .map(|_| ());
            }
            ok &= self.finish_repository(&repo, result).await;
        }

        self.refresh();
        ok
    }

    // === Teardown ===

    /// Clear every list and the commit message, and stop listening to repositories.
    pub fn cleanup(&mut self) {
        self.selected_unstaged.clear();
        self.selected_staged.clear();
        self.unstaged.clear();
        self.staged.clear();
        self.cached.clear();
        self.detail = None;
        self.commit_message.clear();
        self.in_progress.clear();
        self.has_unsolved_conflicts = false;
        for (repo, id) in self.subscriptions.drain(..) {
            repo.unsubscribe(id);
        }
    }
}

impl Drop for WorkingCopyAggregator {
    fn drop(&mut self) {
        for (repo, id) in self.subscriptions.drain(..) {
            repo.unsubscribe(id);
        }
    }
}

/// Whether `cur` differs from `old` by count or by any `(group path, work tree, index)` triple.
pub fn is_changed(old: &[ChangeRecord], cur: &[ChangeRecord]) -> bool {
    if old.len() != cur.len() {
        return true;
    }
    let keys: HashSet<ChangeKey> = old.iter().map(ChangeRecord::key).collect();
    cur.iter().any(|c| !keys.contains(&c.key()))
}

fn count_for(changes: &[ChangeRecord], repo: &Arc<Repository>) -> usize {
    changes
        .iter()
        .filter(|c| c.repository().is_some_and(|r| Arc::ptr_eq(&r, repo)))
        .count()
}

fn select_by_path(changes: &[ChangeRecord], paths: &[String]) -> Vec<ChangeRecord> {
    changes
        .iter()
        .filter(|c| paths.iter().any(|p| *p == c.group_path))
        .cloned()
        .collect()
}
