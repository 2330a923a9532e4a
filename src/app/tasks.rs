// ABOUTME: Long-running repository operations run through the task host
// Fetch, pull, push, checkout, discard and abort - one repository per popup except discard

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::task_host::Popup;
use super::{GroupError, GroupResult};
use crate::git::{GitCommand, Repository};
use crate::models::{ChangeRecord, ChangeState, InProgressKind};

/// Run `command` in `repo`, tagging a failure with the repository path.
pub(crate) async fn run(repo: &Repository, command: GitCommand) -> GroupResult<String> {
    repo.exec(command)
        .await
        .map_err(|e| GroupError::tool(repo.full_path(), e))
}

/// Re-run both dirty passes after a command that may have moved HEAD or the work tree.
async fn rescan(repo: &Arc<Repository>) {
    if let Err(e) = repo.mark_branches_dirty().await {
        warn!("Branch rescan failed for {}: {}", repo.full_path(), e);
    }
    if let Err(e) = repo.mark_working_copy_dirty().await {
        warn!("Working copy rescan failed for {}: {}", repo.full_path(), e);
    }
}

/// Run `command` with the repository's watcher disabled, then rescan and re-enable it.
async fn run_unwatched(repo: &Arc<Repository>, command: GitCommand) -> GroupResult<String> {
    repo.set_watcher_enabled(false);
    let result = run(repo, command).await;
    rescan(repo).await;
    repo.set_watcher_enabled(true);
    result
}

/// Split `changes` by owning repository, keeping first-appearance order.
/// Records whose repository has been closed are dropped.
pub(crate) fn group_by_repository(changes: &[ChangeRecord]) -> Vec<(Arc<Repository>, Vec<ChangeRecord>)> {
    let mut groups: Vec<(Arc<Repository>, Vec<ChangeRecord>)> = Vec::new();
    for change in changes {
        let Some(repo) = change.repository() else {
            debug!("Skipping {}: repository is closed", change.group_path);
            continue;
        };
        match groups.iter_mut().find(|(r, _)| Arc::ptr_eq(r, &repo)) {
            Some((_, list)) => list.push(change.clone()),
            None => groups.push((repo, vec![change.clone()])),
        }
    }
    groups
}

pub struct Fetch {
    repo: Arc<Repository>,
}

impl Fetch {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl Popup for Fetch {
    fn title(&self) -> String {
        format!("Fetch {}", self.repo.name())
    }

    async fn sure(&mut self) -> GroupResult<bool> {
        run(&self.repo, GitCommand::Fetch).await?;
        rescan(&self.repo).await;
        Ok(true)
    }
}

pub struct Pull {
    repo: Arc<Repository>,
    rebase: bool,
    auto_stash: bool,
}

impl Pull {
    pub fn new(repo: Arc<Repository>, rebase: bool) -> Self {
        Self {
            repo,
            rebase,
            auto_stash: true,
        }
    }
}

#[async_trait]
impl Popup for Pull {
    fn title(&self) -> String {
        format!("Pull {}", self.repo.name())
    }

    async fn sure(&mut self) -> GroupResult<bool> {
        run_unwatched(
            &self.repo,
            GitCommand::Pull {
                rebase: self.rebase,
                auto_stash: self.auto_stash,
            },
        )
        .await?;
        Ok(true)
    }
}

pub struct Push {
    repo: Arc<Repository>,
}

impl Push {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl Popup for Push {
    fn title(&self) -> String {
        format!("Push {}", self.repo.name())
    }

    /// Nothing to push from a detached HEAD.
    fn check(&self) -> bool {
        self.repo.branches().current.is_some()
    }

    async fn sure(&mut self) -> GroupResult<bool> {
        run(&self.repo, GitCommand::Push).await?;
        rescan(&self.repo).await;
        Ok(true)
    }
}

pub struct Checkout {
    repo: Arc<Repository>,
    branch: String,
    discard_local: bool,
}

impl Checkout {
    pub fn new(repo: Arc<Repository>, branch: impl Into<String>, discard_local: bool) -> Self {
        Self {
            repo,
            branch: branch.into(),
            discard_local,
        }
    }
}

#[async_trait]
impl Popup for Checkout {
    fn title(&self) -> String {
        format!("Checkout {} in {}", self.branch, self.repo.name())
    }

    async fn sure(&mut self) -> GroupResult<bool> {
        run_unwatched(
            &self.repo,
            GitCommand::Checkout {
                branch: self.branch.clone(),
                discard_local: self.discard_local,
            },
        )
        .await?;
        info!("Checked out {} in {}", self.branch, self.repo.full_path());
        Ok(true)
    }
}

pub struct AbortInProgress {
    repo: Arc<Repository>,
    kind: InProgressKind,
}

impl AbortInProgress {
    pub fn new(repo: Arc<Repository>, kind: InProgressKind) -> Self {
        Self { repo, kind }
    }
}

#[async_trait]
impl Popup for AbortInProgress {
    fn title(&self) -> String {
        format!("Abort {} in {}", self.kind, self.repo.name())
    }

    /// The operation may have been finished outside the tool since this was queued.
    fn check(&self) -> bool {
        self.repo.in_progress() == Some(self.kind)
    }

    async fn sure(&mut self) -> GroupResult<bool> {
        run_unwatched(&self.repo, GitCommand::Abort(self.kind)).await?;
        Ok(true)
    }
}

enum DiscardTarget {
    Changes(Vec<ChangeRecord>),
    All {
        repos: Vec<Arc<Repository>>,
        include_ignored: bool,
    },
}

/// Throw away local changes. Installed with `show_popup` so it waits for confirmation.
pub struct Discard {
    target: DiscardTarget,
}

impl Discard {
    pub fn changes(changes: Vec<ChangeRecord>) -> Self {
        Self {
            target: DiscardTarget::Changes(changes),
        }
    }

    pub fn all(repos: Vec<Arc<Repository>>, include_ignored: bool) -> Self {
        Self {
            target: DiscardTarget::All { repos, include_ignored },
        }
    }

    async fn discard_changes(repo: &Arc<Repository>, changes: &[ChangeRecord]) -> GroupResult<()> {
        let paths = |filter: fn(&ChangeRecord) -> bool| -> Vec<String> {
            changes.iter().filter(|c| filter(c)).map(|c| c.path.clone()).collect()
        };
        // Files git does not know in the work tree are removed, everything else is checked out
        // from the index so staged content survives
        let untracked = paths(|c| matches!(c.work_tree, ChangeState::Untracked | ChangeState::Added));
        let tracked = paths(|c| !matches!(c.work_tree, ChangeState::Untracked | ChangeState::Added));

        if !untracked.is_empty() {
            run(repo, GitCommand::Clean { files: untracked }).await?;
        }
        if !tracked.is_empty() {
            run(repo, GitCommand::Restore { files: tracked }).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Popup for Discard {
    fn title(&self) -> String {
        match &self.target {
            DiscardTarget::Changes(changes) if changes.len() == 1 => format!("Discard {}", changes[0].group_path),
            DiscardTarget::Changes(changes) => format!("Discard {} changes", changes.len()),
            DiscardTarget::All { .. } => "Discard all local changes".to_string(),
        }
    }

    async fn sure(&mut self) -> GroupResult<bool> {
        let work: Vec<(Arc<Repository>, Option<Vec<ChangeRecord>>)> = match &self.target {
            DiscardTarget::Changes(changes) => group_by_repository(changes)
                .into_iter()
                .map(|(repo, list)| (repo, Some(list)))
                .collect(),
            DiscardTarget::All { repos, .. } => repos.iter().map(|r| (Arc::clone(r), None)).collect(),
        };
        let include_ignored = matches!(self.target, DiscardTarget::All { include_ignored: true, .. });

        let mut first_error = None;
        for (repo, changes) in work {
            repo.set_watcher_enabled(false);
            let result = match &changes {
                Some(changes) => Self::discard_changes(&repo, changes).await,
                None => run(&repo, GitCommand::DiscardAll { include_ignored }).await.map(|_| ()),
            };
            if let Err(e) = repo.mark_working_copy_dirty().await {
                warn!("Working copy rescan failed for {}: {}", repo.full_path(), e);
            }
            repo.set_watcher_enabled(true);

            if let Err(e) = result {
                warn!("Discard failed in {}: {}", repo.full_path(), e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(true),
        }
    }
}
