// ABOUTME: Working copy aggregation tests - merged lists, selection, batched staging, commit and conflict flows

use pretty_assertions::assert_eq;

use gitgroup::app::{ChangeAction, GroupSettings};
use gitgroup::git::GitCommand;
use gitgroup::models::ChangeState;

use super::fixtures::{group_paths, open_group, open_group_with, tree, FakeBackend};

fn paths(list: &[&str]) -> Vec<String> {
    list.iter().map(|p| p.to_string()).collect()
}

fn two_repos() -> std::sync::Arc<FakeBackend> {
    let backend = FakeBackend::new();
    backend.add_repo("/ws/alpha");
    backend.add_repo("/ws/beta");
    backend
}

#[tokio::test]
async fn test_same_file_in_two_repositories_gets_distinct_group_paths() {
    let backend = two_repos();
    backend.set_file("/ws/alpha", "README.md", ChangeState::None, ChangeState::Modified);
    backend.set_file("/ws/beta", "README.md", ChangeState::None, ChangeState::Modified);
    let (mut group, log) = open_group(&backend, tree(&["/ws/alpha", "/ws/beta"])).await;

    assert_eq!(group.path_prefix(), "/ws/");
    let wc = group.changes();
    assert_eq!(group_paths(wc.unstaged()), vec!["alpha/README.md", "beta/README.md"]);
    assert!(wc.staged().is_empty());

    let owners: Vec<Option<String>> = wc.unstaged().iter().map(|c| c.repository_path()).collect();
    assert!(owners.contains(&Some("/ws/alpha".to_string())));
    assert!(owners.contains(&Some("/ws/beta".to_string())));
    assert!(!log.has_errors());
}

#[tokio::test]
async fn test_partial_selection_is_staged_in_batches_with_watcher_paused() {
    let backend = FakeBackend::new();
    backend.add_repo("/ws/alpha");
    backend.add_modified("/ws/alpha", "f", 25);
    let (mut group, log) = open_group(&backend, tree(&["/ws/alpha"])).await;
    backend.clear_calls();

    let wc = group.changes();
    let selection: Vec<String> = (0..23).map(|n| format!("f{n:02}.txt")).collect();
    wc.select_unstaged_paths(&selection);
    assert_eq!(wc.selected_unstaged().len(), 23);

    assert!(wc.stage_selected(None).await);

    let adds = backend.calls_named("add");
    let sizes: Vec<usize> = adds.iter().map(|c| c.command.files().len()).collect();
    assert_eq!(sizes, vec![10, 10, 3]);
    assert!(adds.iter().all(|c| c.watcher_enabled == Some(false)));

    assert_eq!(wc.staged().len(), 23);
    assert_eq!(group_paths(wc.unstaged()), vec!["f23.txt", "f24.txt"]);
    assert!(wc.selected_unstaged().is_empty());
    assert!(!wc.busy().is_busy());
    assert!(group.repositories()[0].is_watcher_enabled());
    assert!(!log.has_errors());
}

#[tokio::test]
async fn test_batch_size_follows_settings() {
    let backend = FakeBackend::new();
    backend.add_repo("/ws/alpha");
    backend.add_modified("/ws/alpha", "f", 8);
    let settings = GroupSettings {
        stage_batch_size: 3,
        ..GroupSettings::default()
    };
    let (mut group, _log) = open_group_with(&backend, tree(&["/ws/alpha"]), settings).await;
    backend.clear_calls();

    let wc = group.changes();
    let selection: Vec<String> = (0..7).map(|n| format!("f{n:02}.txt")).collect();
    wc.select_unstaged_paths(&selection);
    wc.stage_selected(None).await;

    let sizes: Vec<usize> = backend.calls_named("add").iter().map(|c| c.command.files().len()).collect();
    assert_eq!(sizes, vec![3, 3, 1]);
}

#[tokio::test]
async fn test_stage_all_uses_one_bulk_command_per_repository() {
    let backend = two_repos();
    backend.add_modified("/ws/alpha", "a", 12);
    backend.set_file("/ws/beta", "new.txt", ChangeState::Untracked, ChangeState::Untracked);
    let (mut group, _log) = open_group(&backend, tree(&["/ws/alpha", "/ws/beta"])).await;
    backend.clear_calls();

    let wc = group.changes();
    assert!(wc.stage_all().await);

    let adds = backend.calls_named("add");
    assert_eq!(adds.len(), 2);
    assert!(adds.iter().all(|c| c.command
        == GitCommand::Add {
            files: None,
            include_untracked: true
        }));
    assert!(wc.unstaged().is_empty());
    assert_eq!(wc.staged().len(), 13);
}

#[tokio::test]
async fn test_unstage_selected_resets_only_the_owning_repository() {
    let backend = two_repos();
    backend.set_file("/ws/alpha", "a.txt", ChangeState::Modified, ChangeState::None);
    backend.set_file("/ws/alpha", "b.txt", ChangeState::Modified, ChangeState::None);
    backend.set_file("/ws/beta", "c.txt", ChangeState::Added, ChangeState::None);
    let (mut group, _log) = open_group(&backend, tree(&["/ws/alpha", "/ws/beta"])).await;
    backend.clear_calls();

    let wc = group.changes();
    wc.select_staged_paths(&paths(&["alpha/a.txt"]));
    assert_eq!(wc.staged_actions(), Some(vec![ChangeAction::Unstage]));
    assert!(wc.unstage_selected(None).await);

    let resets = backend.calls_named("reset");
    assert_eq!(resets.len(), 1);
    assert_eq!(resets[0].repo, "/ws/alpha");
    assert_eq!(
        resets[0].command,
        GitCommand::Reset {
            files: Some(vec!["a.txt".to_string()])
        }
    );
    assert_eq!(group_paths(wc.staged()), vec!["alpha/b.txt", "beta/c.txt"]);
    assert_eq!(group_paths(wc.unstaged()), vec!["alpha/a.txt"]);
}

#[tokio::test]
async fn test_unstage_with_amend_resets_against_parent_commit() {
    let backend = FakeBackend::new();
    backend.add_repo("/ws/alpha");
    backend.set_file("/ws/alpha", "a.txt", ChangeState::Modified, ChangeState::None);
    let (mut group, _log) = open_group(&backend, tree(&["/ws/alpha"])).await;
    backend.clear_calls();

    let wc = group.changes();
    wc.set_use_amend(true);
    wc.unstage_all().await;

    assert_eq!(
        backend.calls_named("reset")[0].command,
        GitCommand::UnstageForAmend {
            files: vec!["a.txt".to_string()]
        }
    );
}

#[tokio::test]
async fn test_blank_commit_message_is_refused_before_any_command() {
    let backend = FakeBackend::new();
    backend.add_repo("/ws/alpha");
    backend.set_file("/ws/alpha", "a.txt", ChangeState::Modified, ChangeState::None);
    let (mut group, log) = open_group(&backend, tree(&["/ws/alpha"])).await;
    backend.clear_calls();

    let wc = group.changes();
    wc.set_commit_message("   \n ");
    assert!(!wc.commit().await);

    assert!(backend.calls().is_empty());
    let errors = log.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].scope, "/ws/alpha");
    assert_eq!(errors[0].message, "Commit without message is not allowed");
    assert_eq!(wc.staged().len(), 1);
}

#[tokio::test]
async fn test_commit_with_nothing_staged_is_refused() {
    let backend = FakeBackend::new();
    backend.add_repo("/ws/alpha");
    backend.add_modified("/ws/alpha", "f", 1);
    let (mut group, log) = open_group(&backend, tree(&["/ws/alpha"])).await;
    backend.clear_calls();

    let wc = group.changes();
    wc.set_commit_message("feat: nothing");
    assert!(!wc.commit().await);

    assert!(backend.calls().is_empty());
    assert_eq!(log.errors()[0].message, "No files added to commit");
    assert_eq!(wc.commit_message(), "feat: nothing");
}

#[tokio::test]
async fn test_commit_across_repositories_clears_message_and_records_history() {
    let backend = two_repos();
    backend.set_file("/ws/alpha", "a.txt", ChangeState::Modified, ChangeState::None);
    backend.set_file("/ws/beta", "b.txt", ChangeState::Added, ChangeState::None);
    let (mut group, log) = open_group(&backend, tree(&["/ws/alpha", "/ws/beta"])).await;
    backend.clear_calls();

    let wc = group.changes();
    wc.set_commit_message("  feat: shared change  ");
    assert!(wc.commit().await);

    let commits = backend.calls_named("commit");
    let repos: Vec<&str> = commits.iter().map(|c| c.repo.as_str()).collect();
    assert_eq!(repos, vec!["/ws/alpha", "/ws/beta"]);
    assert!(commits.iter().all(|c| c.command
        == GitCommand::Commit {
            message: "feat: shared change".to_string(),
            amend: false,
            sign_off: false
        }
        && c.watcher_enabled == Some(false)));

    assert_eq!(wc.commit_message(), "");
    assert!(wc.staged().is_empty());
    assert_eq!(wc.commit_message_history(), vec!["feat: shared change"]);
    assert!(backend.calls_named("push").is_empty());
    assert!(!log.has_errors());
}

#[tokio::test]
async fn test_failed_commit_keeps_the_message() {
    let backend = two_repos();
    backend.set_file("/ws/alpha", "a.txt", ChangeState::Modified, ChangeState::None);
    backend.set_file("/ws/beta", "b.txt", ChangeState::Modified, ChangeState::None);
    backend.fail_on("/ws/beta", "commit");
    let (mut group, log) = open_group(&backend, tree(&["/ws/alpha", "/ws/beta"])).await;

    let wc = group.changes();
    wc.set_commit_message("fix: partial");
    assert!(!wc.commit().await);

    assert_eq!(wc.commit_message(), "fix: partial");
    assert_eq!(group_paths(wc.staged()), vec!["beta/b.txt"]);
    let errors = log.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].scope, "/ws/beta");
    assert!(!wc.busy().is_committing());
}

#[tokio::test]
async fn test_commit_with_auto_stage_and_push() {
    let backend = FakeBackend::new();
    backend.add_repo("/ws/alpha");
    backend.add_modified("/ws/alpha", "f", 2);
    let (mut group, log) = open_group(&backend, tree(&["/ws/alpha"])).await;
    backend.clear_calls();

    let wc = group.changes();
    wc.set_commit_message("chore: everything");
    assert!(wc.do_commit(true, true).await);

    let names: Vec<&str> = backend.calls().iter().map(|c| c.command.name()).collect();
    assert_eq!(names, vec!["add", "commit", "push"]);
    assert!(wc.unstaged().is_empty());
    assert!(wc.staged().is_empty());
    assert!(!log.has_errors());
}

#[tokio::test]
async fn test_reapplying_the_same_data_keeps_selection_and_lists() {
    let backend = FakeBackend::new();
    backend.add_repo("/ws/alpha");
    backend.add_modified("/ws/alpha", "f", 3);
    let (mut group, _log) = open_group(&backend, tree(&["/ws/alpha"])).await;

    let wc = group.changes();
    wc.select_unstaged_paths(&paths(&["f01.txt"]));
    let before = group_paths(wc.unstaged());

    let same = wc.cached().to_vec();
    wc.set_data(same);
    wc.refresh();

    assert_eq!(group_paths(wc.unstaged()), before);
    assert_eq!(group_paths(wc.selected_unstaged()), vec!["f01.txt"]);
    assert_eq!(wc.detail().map(|d| d.change().path.clone()), Some("f01.txt".to_string()));
}

#[tokio::test]
async fn test_selection_survives_a_changed_data_set() {
    let backend = FakeBackend::new();
    backend.add_repo("/ws/alpha");
    backend.add_modified("/ws/alpha", "f", 2);
    let (mut group, _log) = open_group(&backend, tree(&["/ws/alpha"])).await;

    group.changes().select_unstaged_paths(&paths(&["f01.txt"]));
    backend.set_file("/ws/alpha", "late.txt", ChangeState::None, ChangeState::Modified);
    assert_eq!(group.reload().await, 0);

    let wc = group.working_copy().unwrap();
    assert_eq!(wc.unstaged().len(), 3);
    assert_eq!(group_paths(wc.selected_unstaged()), vec!["f01.txt"]);
}

#[tokio::test]
async fn test_same_relative_path_moving_between_repositories_is_a_change() {
    let backend = two_repos();
    backend.set_file("/ws/alpha", "README.md", ChangeState::None, ChangeState::Modified);
    backend.set_file("/ws/beta", "b.txt", ChangeState::None, ChangeState::Modified);
    let (mut group, _log) = open_group(&backend, tree(&["/ws/alpha", "/ws/beta"])).await;
    assert_eq!(group_paths(group.changes().unstaged()), vec!["alpha/README.md", "beta/b.txt"]);

    backend.remove_file("/ws/alpha", "README.md");
    backend.set_file("/ws/beta", "README.md", ChangeState::None, ChangeState::Modified);
    assert_eq!(group.reload().await, 0);

    let wc = group.working_copy().unwrap();
    assert_eq!(group_paths(wc.unstaged()), vec!["beta/README.md", "beta/b.txt"]);
    assert!(wc
        .unstaged()
        .iter()
        .all(|c| c.repository_path() == Some("/ws/beta".to_string())));
}

#[tokio::test]
async fn test_unstaged_and_staged_selections_are_mutually_exclusive() {
    let backend = FakeBackend::new();
    backend.add_repo("/ws/alpha");
    backend.set_file("/ws/alpha", "work.txt", ChangeState::None, ChangeState::Modified);
    backend.set_file("/ws/alpha", "index.txt", ChangeState::Modified, ChangeState::None);
    let (mut group, _log) = open_group(&backend, tree(&["/ws/alpha"])).await;

    let wc = group.changes();
    wc.select_unstaged_paths(&paths(&["work.txt"]));
    assert_eq!(wc.selected_unstaged().len(), 1);

    wc.select_staged_paths(&paths(&["index.txt"]));
    assert!(wc.selected_unstaged().is_empty());
    assert_eq!(wc.selected_staged().len(), 1);
    assert!(!wc.detail().unwrap().is_conflict());

    wc.select_unstaged_paths(&paths(&["work.txt"]));
    assert!(wc.selected_staged().is_empty());
    assert_eq!(wc.unstaged_actions(), Some(vec![ChangeAction::Stage, ChangeAction::Discard]));
}

#[tokio::test]
async fn test_mixed_conflict_selection_offers_no_actions() {
    let backend = FakeBackend::new();
    backend.add_repo("/ws/alpha");
    backend.set_file("/ws/alpha", "clash.rs", ChangeState::Unmerged, ChangeState::Unmerged);
    backend.set_file("/ws/alpha", "plain.rs", ChangeState::None, ChangeState::Modified);
    let (mut group, log) = open_group(&backend, tree(&["/ws/alpha"])).await;

    let wc = group.changes();
    assert!(wc.has_unsolved_conflicts());

    wc.select_unstaged_paths(&paths(&["clash.rs", "plain.rs"]));
    assert_eq!(wc.unstaged_actions(), None);
    assert_eq!(log.errors()[0].scope, "/ws/alpha");

    wc.select_unstaged_paths(&paths(&["clash.rs"]));
    assert_eq!(wc.unstaged_actions(), Some(vec![ChangeAction::UseTheirs, ChangeAction::UseMine]));
    assert!(wc.detail().unwrap().is_conflict());
}

#[tokio::test]
async fn test_use_theirs_resolves_then_stages() {
    let backend = FakeBackend::new();
    backend.add_repo("/ws/alpha");
    backend.set_file("/ws/alpha", "clash.rs", ChangeState::Unmerged, ChangeState::Unmerged);
    backend.set_file("/ws/alpha", "plain.rs", ChangeState::None, ChangeState::Modified);
    let (mut group, _log) = open_group(&backend, tree(&["/ws/alpha"])).await;
    backend.clear_calls();

    let wc = group.changes();
    let everything = wc.unstaged().to_vec();
    assert!(wc.use_theirs(everything).await);

    let commands: Vec<GitCommand> = backend.calls().into_iter().map(|c| c.command).collect();
    assert_eq!(
        commands,
        vec![
            GitCommand::UseTheirs {
                files: vec!["clash.rs".to_string()]
            },
            GitCommand::Add {
                files: Some(vec!["clash.rs".to_string()]),
                include_untracked: true
            },
        ]
    );
    assert!(!wc.has_unsolved_conflicts());
    assert_eq!(group_paths(wc.staged()), vec!["clash.rs"]);
    assert_eq!(group_paths(wc.unstaged()), vec!["plain.rs"]);
}

#[tokio::test]
async fn test_failed_resolution_skips_staging_and_restores_the_watcher() {
    let backend = FakeBackend::new();
    backend.add_repo("/ws/alpha");
    backend.set_file("/ws/alpha", "clash.rs", ChangeState::Unmerged, ChangeState::Unmerged);
    backend.fail_on("/ws/alpha", "checkout");
    let (mut group, log) = open_group(&backend, tree(&["/ws/alpha"])).await;
    backend.clear_calls();
    let queries_before = backend.change_queries();

    let wc = group.changes();
    let conflicted = wc.unstaged().to_vec();
    assert!(!wc.use_theirs(conflicted).await);

    let checkouts = backend.calls_named("checkout");
    assert_eq!(checkouts.len(), 1);
    assert_eq!(checkouts[0].watcher_enabled, Some(false));
    assert!(backend.calls_named("add").is_empty());

    let errors = log.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].scope, "/ws/alpha");
    assert!(group.repositories()[0].is_watcher_enabled());
    assert!(backend.change_queries() > queries_before);
    assert!(group.working_copy().unwrap().has_unsolved_conflicts());
}

#[tokio::test]
async fn test_discard_waits_for_confirmation() {
    let backend = FakeBackend::new();
    backend.add_repo("/ws/alpha");
    backend.set_file("/ws/alpha", "keep.txt", ChangeState::None, ChangeState::Modified);
    backend.set_file("/ws/alpha", "drop.txt", ChangeState::None, ChangeState::Modified);
    backend.set_file("/ws/alpha", "scratch.txt", ChangeState::Untracked, ChangeState::Untracked);
    let (mut group, log) = open_group(&backend, tree(&["/ws/alpha"])).await;
    backend.clear_calls();

    {
        let wc = group.changes();
        wc.select_unstaged_paths(&paths(&["drop.txt", "scratch.txt"]));
        assert!(wc.discard_selected());
    }
    assert!(backend.calls().is_empty());
    assert_eq!(group.host().popup_title().as_deref(), Some("Discard 2 changes"));

    assert!(group.host().process_popup().await);
    let names: Vec<&str> = backend.calls().iter().map(|c| c.command.name()).collect();
    assert_eq!(names, vec!["clean", "restore"]);

    group.mark_working_copy_dirty_manually();
    let wc = group.working_copy().unwrap();
    assert_eq!(group_paths(wc.unstaged()), vec!["keep.txt"]);
    assert!(!log.has_errors());
}

#[tokio::test]
async fn test_excluding_untracked_hides_new_files_on_next_pass() {
    let backend = FakeBackend::new();
    backend.add_repo("/ws/alpha");
    backend.set_file("/ws/alpha", "tracked.txt", ChangeState::None, ChangeState::Modified);
    backend.set_file("/ws/alpha", "new.txt", ChangeState::Untracked, ChangeState::Untracked);
    let (mut group, _log) = open_group(&backend, tree(&["/ws/alpha"])).await;
    assert_eq!(group.changes().unstaged().len(), 2);

    group.changes().set_include_untracked(false);
    group.reload().await;

    let wc = group.working_copy().unwrap();
    assert_eq!(group_paths(wc.unstaged()), vec!["tracked.txt"]);
    assert!(!group.repositories()[0].include_untracked());
}

#[tokio::test]
async fn test_closing_the_view_clears_state() {
    let backend = FakeBackend::new();
    backend.add_repo("/ws/alpha");
    backend.add_modified("/ws/alpha", "f", 2);
    let (mut group, _log) = open_group(&backend, tree(&["/ws/alpha"])).await;

    group.changes().set_commit_message("draft");
    group.close_changes();
    assert!(group.working_copy().is_none());

    let wc = group.changes();
    assert_eq!(wc.commit_message(), "");
    assert_eq!(wc.unstaged().len(), 2);
}

#[tokio::test]
async fn test_amend_with_nothing_staged_rewrites_every_repository() {
    let backend = two_repos();
    let (mut group, log) = open_group(&backend, tree(&["/ws/alpha", "/ws/beta"])).await;
    backend.clear_calls();

    let wc = group.changes();
    wc.set_use_amend(true);
    wc.set_commit_message("fix: reworded");
    assert!(wc.commit().await);

    let commits = backend.calls_named("commit");
    assert_eq!(commits.len(), 2);
    assert!(commits.iter().all(|c| c.command
        == GitCommand::Commit {
            message: "fix: reworded".to_string(),
            amend: true,
            sign_off: false
        }));
    assert!(!log.has_errors());
}
