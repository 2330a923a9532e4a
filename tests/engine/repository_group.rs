// ABOUTME: Repository group tests - tree rows, search, node editing, prefix and group-wide commands

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use gitgroup::app::GroupEvent;
use gitgroup::git::GitCommand;
use gitgroup::models::{BranchSummary, ChangeState, InProgressKind, RepositoryNode};

use super::fixtures::{open_group, tree, FakeBackend};

fn row_names(group: &gitgroup::app::RepositoryGroup) -> Vec<(String, usize)> {
    group.rows().iter().map(|r| (r.name.clone(), r.depth)).collect()
}

fn nested() -> RepositoryNode {
    RepositoryNode::folder("ws").expanded().with_children(vec![
        RepositoryNode::folder("libs").expanded().with_children(vec![
            RepositoryNode::repository("/ws/libs/core"),
            RepositoryNode::repository("/ws/libs/net"),
        ]),
        RepositoryNode::repository("/ws/app"),
    ])
}

fn nested_backend() -> std::sync::Arc<FakeBackend> {
    let backend = FakeBackend::new();
    for path in ["/ws/libs/core", "/ws/libs/net", "/ws/app"] {
        backend.add_repo(path);
    }
    backend
}

#[tokio::test]
async fn test_refresh_opens_every_visible_repository_and_computes_prefix() {
    let backend = nested_backend();
    let (group, log) = open_group(&backend, nested()).await;

    let mut opened: Vec<String> = group.repositories().iter().map(|r| r.full_path().to_string()).collect();
    opened.sort();
    assert_eq!(opened, vec!["/ws/app", "/ws/libs/core", "/ws/libs/net"]);
    assert_eq!(group.path_prefix(), "/ws/");
    assert_eq!(
        row_names(&group),
        vec![
            ("ws".to_string(), 0),
            ("libs".to_string(), 1),
            ("core".to_string(), 2),
            ("net".to_string(), 2),
            ("app".to_string(), 1)
        ]
    );
    assert!(!log.has_errors());
}

#[tokio::test]
async fn test_toggling_twice_restores_rows() {
    let backend = nested_backend();
    let (mut group, _log) = open_group(&backend, nested()).await;
    let libs_id = group.root().sub_nodes[0].id.clone();
    let before = group.rows().to_vec();

    assert!(group.toggle_node_is_expanded(&libs_id));
    assert_eq!(
        row_names(&group),
        vec![("ws".to_string(), 0), ("libs".to_string(), 1), ("app".to_string(), 1)]
    );

    assert!(group.toggle_node_is_expanded(&libs_id));
    assert_eq!(group.rows(), before.as_slice());
}

#[tokio::test]
async fn test_toggle_unknown_node_is_reported() {
    let backend = nested_backend();
    let (mut group, log) = open_group(&backend, nested()).await;

    assert!(!group.toggle_node_is_expanded("missing"));
    assert_eq!(log.errors()[0].scope, "missing");
}

#[tokio::test]
async fn test_search_filter_hides_rows_and_clearing_restores_them() {
    let backend = nested_backend();
    let (mut group, _log) = open_group(&backend, nested()).await;

    group.set_search_filter("NET");
    assert_eq!(
        row_names(&group),
        vec![("ws".to_string(), 0), ("libs".to_string(), 1), ("net".to_string(), 2)]
    );

    group.clear_search_filter();
    assert_eq!(group.rows().len(), 5);
}

#[tokio::test]
async fn test_prefix_is_empty_without_repositories() {
    let backend = FakeBackend::new();
    let (group, _log) = open_group(&backend, RepositoryNode::folder("empty").expanded()).await;

    assert!(group.repositories().is_empty());
    assert_eq!(group.path_prefix(), "");
}

#[tokio::test]
async fn test_unknown_repository_is_reported_and_not_opened() {
    let backend = FakeBackend::new();
    backend.add_repo("/ws/app");
    let (group, log) = open_group(&backend, tree(&["/ws/app", "/ws/gone"])).await;

    assert_eq!(group.repositories().len(), 1);
    let errors = log.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].scope, "/ws/gone");
}

#[tokio::test]
async fn test_remove_node_closes_repositories_under_it() {
    let backend = nested_backend();
    let (mut group, _log) = open_group(&backend, nested()).await;
    let libs_id = group.root().sub_nodes[0].id.clone();

    assert!(group.remove_node(&libs_id));

    let opened: Vec<String> = group.repositories().iter().map(|r| r.full_path().to_string()).collect();
    assert_eq!(opened, vec!["/ws/app"]);
    assert_eq!(group.path_prefix(), "/ws/app");
    assert!(group.node(&libs_id).is_none());
}

#[tokio::test]
async fn test_remove_root_is_refused() {
    let backend = nested_backend();
    let (mut group, log) = open_group(&backend, nested()).await;
    let root_id = group.id().to_string();

    assert!(!group.remove_node(&root_id));
    assert!(log.has_errors());
    assert_eq!(group.repositories().len(), 3);
}

#[tokio::test]
async fn test_move_node_into_folder_and_refusals() {
    let backend = nested_backend();
    let (mut group, log) = open_group(&backend, nested()).await;
    let libs_id = group.root().sub_nodes[0].id.clone();

    assert!(group.move_node("/ws/app", Some(&libs_id)));
    assert_eq!(
        group.node(&libs_id).unwrap().repository_ids(),
        vec!["/ws/libs/core", "/ws/libs/net", "/ws/app"]
    );

    // Into itself, into a repository leaf
    assert!(!group.move_node(&libs_id, Some(&libs_id)));
    assert!(!group.move_node("/ws/libs/core", Some("/ws/app")));
    assert_eq!(log.errors().len(), 2);
}

#[tokio::test]
async fn test_add_node_opens_the_new_repository() {
    let backend = nested_backend();
    backend.add_repo("/ws/tools");
    let (mut group, _log) = open_group(&backend, nested()).await;

    assert!(group.add_node(None, RepositoryNode::repository("/ws/tools")));
    assert!(group.repository("/ws/tools").is_some());
    assert!(!group.add_node(Some("/ws/app"), RepositoryNode::repository("/ws/other")));
}

#[tokio::test]
async fn test_push_only_repositories_with_outgoing_commits() {
    let backend = nested_backend();
    backend.set_branches(
        "/ws/app",
        BranchSummary {
            current: Some("main".to_string()),
            ahead: 2,
            behind: 0,
            local: vec!["main".to_string()],
        },
    );
    let (group, log) = open_group(&backend, nested()).await;

    assert_eq!(group.push().await, 1);

    let pushes = backend.calls_named("push");
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].repo, "/ws/app");
    assert!(!log.has_errors());
}

#[tokio::test]
async fn test_fetch_runs_once_per_repository_in_order() {
    let backend = nested_backend();
    let (group, _log) = open_group(&backend, nested()).await;

    group.fetch().await;

    let fetched: Vec<String> = backend.calls_named("fetch").into_iter().map(|c| c.repo).collect();
    let expected: Vec<String> = group.repositories().iter().map(|r| r.full_path().to_string()).collect();
    assert_eq!(fetched, expected);
    assert!(!group.host().is_in_progress());
}

#[tokio::test]
async fn test_pull_failure_is_reported_and_others_still_run() {
    let backend = nested_backend();
    backend.fail_on("/ws/libs/core", "pull");
    let (group, log) = open_group(&backend, nested()).await;

    group.pull().await;

    assert_eq!(backend.calls_named("pull").len(), 3);
    let errors = log.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].scope, "/ws/libs/core");
    assert!(group.repositories().iter().all(|r| r.is_watcher_enabled()));
}

#[tokio::test]
async fn test_checkout_requires_a_common_branch() {
    let backend = nested_backend();
    backend.set_branches(
        "/ws/app",
        BranchSummary {
            current: Some("main".to_string()),
            ahead: 0,
            behind: 0,
            local: vec!["develop".to_string(), "main".to_string()],
        },
    );
    let (group, log) = open_group(&backend, nested()).await;

    assert_eq!(group.common_branches(), vec!["main".to_string()]);
    assert!(!group.checkout("develop").await);
    assert!(backend.calls_named("checkout").is_empty());
    assert!(log.has_errors());

    assert!(group.checkout("main").await);
    let checkouts = backend.calls_named("checkout");
    assert_eq!(checkouts.len(), 3);
    assert!(checkouts.iter().all(|c| c.command
        == GitCommand::Checkout {
            branch: "main".to_string(),
            discard_local: true
        }
        && c.watcher_enabled == Some(false)));
}

#[tokio::test]
async fn test_abort_in_progress_only_touches_repositories_mid_operation() {
    let temp_dir = TempDir::new().unwrap();
    let git_dir = temp_dir.path().join("app.git");
    std::fs::create_dir_all(&git_dir).unwrap();
    std::fs::write(git_dir.join("MERGE_HEAD"), "abc\n").unwrap();

    let backend = nested_backend();
    backend.set_git_dir("/ws/app", git_dir);
    let (mut group, _log) = open_group(&backend, nested()).await;

    group.changes();
    assert_eq!(group.primary_in_progress().map(|c| c.kind), Some(InProgressKind::Merge));
    assert_eq!(group.in_progress_contexts().len(), 1);

    assert_eq!(group.abort_in_progress().await, 1);
    let aborts = backend.calls_named("merge");
    assert_eq!(aborts.len(), 1);
    assert_eq!(aborts[0].repo, "/ws/app");

    group.mark_working_copy_dirty_manually();
    assert!(group.primary_in_progress().is_none());
}

#[tokio::test]
async fn test_stale_leaf_is_reported_once_across_refreshes() {
    let backend = FakeBackend::new();
    backend.add_repo("/ws/app");
    let (mut group, log) = open_group(&backend, tree(&["/ws/app", "/ws/gone"])).await;

    group.set_search_filter("g");
    group.clear_search_filter();
    group.set_search_filter("gone");
    group.clear_search_filter();

    let errors = log.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].scope, "/ws/gone");
}

#[tokio::test]
async fn test_stale_leaf_is_reported_again_after_it_is_removed_and_re_added() {
    let backend = FakeBackend::new();
    backend.add_repo("/ws/app");
    let (mut group, log) = open_group(&backend, tree(&["/ws/app", "/ws/gone"])).await;

    assert!(group.remove_node("/ws/gone"));
    assert!(group.add_node(None, RepositoryNode::repository("/ws/gone")));

    assert_eq!(log.errors().len(), 2);
}

#[tokio::test]
async fn test_unhandled_events_are_dropped_on_manual_refresh() {
    let backend = nested_backend();
    let (mut group, _log) = open_group(&backend, nested()).await;
    group.changes();

    backend.set_file("/ws/app", "main.rs", ChangeState::None, ChangeState::Modified);
    assert_eq!(group.reload().await, 0);
    assert_eq!(group.working_copy().unwrap().unstaged().len(), 1);

    let mut events = group.take_event_receiver().unwrap();
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_in_progress_contexts_are_ordered_by_priority_across_repositories() {
    let temp_dir = TempDir::new().unwrap();
    let core_git = temp_dir.path().join("core.git");
    let app_git = temp_dir.path().join("app.git");
    std::fs::create_dir_all(&core_git).unwrap();
    std::fs::write(core_git.join("MERGE_HEAD"), "abc\n").unwrap();
    std::fs::create_dir_all(app_git.join("rebase-merge")).unwrap();

    let backend = nested_backend();
    backend.set_git_dir("/ws/libs/core", core_git);
    backend.set_git_dir("/ws/app", app_git);
    let (mut group, _log) = open_group(&backend, nested()).await;
    assert!(group.in_progress_contexts().is_empty());

    group.changes();
    let contexts: Vec<(InProgressKind, String)> = group
        .in_progress_contexts()
        .into_iter()
        .map(|c| (c.kind, c.repository))
        .collect();
    assert_eq!(
        contexts,
        vec![
            (InProgressKind::Rebase, "/ws/app".to_string()),
            (InProgressKind::Merge, "/ws/libs/core".to_string())
        ]
    );
    assert_eq!(
        group.primary_in_progress().map(|c| (c.kind, c.repository)),
        Some((InProgressKind::Rebase, "/ws/app".to_string()))
    );

    assert_eq!(group.abort_in_progress().await, 2);
    assert_eq!(backend.calls_named("rebase")[0].repo, "/ws/app");
    assert_eq!(backend.calls_named("merge")[0].repo, "/ws/libs/core");

    group.mark_working_copy_dirty_manually();
    assert!(group.in_progress_contexts().is_empty());
}

#[tokio::test]
async fn test_work_tree_event_requeries_and_updates_the_open_view() {
    let backend = nested_backend();
    let (mut group, _log) = open_group(&backend, nested()).await;
    let mut events = group.take_event_receiver().unwrap();
    assert!(group.take_event_receiver().is_none());

    group.changes();
    assert!(group.working_copy().unwrap().unstaged().is_empty());

    backend.set_file("/ws/app", "main.rs", ChangeState::None, ChangeState::Modified);
    group
        .handle_event(GroupEvent::WorkTreeChanged {
            repo_id: "/ws/app".to_string(),
        })
        .await;

    let event = events.recv().await.unwrap();
    assert_eq!(
        event,
        GroupEvent::ChangesUpdated {
            repo_id: "/ws/app".to_string()
        }
    );
    group.handle_event(event).await;

    let unstaged = group.working_copy().unwrap().unstaged();
    assert_eq!(unstaged.len(), 1);
    assert_eq!(unstaged[0].group_path, "app/main.rs");
}
