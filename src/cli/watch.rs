// ABOUTME: CLI watch command - keeps the group open and follows working copy changes
//
// One file watcher per repository feeds the group's event channel; every change re-runs
// that repository's dirty pass and prints a one-line summary. Stops on Ctrl-C.

use anyhow::{anyhow, Result};
use chrono::Local;
use tracing::{info, warn};

use super::workspace::Workspace;
use super::{Cli, OutputFormat};
use crate::app::GroupEvent;
use crate::git::FileWatcher;

/// Execute the watch command
pub async fn execute(cli: &Cli) -> Result<()> {
    let mut ws = Workspace::open(cli).await?;
    let mut events = ws
        .group
        .take_event_receiver()
        .ok_or_else(|| anyhow!("Group event channel already taken"))?;

    let mut watchers = Vec::new();
    if ws.config.watcher.enabled {
        let poll_interval = ws.config.watcher.poll_interval();
        for repo in ws.group.repositories() {
            match FileWatcher::new(&repo, poll_interval, ws.group.event_sender()) {
                Ok(watcher) => watchers.push(watcher),
                Err(e) => warn!("Not watching {}: {}", repo.full_path(), e),
            }
        }
    } else {
        warn!("File watching is disabled in config; only explicit reloads will be reported");
    }
    info!("Watching {} repositories", watchers.len());

    ws.group.changes();
    let mut errors = print_summary(&ws, cli.format);
    println!("Watching {} repositories, Ctrl-C to stop", watchers.len());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let is_summary = matches!(event, GroupEvent::ChangesUpdated { .. });
                ws.group.handle_event(event).await;
                if is_summary {
                    errors += print_summary(&ws, cli.format);
                }
            }
            _ = &mut ctrl_c => {
                info!("Interrupted, stopping watchers");
                break;
            }
        }
    }

    drop(watchers);
    ws.group.close_changes();
    ws.finish(cli.format)?;
    if errors > 0 {
        return Err(anyhow!("{errors} operation(s) failed while watching"));
    }
    Ok(())
}

/// Print the current counts and any pending notifications. Returns how many were errors.
fn print_summary(ws: &Workspace, format: OutputFormat) -> usize {
    let Some(wc) = ws.group.working_copy() else {
        return 0;
    };
    let staged = wc.staged().len();
    let unstaged = wc.unstaged().len();
    let conflicts = wc.has_unsolved_conflicts();

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({
                "time": Local::now().to_rfc3339(),
                "staged": staged,
                "unstaged": unstaged,
                "has_unsolved_conflicts": conflicts,
            })
        ),
        OutputFormat::Text => println!(
            "[{}] {} staged, {} unstaged{}",
            Local::now().format("%H:%M:%S"),
            staged,
            unstaged,
            if conflicts { ", conflicts" } else { "" }
        ),
    }

    let mut errors = 0;
    for n in ws.log.drain() {
        let level = if n.is_error {
            errors += 1;
            "error"
        } else {
            "info"
        };
        eprintln!("{level}: {}: {}", n.scope, n.message);
    }
    errors
}
