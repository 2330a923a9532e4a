// ABOUTME: CLI working copy commands - stage, unstage, commit, resolve and discard
//
// Changes are addressed by group path, the repository-qualified path printed by `status`.
// Paths that match nothing on the requested side are reported and skipped.

use anyhow::{anyhow, Result};

use super::workspace::Workspace;
use super::{Cli, CommitArgs, DiscardArgs, ResolveArgs, SelectArgs};
use crate::app::{GroupError, NotificationLog, Notifier};
use crate::models::ChangeRecord;

fn report_unmatched(log: &NotificationLog, requested: &[String], selected: &[ChangeRecord], side: &str) {
    for path in requested {
        if !selected.iter().any(|c| c.group_path == *path) {
            log.report(&GroupError::validation(path.clone(), format!("No {side} change at this path")));
        }
    }
}

/// Execute the stage command
pub async fn stage(cli: &Cli, args: &SelectArgs) -> Result<()> {
    let mut ws = Workspace::open(cli).await?;
    let wc = ws.group.changes();

    let staged = if args.all {
        wc.stage_all().await
    } else {
        wc.select_unstaged_paths(&args.paths);
        report_unmatched(&ws.log, &args.paths, wc.selected_unstaged(), "unstaged");
        wc.stage_selected(None).await
    };
    if staged {
        println!("{} staged, {} unstaged", wc.staged().len(), wc.unstaged().len());
    }

    ws.finish(cli.format)
}

/// Execute the unstage command
pub async fn unstage(cli: &Cli, args: &SelectArgs) -> Result<()> {
    let mut ws = Workspace::open(cli).await?;
    let wc = ws.group.changes();

    let unstaged = if args.all {
        wc.unstage_all().await
    } else {
        wc.select_staged_paths(&args.paths);
        report_unmatched(&ws.log, &args.paths, wc.selected_staged(), "staged");
        wc.unstage_selected(None).await
    };
    if unstaged {
        println!("{} staged, {} unstaged", wc.staged().len(), wc.unstaged().len());
    }

    ws.finish(cli.format)
}

/// Execute the commit command
pub async fn commit(cli: &Cli, args: &CommitArgs) -> Result<()> {
    let mut ws = Workspace::open(cli).await?;
    let wc = ws.group.changes();

    wc.set_commit_message(args.message.clone());
    wc.set_use_amend(args.amend);
    let targets = if args.all {
        wc.staged().len() + wc.unstaged().len()
    } else {
        wc.staged().len()
    };

    let auto_stage = args.all || wc.auto_stage_before_commit();
    if wc.do_commit(auto_stage, args.push).await {
        println!("Committed {targets} changes");
    }

    ws.finish(cli.format)
}

/// Execute the resolve command
pub async fn resolve(cli: &Cli, args: &ResolveArgs) -> Result<()> {
    let mut ws = Workspace::open(cli).await?;
    let wc = ws.group.changes();

    wc.select_unstaged_paths(&args.paths);
    report_unmatched(&ws.log, &args.paths, wc.selected_unstaged(), "unstaged");
    let selection = wc.selected_unstaged().to_vec();
    for change in selection.iter().filter(|c| !c.is_conflicted()) {
        ws.log.report(&GroupError::validation(change.group_path.clone(), "Not in conflict"));
    }

    let resolved = if args.theirs {
        wc.use_theirs(selection).await
    } else {
        wc.use_mine(selection).await
    };
    if resolved {
        let side = if args.theirs { "theirs" } else { "mine" };
        println!("Resolved using {side}; {} conflicts remain", wc.unstaged().iter().filter(|c| c.is_conflicted()).count());
    }

    ws.finish(cli.format)
}

/// Execute the discard command
pub async fn discard(cli: &Cli, args: &DiscardArgs) -> Result<()> {
    if !args.yes {
        return Err(anyhow!("Discarding changes cannot be undone; pass --yes to confirm"));
    }
    if !args.all && args.paths.is_empty() {
        return Err(anyhow!("Nothing to discard; pass group paths or --all"));
    }

    let mut ws = Workspace::open(cli).await?;
    let shown = {
        let wc = ws.group.changes();
        if args.all {
            wc.discard_all(args.include_ignored)
        } else {
            wc.select_unstaged_paths(&args.paths);
            report_unmatched(&ws.log, &args.paths, wc.selected_unstaged(), "unstaged");
            wc.discard_selected()
        }
    };

    // Confirmed on the command line, so run the installed popup straight away.
    if shown && ws.group.host().process_popup().await {
        ws.group.mark_working_copy_dirty_manually();
        if !ws.log.has_errors() {
            println!("Discarded");
        }
    }

    ws.finish(cli.format)
}
