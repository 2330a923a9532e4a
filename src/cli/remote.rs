// ABOUTME: CLI group-wide commands - fetch, pull, push, checkout and abort
//
// Each command enqueues one operation per repository on the group's task host;
// the host runs them one at a time and every failure is reported as a notification.

use anyhow::Result;

use super::workspace::Workspace;
use super::{CheckoutArgs, Cli};

/// Execute the fetch command
pub async fn fetch(cli: &Cli) -> Result<()> {
    let ws = Workspace::open(cli).await?;
    ws.group.fetch().await;
    println!("Fetched {} repositories", ws.group.repositories().len());
    ws.finish(cli.format)
}

/// Execute the pull command
pub async fn pull(cli: &Cli) -> Result<()> {
    let ws = Workspace::open(cli).await?;
    ws.group.pull().await;
    println!("Pulled {} repositories", ws.group.repositories().len());
    ws.finish(cli.format)
}

/// Execute the push command
pub async fn push(cli: &Cli) -> Result<()> {
    let ws = Workspace::open(cli).await?;
    let pushed = ws.group.push().await;
    if pushed == 0 {
        println!("Nothing to push.");
    } else {
        println!("Pushed {pushed} repositories");
    }
    ws.finish(cli.format)
}

/// Execute the checkout command
pub async fn checkout(cli: &Cli, args: &CheckoutArgs) -> Result<()> {
    let ws = Workspace::open(cli).await?;
    if ws.group.checkout(&args.branch).await {
        println!(
            "Checked out {} in {} repositories",
            args.branch,
            ws.group.repositories().len()
        );
    }
    ws.finish(cli.format)
}

/// Execute the abort command
pub async fn abort(cli: &Cli) -> Result<()> {
    let ws = Workspace::open(cli).await?;
    let aborted = ws.group.abort_in_progress().await;
    if aborted == 0 {
        println!("No operation in progress.");
    } else {
        println!("Aborted {aborted} in-progress operations");
    }
    ws.finish(cli.format)
}
