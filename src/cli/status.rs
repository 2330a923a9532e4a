// ABOUTME: CLI status and branches commands
//
// status: Merged staged/unstaged lists of the whole group (text/JSON output)
// branches: Per-repository branch state plus the branches every repository shares

use anyhow::Result;
use serde::Serialize;

use super::workspace::{truncate, Workspace};
use super::{Cli, OutputFormat};
use crate::models::{ChangeRecord, ChangeState, InProgressContext};

/// JSON output structure for one change
#[derive(Debug, Serialize)]
pub struct ChangeOutput {
    pub group_path: String,
    pub path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub original_path: String,
    pub index: ChangeState,
    pub work_tree: ChangeState,
    pub repository: String,
    pub conflicted: bool,
}

impl From<&ChangeRecord> for ChangeOutput {
    fn from(change: &ChangeRecord) -> Self {
        Self {
            group_path: change.group_path.clone(),
            path: change.path.clone(),
            original_path: change.original_path.clone(),
            index: change.index,
            work_tree: change.work_tree,
            repository: change.repository_path().unwrap_or_default(),
            conflicted: change.is_conflicted(),
        }
    }
}

/// JSON output structure for the status command
#[derive(Debug, Serialize)]
pub struct StatusOutput {
    pub path_prefix: String,
    pub staged: Vec<ChangeOutput>,
    pub unstaged: Vec<ChangeOutput>,
    pub has_unsolved_conflicts: bool,
    pub in_progress: Vec<InProgressContext>,
}

/// Execute the status command
pub async fn execute(cli: &Cli) -> Result<()> {
    let mut ws = Workspace::open(cli).await?;
    let path_prefix = ws.group.path_prefix();
    let output = {
        let wc = ws.group.changes();
        StatusOutput {
            path_prefix,
            staged: wc.staged().iter().map(ChangeOutput::from).collect(),
            unstaged: wc.unstaged().iter().map(ChangeOutput::from).collect(),
            has_unsolved_conflicts: wc.has_unsolved_conflicts(),
            in_progress: wc.in_progress_contexts().to_vec(),
        }
    };

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
        OutputFormat::Text => output_text(&output),
    }

    ws.finish(cli.format)
}

fn output_text(status: &StatusOutput) {
    for context in &status.in_progress {
        println!("{} in progress: {}", context.kind, context.repository);
    }
    if status.has_unsolved_conflicts {
        println!("Unresolved conflicts present.");
    }

    if status.staged.is_empty() && status.unstaged.is_empty() {
        println!("Working copy clean.");
        return;
    }

    if !status.staged.is_empty() {
        println!("Staged:");
        for change in &status.staged {
            println!("  {}", format_change(change, change.index));
        }
    }
    if !status.unstaged.is_empty() {
        println!("Unstaged:");
        for change in &status.unstaged {
            println!("  {}", format_change(change, change.work_tree));
        }
    }
}

fn format_change(change: &ChangeOutput, state: ChangeState) -> String {
    let marker = if change.conflicted { '!' } else { state.symbol() };
    if change.original_path.is_empty() {
        format!("{marker}  {}", change.group_path)
    } else {
        format!("{marker}  {} (from {})", change.group_path, change.original_path)
    }
}

/// JSON output structure for one repository's branches
#[derive(Debug, Serialize)]
pub struct RepositoryBranches {
    pub repository: String,
    pub current: Option<String>,
    pub ahead: usize,
    pub behind: usize,
}

#[derive(Debug, Serialize)]
pub struct BranchesOutput {
    pub repositories: Vec<RepositoryBranches>,
    pub common: Vec<String>,
}

/// Execute the branches command
pub async fn branches(cli: &Cli) -> Result<()> {
    let ws = Workspace::open(cli).await?;
    let output = BranchesOutput {
        repositories: ws
            .group
            .repositories()
            .iter()
            .map(|repo| {
                let summary = repo.branches();
                RepositoryBranches {
                    repository: repo.full_path().to_string(),
                    current: summary.current,
                    ahead: summary.ahead,
                    behind: summary.behind,
                }
            })
            .collect(),
        common: ws.group.common_branches(),
    };

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
        OutputFormat::Text => {
            println!("{:<40} {:<25} {:>6} {:>6}", "REPOSITORY", "BRANCH", "AHEAD", "BEHIND");
            println!("{}", "-".repeat(80));
            for repo in &output.repositories {
                println!(
                    "{:<40} {:<25} {:>6} {:>6}",
                    truncate(&repo.repository, 40),
                    truncate(repo.current.as_deref().unwrap_or("(detached)"), 25),
                    repo.ahead,
                    repo.behind
                );
            }
            println!();
            if output.common.is_empty() {
                println!("No branch is shared by every repository.");
            } else {
                println!("Common branches: {}", output.common.join(", "));
            }
        }
    }

    ws.finish(cli.format)
}
