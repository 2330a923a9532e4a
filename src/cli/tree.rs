// ABOUTME: CLI tree and save-layout commands
//
// tree: Print the group's visible rows, indented by depth, optionally filtered
// save-layout: Persist the scanned (or loaded) node tree as JSON

use anyhow::Result;
use serde::Serialize;

use super::workspace::{load_tree, Workspace};
use super::{Cli, OutputFormat, SaveLayoutArgs, TreeArgs};
use crate::app::TreeRow;
use crate::config::AppConfig;
use crate::git::GroupLayout;

/// JSON output structure for one tree row
#[derive(Debug, Serialize)]
pub struct RowOutput {
    pub id: String,
    pub name: String,
    pub depth: usize,
    pub is_repository: bool,
}

impl From<&TreeRow> for RowOutput {
    fn from(row: &TreeRow) -> Self {
        Self {
            id: row.id.clone(),
            name: row.name.clone(),
            depth: row.depth,
            is_repository: row.is_repository,
        }
    }
}

/// Execute the tree command
pub async fn execute(cli: &Cli, args: &TreeArgs) -> Result<()> {
    let mut ws = Workspace::open(cli).await?;
    if let Some(filter) = &args.filter {
        ws.group.set_search_filter(filter.clone());
    }

    let rows: Vec<RowOutput> = ws.group.rows().iter().map(RowOutput::from).collect();
    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Text => output_text(&rows),
    }

    ws.finish(cli.format)
}

fn output_text(rows: &[RowOutput]) {
    if rows.is_empty() {
        println!("No repositories found.");
        return;
    }
    for row in rows {
        println!("{}", format_row(row));
    }
}

fn format_row(row: &RowOutput) -> String {
    let indent = "  ".repeat(row.depth);
    if row.is_repository {
        format!("{indent}{}  ({})", row.name, row.id)
    } else {
        format!("{indent}{}/", row.name)
    }
}

/// Execute the save-layout command
pub fn save_layout(cli: &Cli, args: &SaveLayoutArgs) -> Result<()> {
    let config = AppConfig::load()?;
    let root = load_tree(cli.layout.as_deref(), &cli.root, &config)?;
    let count = root.repository_ids().len();
    GroupLayout::new(root).save(&args.file)?;
    println!("Saved {} repositories to {}", count, args.file.display());
    Ok(())
}
