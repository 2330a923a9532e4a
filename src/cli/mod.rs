// ABOUTME: CLI argument parsing and command routing for gitgroup
//
// Provides command-line interface for:
// - Inspecting a group (tree, status, branches)
// - Group-wide remote commands (fetch, pull, push, checkout, abort)
// - Working copy commands (stage, unstage, commit, resolve, discard)
// - Watching every repository for changes (watch)
// - Persisting the scanned tree (save-layout)

pub mod changes;
pub mod remote;
pub mod status;
pub mod tree;
pub mod watch;
pub mod workspace;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Work with many git repositories as one group
#[derive(Parser)]
#[command(name = "gitgroup")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory to scan for repositories
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Load the group tree from a saved layout instead of scanning
    #[arg(long, global = true)]
    pub layout: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

/// Output format for commands
#[derive(Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Print the visible repository tree
    Tree(TreeArgs),

    /// Show merged staged and unstaged changes
    Status,

    /// Fetch every repository
    Fetch,

    /// Pull every repository
    Pull,

    /// Push every repository with outgoing commits
    Push,

    /// List branches present in every repository
    Branches,

    /// Check out a common branch everywhere, discarding local changes
    Checkout(CheckoutArgs),

    /// Stage changes by group path
    Stage(SelectArgs),

    /// Unstage changes by group path
    Unstage(SelectArgs),

    /// Commit staged changes in every repository with one message
    Commit(CommitArgs),

    /// Resolve conflicts by taking one side
    Resolve(ResolveArgs),

    /// Throw away local changes
    Discard(DiscardArgs),

    /// Abort in-progress merges, rebases, cherry-picks and reverts
    Abort,

    /// Watch every repository and report working copy changes until Ctrl-C
    Watch,

    /// Save the scanned tree as a JSON layout
    SaveLayout(SaveLayoutArgs),
}

/// Arguments for the tree command
#[derive(clap::Args)]
pub struct TreeArgs {
    /// Only show nodes matching this text
    #[arg(long)]
    pub filter: Option<String>,
}

/// Arguments for the checkout command
#[derive(clap::Args)]
pub struct CheckoutArgs {
    pub branch: String,
}

/// Arguments for stage and unstage
#[derive(clap::Args)]
pub struct SelectArgs {
    /// Group paths as printed by `status`
    pub paths: Vec<String>,

    /// Apply to every change
    #[arg(long, conflicts_with = "paths")]
    pub all: bool,
}

/// Arguments for the commit command
#[derive(clap::Args)]
pub struct CommitArgs {
    #[arg(long, short)]
    pub message: String,

    /// Stage every change before committing
    #[arg(long, short)]
    pub all: bool,

    /// Push each committed repository afterwards
    #[arg(long)]
    pub push: bool,

    /// Amend the previous commit
    #[arg(long)]
    pub amend: bool,
}

/// Arguments for the resolve command
#[derive(clap::Args)]
pub struct ResolveArgs {
    #[arg(long, conflicts_with = "mine", required_unless_present = "mine")]
    pub theirs: bool,

    #[arg(long)]
    pub mine: bool,

    #[arg(required = true)]
    pub paths: Vec<String>,
}

/// Arguments for the discard command
#[derive(clap::Args)]
pub struct DiscardArgs {
    pub paths: Vec<String>,

    /// Discard every change in every repository
    #[arg(long, conflicts_with = "paths")]
    pub all: bool,

    /// With --all, also remove ignored files
    #[arg(long, requires = "all")]
    pub include_ignored: bool,

    /// Confirm without prompting
    #[arg(long)]
    pub yes: bool,
}

/// Arguments for the save-layout command
#[derive(clap::Args)]
pub struct SaveLayoutArgs {
    pub file: PathBuf,
}
