// ABOUTME: Main entry point for gitgroup
//
// Binary: gitgroup
// Usage: gitgroup [--root DIR] [--layout FILE] [--format text|json] <COMMAND>
// - tree: show the repository tree
// - status: merged staged/unstaged changes
// - fetch / pull / push: group-wide remote commands
// - branches / checkout: common branches and group checkout
// - stage / unstage / commit / resolve / discard: working copy commands
// - abort: abort in-progress merges and rebases
// - watch: follow working copy changes
// - save-layout: persist the tree

#![allow(missing_docs)]

use anyhow::Result;
use clap::Parser;

use gitgroup::cli::{self, Commands};
use gitgroup::config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().unwrap_or_else(|e| {
        eprintln!("Ignoring invalid configuration: {e:#}");
        AppConfig::default()
    });
    setup_logging(&config);
    setup_panic_handler();

    let args = cli::Cli::parse();

    let result = match &args.command {
        Commands::Tree(tree_args) => cli::tree::execute(&args, tree_args).await,
        Commands::Status => cli::status::execute(&args).await,
        Commands::Fetch => cli::remote::fetch(&args).await,
        Commands::Pull => cli::remote::pull(&args).await,
        Commands::Push => cli::remote::push(&args).await,
        Commands::Branches => cli::status::branches(&args).await,
        Commands::Checkout(checkout_args) => cli::remote::checkout(&args, checkout_args).await,
        Commands::Stage(select_args) => cli::changes::stage(&args, select_args).await,
        Commands::Unstage(select_args) => cli::changes::unstage(&args, select_args).await,
        Commands::Commit(commit_args) => cli::changes::commit(&args, commit_args).await,
        Commands::Resolve(resolve_args) => cli::changes::resolve(&args, resolve_args).await,
        Commands::Discard(discard_args) => cli::changes::discard(&args, discard_args).await,
        Commands::Abort => cli::remote::abort(&args).await,
        Commands::Watch => cli::watch::execute(&args).await,
        Commands::SaveLayout(layout_args) => cli::tree::save_layout(&args, layout_args),
    };

    if let Err(e) = &result {
        tracing::error!("Command failed: {:#}", e);
    }
    result
}

fn setup_logging(config: &AppConfig) {
    use std::fs::OpenOptions;
    use std::path::PathBuf;
    use tracing_subscriber::prelude::*;

    // Create log directory if it doesn't exist
    let log_dir = AppConfig::log_dir().unwrap_or_else(|_| PathBuf::from(".gitgroup/logs"));
    let _ = std::fs::create_dir_all(&log_dir);

    // Create JSONL log file with timestamp
    let log_file = log_dir.join(format!(
        "gitgroup-{}.jsonl",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    ));

    let file = match OpenOptions::new().create(true).append(true).open(&log_file) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Logging disabled, cannot open {}: {}", log_file.display(), e);
            return;
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()             // Output in JSON Lines format
                .with_target(true)  // Include target module in JSON
                .with_writer(file)
                .with_ansi(false),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.filter.as_str().into()),
        )
        .init();
}

fn setup_panic_handler() {
    use tracing::error;

    std::panic::set_hook(Box::new(|panic_info| {
        error!("Application panicked: {}", panic_info);
        eprintln!("Application panicked: {}", panic_info);
        eprintln!("Please check the logs for more details.");
    }));
}
