use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use repo_snapshot::cli::handlers::{handle_backup, handle_restore, open_workspace};
use repo_snapshot::cli::ui::{print_error, set_color_enabled};
use repo_snapshot::cli::{Cli, Commands};

fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Run the application
    if let Err(error) = run_app(cli) {
        print_error(&format!("{:#}", error));
        process::exit(1);
    }
}

fn run_app(cli: Cli) -> Result<()> {
    let root = match &cli.workspace {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("reading current directory")?,
    };
    let workspace = open_workspace(&root)
        .with_context(|| format!("loading configuration for {}", root.display()))?;

    set_color_enabled(workspace.config.ui.colored && !cli.no_color);
    init_logging(cli.verbose, &workspace.config.ui.log_level, !cli.no_color);

    match &cli.command {
        Commands::Backup(args) => handle_backup(&workspace, args).context("backup failed")?,
        Commands::Restore { run, no_sync } => {
            handle_restore(&workspace, run, *no_sync).context("restore failed")?
        }
    }
    Ok(())
}

/// `-v` flags win over the configured level; `RUST_LOG` wins over both
fn init_logging(verbose: u8, configured: &str, ansi: bool) {
    let level = match verbose {
        0 => configured,
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("repo_snapshot={}", level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(false)
        .try_init();
}

