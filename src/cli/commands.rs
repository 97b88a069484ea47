use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "repo-snapshot", version, about = "Back up and restore the local state of a repo workspace")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Workspace root (defaults to the current directory)
    #[arg(short, long, global = true)]
    pub workspace: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture local branches, remotes, HEAD and uncommitted changes into an archive
    Backup(RunArgs),

    /// Sync the workspace and replay an archive onto it
    Restore {
        #[command(flatten)]
        run: RunArgs,

        /// Replay onto the current checkouts without running a sync first
        #[arg(long)]
        no_sync: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Override destructive preconditions (existing archive, dirty trees, conflicting branches)
    #[arg(short = 'f', long = "force")]
    pub force: bool,

    /// Archive location: a .zip file or a directory
    #[arg(short, long)]
    pub archive: Option<PathBuf>,

    /// Restrict processing to these projects (names or paths)
    pub projects: Vec<String>,
}
