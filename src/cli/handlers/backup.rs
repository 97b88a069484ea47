use crate::cli::commands::RunArgs;
use crate::cli::handlers::archive_path;
use crate::cli::ui::{create_progress_bar, print_info, print_report};
use crate::core::{RunOptions, Workspace};
use crate::error::Result;

/// Handle `backup`
pub fn handle_backup(workspace: &Workspace, args: &RunArgs) -> Result<()> {
    let archive = archive_path(args.archive.as_deref(), &workspace.config);
    let opts = RunOptions {
        force: args.force,
        projects: args.projects.clone(),
        skip_sync: false,
    };

    print_info(&format!("Backing up {} to {}", workspace.root.display(), archive.display()));
    let progress = create_progress_bar(workspace.config.ui.progress_bars);
    let result = workspace.backup(&archive, &opts, &progress);
    progress.finish_and_clear();

    print_report("Captured", &archive.display(), &result?);
    Ok(())
}
