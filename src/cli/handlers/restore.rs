use crate::cli::commands::RunArgs;
use crate::cli::handlers::archive_path;
use crate::cli::ui::{create_progress_bar, print_info, print_report, print_warning};
use crate::core::{RunOptions, Workspace};
use crate::error::Result;

/// Handle `restore`
pub fn handle_restore(workspace: &Workspace, args: &RunArgs, no_sync: bool) -> Result<()> {
    let archive = archive_path(args.archive.as_deref(), &workspace.config);
    let opts = RunOptions {
        force: args.force,
        projects: args.projects.clone(),
        skip_sync: no_sync,
    };

    print_info(&format!("Restoring {} into {}", archive.display(), workspace.root.display()));
    if args.force {
        print_warning("--force: conflicting local state will be discarded");
    }
    let progress = create_progress_bar(workspace.config.ui.progress_bars);
    let result = workspace.restore(&archive, &opts, &progress);
    progress.finish_and_clear();

    print_report("Restored", &archive.display(), &result?);
    Ok(())
}
