use std::path::Path;
use std::process::Command;

use tracing::{debug, info};

use crate::core::workspace::WorkspaceIdentity;
use crate::error::{Result, SnapshotError, ErrorContext};
use crate::system::git::Git;

/// Directory the sync tool keeps its own state in, at the workspace root
pub const REPO_DIR: &str = ".repo";

/// Manifest-driven multi-repository sync tool
pub trait SyncTool {
    /// Fully expanded manifest XML for the workspace
    fn manifest(&self, root: &Path) -> Result<String>;

    /// Upstream URL and tracked ref of the manifest repository
    fn identity(&self, root: &Path) -> Result<WorkspaceIdentity>;

    /// Create a new workspace tracking `identity`
    fn init(&self, root: &Path, identity: &WorkspaceIdentity) -> Result<()>;

    /// Network sync of `projects` (all projects when empty)
    fn sync(&self, root: &Path, projects: &[String]) -> Result<()>;
}

/// `SyncTool` backed by the `repo` launcher
pub struct RepoTool {
    bin: String,
    git_bin: String,
}

impl RepoTool {
    pub fn new(bin: &str, git_bin: &str) -> Self {
        Self {
            bin: bin.to_string(),
            git_bin: git_bin.to_string(),
        }
    }

    fn run(&self, root: &Path, args: &[&str]) -> Result<String> {
        let command_line = format!("{} {}", self.bin, args.join(" "));
        debug!(dir = %root.display(), "{}", command_line);

        let output = Command::new(&self.bin)
            .current_dir(root)
            .args(args)
            .output()
            .with_io_context(|| format!("running '{}' in {}", command_line, root.display()))?;

        if !output.status.success() {
            return Err(SnapshotError::Command {
                command: command_line,
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl SyncTool for RepoTool {
    fn manifest(&self, root: &Path) -> Result<String> {
        self.run(root, &["manifest"])
    }

    fn identity(&self, root: &Path) -> Result<WorkspaceIdentity> {
        let manifests = Git::new(&self.git_bin, root.join(REPO_DIR).join("manifests"));
        let url = manifests.run(&["config", "--get", "remote.origin.url"])?;
        let reference = manifests.run(&["config", "--get", "branch.default.merge"])?;
        Ok(WorkspaceIdentity::new(url.trim(), reference.trim()))
    }

    fn init(&self, root: &Path, identity: &WorkspaceIdentity) -> Result<()> {
        info!(url = %identity.url, reference = %identity.reference, "initializing workspace");
        std::fs::create_dir_all(root)
            .with_io_context(|| format!("creating workspace root {}", root.display()))?;
        self.run(root, &["init", "-u", &identity.url, "-b", &identity.reference])?;
        Ok(())
    }

    fn sync(&self, root: &Path, projects: &[String]) -> Result<()> {
        let mut args = vec!["sync"];
        args.extend(projects.iter().map(String::as_str));
        self.run(root, &args)?;
        Ok(())
    }
}
