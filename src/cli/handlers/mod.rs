pub mod backup;
pub mod restore;

pub use backup::*;
pub use restore::*;

use std::path::{Path, PathBuf};

use crate::config::ToolConfig;
use crate::core::Workspace;
use crate::error::Result;
use crate::system::RepoTool;

/// Workspace driven by the configured `repo` and `git` binaries
pub fn open_workspace(root: &Path) -> Result<Workspace> {
    let config = ToolConfig::merged_config(root)?;
    let sync = RepoTool::new(&config.tools.repo, &config.tools.git);
    Ok(Workspace::new(root, config, Box::new(sync)))
}

/// Explicit archive location, or the configured default name in the current directory
pub fn archive_path(explicit: Option<&Path>, config: &ToolConfig) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&config.archive.default_name))
}
