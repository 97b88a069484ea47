pub mod git;
pub mod sync;

pub use git::Git;
pub use sync::{RepoTool, SyncTool, REPO_DIR};
