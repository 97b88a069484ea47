pub mod layout;
pub mod manifest;
pub mod restore;
pub mod snapshot;
pub mod state;
pub mod store;
pub mod workspace;

pub use manifest::{Manifest, Project, RevisionSpec};
pub use restore::{ProjectRestorer, RestoreStep, RestoreSummary};
pub use snapshot::{ProjectSnapshotter, ProjectSummary};
pub use state::{ProjectState, RecoveryPoint};
pub use store::{open_store, DirStore, OpenMode, Store, ZipStore};
pub use workspace::{RunOptions, RunReport, Workspace, WorkspaceIdentity};
