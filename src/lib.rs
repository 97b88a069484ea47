// Core modules
pub mod error;
pub mod config;
pub mod core;
pub mod system;

// Command-line surface
pub mod cli;

// Re-exports for convenience
pub use error::{SnapshotError, Result};
pub use config::ToolConfig;
pub use core::{Workspace, RunOptions, RunReport, Store, open_store, OpenMode};
