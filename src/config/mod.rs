pub mod settings;

pub use settings::{ArchiveConfig, GitConfig, ToolConfig, ToolsConfig, UiConfig, WORKSPACE_CONFIG_FILE};
