use std::fs;
use std::path::{Path, PathBuf};
use serde::Deserialize;
use tracing::warn;

use crate::error::{Result, SnapshotError, ErrorContext};

/// Name of the per-workspace settings file, looked up at the workspace root
pub const WORKSPACE_CONFIG_FILE: &str = ".repo-snapshot.toml";

/// Main tool configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ToolConfig {
    pub tools: ToolsConfig,
    pub archive: ArchiveConfig,
    pub git: GitConfig,
    pub ui: UiConfig,
}

/// External binaries driven by the tool
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Version-control binary
    pub git: String,
    /// Manifest-driven sync tool binary
    pub repo: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Archive file used when `--archive` is not given
    pub default_name: String,
}

/// Identity used while replaying patches, before each commit is rewritten
/// with its author as committer
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub committer_name: String,
    pub committer_email: String,
}

/// UI and display configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Whether to show colored output
    pub colored: bool,
    /// Whether to show progress bars
    pub progress_bars: bool,
    /// Log level used when no `-v` flag is given (error, warn, info, debug, trace)
    pub log_level: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            git: "git".to_string(),
            repo: "repo".to_string(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            default_name: "repo-snapshot.zip".to_string(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            committer_name: "repo-snapshot".to_string(),
            committer_email: "repo-snapshot@localhost".to_string(),
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            colored: std::env::var("NO_COLOR").is_err(),
            progress_bars: true,
            log_level: "warn".to_string(),
        }
    }
}

impl ToolConfig {
    /// Get global configuration file path
    pub fn global_config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| SnapshotError::Configuration {
                message: "HOME environment variable not set".to_string(),
                path: None,
            })?;
        Ok(Path::new(&home).join(".config").join("repo-snapshot").join("config.toml"))
    }

    /// Merge workspace config over global config
    pub fn merged_config<P: AsRef<Path>>(workspace_root: P) -> Result<Self> {
        let global = Self::global_config_path().ok();
        Self::merge_files(global.as_deref(), &workspace_root.as_ref().join(WORKSPACE_CONFIG_FILE))
    }

    /// Workspace keys win over global ones, section by section; keys neither
    /// file sets keep their defaults
    pub fn merge_files(global: Option<&Path>, workspace: &Path) -> Result<Self> {
        // An unreadable workspace file is a hard error; a broken global one is not
        let mut table = match global.map(read_table) {
            Some(Ok(Some(table))) => table,
            Some(Err(e)) => {
                warn!(error = %e, "ignoring global configuration");
                toml::Table::new()
            }
            _ => toml::Table::new(),
        };
        if let Some(overlay) = read_table(workspace)? {
            merge_tables(&mut table, overlay);
        }

        toml::Value::Table(table)
            .try_into()
            .map_err(|e| SnapshotError::Configuration {
                message: format!("Invalid settings: {}", e),
                path: Some(workspace.to_path_buf()),
            })
    }
}

fn read_table(path: &Path) -> Result<Option<toml::Table>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_io_context(|| format!("reading config file {}", path.display()))?;
    content
        .parse::<toml::Table>()
        .map(Some)
        .map_err(|e| SnapshotError::Configuration {
            message: format!("Invalid TOML: {}", e),
            path: Some(path.to_path_buf()),
        })
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(section)) => {
                merge_tables(existing, section)
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_files_yield_defaults() {
        let tmp = tempdir().unwrap();
        let config = ToolConfig::merge_files(
            Some(&tmp.path().join("absent.toml")),
            &tmp.path().join(WORKSPACE_CONFIG_FILE),
        )
        .unwrap();
        assert_eq!(config.tools.git, "git");
        assert_eq!(config.tools.repo, "repo");
        assert_eq!(config.archive.default_name, "repo-snapshot.zip");
        assert_eq!(config.ui.log_level, "warn");
    }

    #[test]
    fn workspace_keys_override_global_keys_only() {
        let tmp = tempdir().unwrap();
        let global = tmp.path().join("global.toml");
        fs::write(
            &global,
            "[tools]\ngit = \"/opt/git\"\nrepo = \"/opt/repo\"\n\n[ui]\nlog_level = \"debug\"\n",
        )
        .unwrap();
        let workspace = tmp.path().join(WORKSPACE_CONFIG_FILE);
        fs::write(&workspace, "[tools]\nrepo = \"./repo\"\n\n[archive]\ndefault_name = \"ws.zip\"\n").unwrap();

        let config = ToolConfig::merge_files(Some(&global), &workspace).unwrap();
        assert_eq!(config.tools.git, "/opt/git");
        assert_eq!(config.tools.repo, "./repo");
        assert_eq!(config.ui.log_level, "debug");
        assert!(config.ui.progress_bars);
        assert_eq!(config.archive.default_name, "ws.zip");
    }

    #[test]
    fn invalid_workspace_toml_is_a_configuration_error() {
        let tmp = tempdir().unwrap();
        let workspace = tmp.path().join(WORKSPACE_CONFIG_FILE);
        fs::write(&workspace, "[tools\n").unwrap();

        let err = ToolConfig::merge_files(None, &workspace).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn invalid_global_toml_is_ignored() {
        let tmp = tempdir().unwrap();
        let global = tmp.path().join("global.toml");
        fs::write(&global, "[ui\n").unwrap();

        let config = ToolConfig::merge_files(Some(&global), &tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.ui.log_level, "warn");
    }
}
