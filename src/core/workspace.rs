use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use indicatif::ProgressBar;
use tracing::{debug, info, warn};

use crate::config::ToolConfig;
use crate::core::layout;
use crate::core::manifest::{Manifest, Project};
use crate::core::restore::ProjectRestorer;
use crate::core::snapshot::ProjectSnapshotter;
use crate::core::store::{join, open_store, OpenMode, Store};
use crate::error::{Result, SnapshotError, ErrorContext};
use crate::system::{Git, SyncTool, REPO_DIR};

/// Upstream of the manifest repository a workspace was created from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceIdentity {
    pub url: String,
    pub reference: String,
}

impl WorkspaceIdentity {
    pub fn new(url: &str, reference: &str) -> Self {
        Self {
            url: url.to_string(),
            reference: reference.to_string(),
        }
    }

    /// Parse `key=value` lines; unknown keys are ignored
    pub fn parse(content: &str) -> Result<Self> {
        let mut url = None;
        let mut reference = None;
        for line in content.lines() {
            match line.split_once('=') {
                Some(("url", value)) => url = Some(value.trim().to_string()),
                Some(("ref", value)) => reference = Some(value.trim().to_string()),
                _ => {}
            }
        }
        match (url, reference) {
            (Some(url), Some(reference)) => Ok(Self { url, reference }),
            _ => Err(SnapshotError::Configuration {
                message: "archive config lacks url= or ref=".to_string(),
                path: None,
            }),
        }
    }

    /// Archive `config` file body, stamped with the capture time
    pub fn render(&self) -> String {
        format!(
            "url={}\nref={}\ncreated={}\n",
            self.url,
            self.reference,
            Utc::now().to_rfc3339()
        )
    }
}

impl fmt::Display for WorkspaceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.url, self.reference)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub force: bool,
    /// Project names or paths; empty selects every project
    pub projects: Vec<String>,
    /// Restore onto the existing checkouts without a network sync
    pub skip_sync: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub projects: usize,
    pub branches: usize,
    pub patches: usize,
}

/// Drives backup and restore across the projects of one workspace
pub struct Workspace {
    pub root: PathBuf,
    pub config: ToolConfig,
    sync: Box<dyn SyncTool>,
}

impl Workspace {
    pub fn new<P: AsRef<Path>>(root: P, config: ToolConfig, sync: Box<dyn SyncTool>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            config,
            sync,
        }
    }

    /// Resolve the live manifest; fails before anything is touched
    pub fn load_projects(&self) -> Result<Vec<Project>> {
        let xml = self.sync.manifest(&self.root)?;
        Manifest::parse(&xml)?.resolve()
    }

    /// Path-keyed table of the selected projects; unknown names are an error
    pub fn select<'p>(&self, projects: &'p [Project], names: &[String]) -> Result<BTreeMap<String, &'p Project>> {
        let table: BTreeMap<String, &Project> = projects.iter().map(|p| (p.path.clone(), p)).collect();
        if names.is_empty() {
            return Ok(table);
        }

        let mut selected = BTreeMap::new();
        for name in names {
            let wanted = name.trim_end_matches('/');
            let matches: Vec<&Project> = projects
                .iter()
                .filter(|p| p.name == wanted || p.path == wanted)
                .collect();
            if matches.is_empty() {
                return Err(SnapshotError::Validation {
                    field: "project".to_string(),
                    value: name.clone(),
                    reason: "not in the manifest".to_string(),
                });
            }
            for project in matches {
                selected.insert(project.path.clone(), project);
            }
        }
        Ok(selected)
    }

    fn git(&self, project: &Project) -> Git {
        Git::new(&self.config.tools.git, self.root.join(&project.path))
    }

    pub fn backup(&self, archive: &Path, opts: &RunOptions, progress: &ProgressBar) -> Result<RunReport> {
        let projects = self.load_projects()?;
        let selected = self.select(&projects, &opts.projects)?;
        let identity = self.sync.identity(&self.root)?;

        if archive.exists() {
            if archive.is_dir() && !archive.join(layout::CONFIG).is_file() {
                return Err(SnapshotError::Validation {
                    field: "archive".to_string(),
                    value: archive.display().to_string(),
                    reason: "existing directory is not a snapshot archive".to_string(),
                });
            }
            if !opts.force {
                return Err(SnapshotError::precondition(
                    None,
                    format!("archive {} already exists", archive.display()),
                ));
            }
            warn!(archive = %archive.display(), "replacing existing archive");
            remove_path(archive)?;
        }

        let mut store = open_store(archive, OpenMode::Write)?;
        match self.backup_into(store.as_mut(), &identity, &selected, progress) {
            Ok(report) => {
                store.close()?;
                Ok(report)
            }
            Err(e) => {
                // never leave a partial archive behind
                drop(store);
                if let Err(cleanup) = remove_path(archive) {
                    warn!(error = %cleanup, "could not remove partial archive");
                }
                Err(e)
            }
        }
    }

    fn backup_into(
        &self,
        store: &mut dyn Store,
        identity: &WorkspaceIdentity,
        selected: &BTreeMap<String, &Project>,
        progress: &ProgressBar,
    ) -> Result<RunReport> {
        store.write(layout::CONFIG, identity.render().as_bytes())?;
        self.backup_local_manifests(store)?;

        let mut report = RunReport::default();
        progress.set_length(selected.len() as u64);
        for (path, project) in selected {
            progress.set_message(path.clone());
            let git = self.git(project);
            let summary = ProjectSnapshotter::new(&git, project).capture(store)?;
            if summary.is_empty() {
                debug!(project = %path, "nothing to capture");
            } else {
                info!(project = %path, branches = summary.branches, patches = summary.patches, "captured");
            }
            report.projects += 1;
            report.branches += summary.branches;
            report.patches += summary.patches;
            progress.inc(1);
        }
        Ok(report)
    }

    fn local_manifests_dir(&self) -> PathBuf {
        self.root.join(REPO_DIR).join("local_manifests")
    }

    fn backup_local_manifests(&self, store: &mut dyn Store) -> Result<()> {
        let dir = self.local_manifests_dir();
        if !dir.is_dir() {
            return Ok(());
        }
        let mut entries: Vec<_> = fs::read_dir(&dir)
            .with_io_context(|| format!("reading {}", dir.display()))?
            .collect::<std::io::Result<Vec<_>>>()
            .with_io_context(|| format!("reading {}", dir.display()))?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            if !entry.path().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let data = fs::read(entry.path())
                .with_io_context(|| format!("reading local manifest {}", entry.path().display()))?;
            store.write(&join(&[layout::LOCAL_MANIFESTS, &name]), &data)?;
        }
        Ok(())
    }

    pub fn restore(&self, archive: &Path, opts: &RunOptions, progress: &ProgressBar) -> Result<RunReport> {
        let store = open_store(archive, OpenMode::Read)?;
        let result = self.restore_from(store.as_ref(), opts, progress);
        store.close()?;
        result
    }

    fn restore_from(&self, store: &dyn Store, opts: &RunOptions, progress: &ProgressBar) -> Result<RunReport> {
        let recorded = match store.read_string_optional(layout::CONFIG)? {
            Some(content) => WorkspaceIdentity::parse(&content)?,
            None => {
                return Err(SnapshotError::Configuration {
                    message: "archive has no workspace config".to_string(),
                    path: None,
                })
            }
        };
        self.ensure_workspace(&recorded, opts.force)?;
        self.restore_local_manifests(store, opts.force)?;

        let projects = self.load_projects()?;
        let selected = self.select(&projects, &opts.projects)?;
        // manifest order, not path order
        let ordered: Vec<&Project> = projects
            .iter()
            .filter(|p| selected.contains_key(&p.path))
            .collect();

        if opts.skip_sync {
            debug!("skipping sync");
        } else {
            let names: Vec<String> = if opts.projects.is_empty() {
                Vec::new()
            } else {
                ordered.iter().map(|p| p.name.clone()).collect()
            };
            info!(projects = ordered.len(), "syncing workspace");
            self.sync.sync(&self.root, &names)?;
        }

        let mut report = RunReport::default();
        progress.set_length(ordered.len() as u64);
        for project in ordered {
            progress.set_message(project.path.clone());
            let git = self.git(project);
            let summary = ProjectRestorer::new(&git, project, &self.config.git, opts.force).restore(store)?;
            info!(project = %project.path, branches = summary.branches, patches = summary.patches, "restored");
            report.projects += 1;
            report.branches += summary.branches;
            report.patches += summary.patches;
            progress.inc(1);
        }
        Ok(report)
    }

    /// Initialize the workspace, or check an existing one tracks the same upstream
    fn ensure_workspace(&self, recorded: &WorkspaceIdentity, force: bool) -> Result<()> {
        if !self.root.join(REPO_DIR).is_dir() {
            return self.sync.init(&self.root, recorded);
        }

        let current = self.sync.identity(&self.root)?;
        if current == *recorded {
            return Ok(());
        }
        if !force {
            return Err(SnapshotError::precondition(
                None,
                format!("workspace tracks {} but the archive was taken from {}", current, recorded),
            ));
        }
        warn!(current = %current, recorded = %recorded, "restoring into a workspace with a different upstream");
        Ok(())
    }

    fn restore_local_manifests(&self, store: &dyn Store, force: bool) -> Result<()> {
        let names = store.listdir(layout::LOCAL_MANIFESTS)?;
        if names.is_empty() {
            return Ok(());
        }
        let dir = self.local_manifests_dir();
        fs::create_dir_all(&dir).with_io_context(|| format!("creating {}", dir.display()))?;

        for name in names {
            let data = store.read(&join(&[layout::LOCAL_MANIFESTS, &name]))?;
            let target = dir.join(&name);
            if target.exists() {
                let current = fs::read(&target)
                    .with_io_context(|| format!("reading {}", target.display()))?;
                if current == data {
                    continue;
                }
                if !force {
                    return Err(SnapshotError::precondition(
                        None,
                        format!("local manifest {} differs from the archived one", target.display()),
                    ));
                }
            }
            fs::write(&target, &data).with_io_context(|| format!("writing {}", target.display()))?;
        }
        Ok(())
    }
}

/// Remove a path whether it is a file or a directory tree
fn remove_path(path: &Path) -> Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path).with_io_context(|| format!("removing {}", path.display()))
    } else {
        fs::remove_file(path).with_io_context(|| format!("removing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_parse_ignores_unknown_keys() {
        let identity = WorkspaceIdentity::parse("url=https://h/m.git\nref=refs/heads/main\ncreated=x\n").unwrap();
        assert_eq!(identity, WorkspaceIdentity::new("https://h/m.git", "refs/heads/main"));
    }

    #[test]
    fn identity_render_round_trips() {
        let identity = WorkspaceIdentity::new("u", "r");
        assert_eq!(WorkspaceIdentity::parse(&identity.render()).unwrap(), identity);
    }

    #[test]
    fn identity_without_ref_is_rejected() {
        assert!(WorkspaceIdentity::parse("url=u\n").unwrap_err().is_configuration());
    }
}
