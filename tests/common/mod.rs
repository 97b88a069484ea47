#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use indicatif::ProgressBar;
use repo_snapshot::config::ToolConfig;
use repo_snapshot::core::{RunOptions, Workspace, WorkspaceIdentity};
use repo_snapshot::error::Result;
use repo_snapshot::system::SyncTool;
use tempfile::TempDir;

static CLOCK: AtomicU64 = AtomicU64::new(1_700_000_000);

/// Run git in `dir` with a fixed identity; panics on failure
pub fn git(dir: &Path, args: &[&str]) -> String {
    let date = format!("{} +0000", CLOCK.fetch_add(60, Ordering::SeqCst));
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .env("GIT_AUTHOR_NAME", "Dev One")
        .env("GIT_AUTHOR_EMAIL", "dev@example.com")
        .env("GIT_COMMITTER_NAME", "Dev One")
        .env("GIT_COMMITTER_EMAIL", "dev@example.com")
        .env("GIT_AUTHOR_DATE", &date)
        .env("GIT_COMMITTER_DATE", &date)
        .output()
        .expect("git runs");
    assert!(
        output.status.success(),
        "git {:?} failed in {}: {}",
        args,
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Write `file` and commit it; returns the new commit id
pub fn commit(dir: &Path, file: &str, content: &str, message: &str) -> String {
    let path = dir.join(file);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
    git(dir, &["add", file]);
    git(dir, &["commit", "-q", "-m", message]);
    git(dir, &["rev-parse", "HEAD"])
}

pub fn rev(dir: &Path, expr: &str) -> String {
    git(dir, &["rev-parse", expr])
}

/// Upstream repository with one commit on `master`
pub fn upstream_repo(root: &Path, name: &str) -> PathBuf {
    let dir = root.join("upstream").join(name);
    std::fs::create_dir_all(&dir).unwrap();
    git(&dir, &["-c", "init.defaultBranch=master", "init", "-q"]);
    commit(&dir, "README", "upstream\n", "initial");
    dir
}

pub fn manifest_xml(projects: &[(&str, &str)]) -> String {
    let mut xml = String::from(
        "<manifest>\n  <remote name=\"origin\" fetch=\"..\" />\n  <default remote=\"origin\" revision=\"master\" />\n",
    );
    for (name, path) in projects {
        xml.push_str(&format!("  <project name=\"{}\" path=\"{}\" />\n", name, path));
    }
    xml.push_str("</manifest>\n");
    xml
}

/// Sync tool that clones upstream repositories the way `repo sync` lays them out
#[derive(Clone)]
pub struct FakeSync {
    pub manifest: String,
    /// (project name, checkout path, upstream url)
    pub projects: Vec<(String, String, PathBuf)>,
    pub identity: WorkspaceIdentity,
}

impl FakeSync {
    pub fn new(projects: &[(&str, &str, &Path)]) -> Self {
        let pairs: Vec<(&str, &str)> = projects.iter().map(|(n, p, _)| (*n, *p)).collect();
        Self {
            manifest: manifest_xml(&pairs),
            projects: projects
                .iter()
                .map(|(n, p, u)| (n.to_string(), p.to_string(), u.to_path_buf()))
                .collect(),
            identity: WorkspaceIdentity::new("https://example.com/manifest.git", "refs/heads/main"),
        }
    }
}

impl SyncTool for FakeSync {
    fn manifest(&self, _root: &Path) -> Result<String> {
        Ok(self.manifest.clone())
    }

    fn identity(&self, _root: &Path) -> Result<WorkspaceIdentity> {
        Ok(self.identity.clone())
    }

    fn init(&self, root: &Path, _identity: &WorkspaceIdentity) -> Result<()> {
        std::fs::create_dir_all(root.join(".repo")).unwrap();
        Ok(())
    }

    fn sync(&self, root: &Path, names: &[String]) -> Result<()> {
        std::fs::create_dir_all(root.join(".repo")).unwrap();
        for (name, path, url) in &self.projects {
            if !names.is_empty() && !names.contains(name) {
                continue;
            }
            let checkout = root.join(path);
            if checkout.exists() {
                git(&checkout, &["fetch", "-q", "origin"]);
                continue;
            }
            std::fs::create_dir_all(checkout.parent().unwrap()).unwrap();
            git(root, &["clone", "-q", url.to_str().unwrap(), path]);
            git(&checkout, &["checkout", "-q", "--detach", "origin/master"]);
            git(&checkout, &["branch", "-q", "-D", "master"]);
        }
        Ok(())
    }
}

/// A synced workspace rooted in its own temp dir
pub struct TestWorkspace {
    pub dir: TempDir,
    pub sync: FakeSync,
}

impl TestWorkspace {
    pub fn synced(sync: &FakeSync) -> Self {
        let ws = Self::empty(sync);
        sync.sync(ws.root(), &[]).unwrap();
        ws
    }

    pub fn empty(sync: &FakeSync) -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            sync: sync.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn project(&self, path: &str) -> PathBuf {
        self.root().join(path)
    }

    pub fn workspace(&self) -> Workspace {
        Workspace::new(self.root(), ToolConfig::default(), Box::new(self.sync.clone()))
    }

    pub fn backup(&self, archive: &Path, opts: &RunOptions) -> Result<repo_snapshot::RunReport> {
        self.workspace().backup(archive, opts, &ProgressBar::hidden())
    }

    pub fn restore(&self, archive: &Path, opts: &RunOptions) -> Result<repo_snapshot::RunReport> {
        self.workspace().restore(archive, opts, &ProgressBar::hidden())
    }
}

pub fn forced() -> RunOptions {
    RunOptions {
        force: true,
        ..RunOptions::default()
    }
}
