use std::collections::{BTreeMap, BTreeSet};
use std::fs;

use tracing::{debug, info, warn};

use crate::core::layout::{self, BaseRecord, RequiredRef};
use crate::core::manifest::Project;
use crate::core::state::{ProjectState, RecoveryPoint};
use crate::core::store::{join, Store};
use crate::error::{Result, SnapshotError, ErrorContext};
use crate::system::Git;

/// `git diff` flags that keep user config from producing output `git apply` rejects
const APPLYABLE_DIFF: [&str; 7] = [
    "diff",
    "--binary",
    "--no-color",
    "--no-ext-diff",
    "--no-textconv",
    "--src-prefix=a/",
    "--dst-prefix=b/",
];

/// What was written for one project
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectSummary {
    pub branches: usize,
    pub patches: usize,
    pub remotes: usize,
    pub required_refs: usize,
    pub has_diff: bool,
    pub has_head: bool,
}

impl ProjectSummary {
    /// True when nothing at all was written for the project
    pub fn is_empty(&self) -> bool {
        self.branches == 0 && self.remotes == 0 && !self.has_diff && !self.has_head
    }
}

/// Captures the local-only state of one checkout into a store
pub struct ProjectSnapshotter<'a> {
    git: &'a Git,
    project: &'a Project,
}

impl<'a> ProjectSnapshotter<'a> {
    pub fn new(git: &'a Git, project: &'a Project) -> Self {
        Self { git, project }
    }

    pub fn capture(&self, store: &mut dyn Store) -> Result<ProjectSummary> {
        let state = ProjectState::query(self.git, self.project)?;
        let mut summary = ProjectSummary::default();

        let mut branches: Vec<(String, String)> = state
            .local_branches
            .iter()
            .map(|(name, tip)| (name.clone(), tip.clone()))
            .collect();
        if self.head_needs_capture(&state) {
            debug!(project = %self.project.path, head = %state.head, "capturing detached HEAD");
            branches.push((layout::DETACHED_BRANCH.to_string(), state.head.clone()));
        }

        let points = state.recovery_points(&self.project.upstream);
        let mut required = BTreeSet::new();
        for (branch, tip) in &branches {
            let (point, base) = self.find_base(branch, tip, &points)?;
            let patches = self.write_branch(store, branch, point.name(), &base, tip)?;
            info!(
                project = %self.project.path,
                branch = %branch,
                base = %point.name(),
                patches,
                "captured branch"
            );

            summary.branches += 1;
            summary.patches += patches;
            if point.name() != self.project.upstream {
                required.insert(required_ref(&point));
            }
        }

        if !required.is_empty() {
            let lines: String = required.iter().map(|r| format!("{}\n", r)).collect();
            store.write(&self.file(layout::REMOTE_BRANCHES), lines.as_bytes())?;
            summary.required_refs = required.len();
        }

        summary.remotes = self.write_remotes(store, &state)?;
        summary.has_diff = self.write_diff(store)?;
        summary.has_head = self.write_head(store, &state)?;

        Ok(summary)
    }

    /// A detached HEAD is kept only when neither the baseline nor a branch tip
    /// will bring the commit back
    fn head_needs_capture(&self, state: &ProjectState) -> bool {
        state.is_detached()
            && state.baseline.as_deref() != Some(state.head.as_str())
            && !state.local_branches.values().any(|tip| *tip == state.head)
    }

    /// First commit in `tip`'s ancestry that a remote branch or tag points at
    pub fn find_base(
        &self,
        branch: &str,
        tip: &str,
        points: &BTreeMap<String, Vec<RecoveryPoint>>,
    ) -> Result<(RecoveryPoint, String)> {
        for commit in self.git.ancestry(tip)? {
            if let Some(point) = points.get(&commit).and_then(|candidates| candidates.first()) {
                return Ok((point.clone(), commit));
            }
        }
        Err(SnapshotError::structural(
            &self.project.path,
            format!(
                "branch '{}' has no ancestor on any remote branch or tag",
                branch
            ),
        ))
    }

    fn write_branch(
        &self,
        store: &mut dyn Store,
        branch: &str,
        base_name: &str,
        base: &str,
        tip: &str,
    ) -> Result<usize> {
        let dir = layout::branch_dir(&self.project.path, branch);
        let record = BaseRecord {
            name: base_name.to_string(),
            commit: base.to_string(),
        };
        store.write(&join(&[&dir, layout::BASE]), record.to_string().as_bytes())?;

        if base == tip {
            return Ok(0);
        }

        let range = format!("{}..{}", base, tip);
        let merges = self.git.run(&["rev-list", "--count", "--merges", range.as_str()])?;
        if merges.trim() != "0" {
            warn!(
                project = %self.project.path,
                branch = %branch,
                merges = %merges.trim(),
                "merge commits are not part of the patch series"
            );
        }

        let scratch = tempfile::tempdir()
            .with_io_context(|| "creating patch directory".to_string())?;
        let out_dir = scratch.path().to_string_lossy().into_owned();
        self.git.run(&[
            "format-patch",
            "-k",
            "--pretty=mboxrd",
            "--always",
            "--no-signature",
            "--binary",
            "--full-index",
            "--quiet",
            "-o",
            out_dir.as_str(),
            range.as_str(),
        ])?;

        let mut patches: Vec<_> = fs::read_dir(scratch.path())
            .with_io_context(|| format!("reading patch directory {}", out_dir))?
            .collect::<std::io::Result<Vec<_>>>()
            .with_io_context(|| format!("reading patch directory {}", out_dir))?
            .into_iter()
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".patch"))
            .collect();
        patches.sort();

        for name in &patches {
            let data = fs::read(scratch.path().join(name))
                .with_io_context(|| format!("reading patch {}", name))?;
            store.write(&join(&[&dir, name]), &data)?;
        }
        Ok(patches.len())
    }

    fn write_remotes(&self, store: &mut dyn Store, state: &ProjectState) -> Result<usize> {
        let extra: Vec<_> = state
            .remotes
            .iter()
            .filter(|(name, _)| **name != self.project.remote)
            .collect();
        if extra.is_empty() {
            return Ok(0);
        }
        let lines: String = extra
            .iter()
            .map(|(name, url)| format!("{} {}\n", name, url))
            .collect();
        store.write(&self.file(layout::REMOTES), lines.as_bytes())?;
        Ok(extra.len())
    }

    /// Tracked changes against HEAD plus every untracked file as a new-file diff
    fn write_diff(&self, store: &mut dyn Store) -> Result<bool> {
        let mut args: Vec<&str> = APPLYABLE_DIFF.to_vec();
        args.push("HEAD");
        let mut diff = self.git.run_bytes(&args, &[])?;
        for file in self.git.untracked_files()? {
            let mut args: Vec<&str> = APPLYABLE_DIFF.to_vec();
            args.extend(["--no-index", "/dev/null", file.as_str()]);
            // --no-index exits 1 when the files differ, which they always do here
            let added = self.git.run_bytes(&args, &[1])?;
            diff.extend_from_slice(&added);
        }
        if diff.is_empty() {
            return Ok(false);
        }
        store.write(&self.file(layout::DIFF), &diff)?;
        Ok(true)
    }

    fn write_head(&self, store: &mut dyn Store, state: &ProjectState) -> Result<bool> {
        let head = match &state.head_branch {
            Some(branch) => branch.clone(),
            None if state.baseline.as_deref() != Some(state.head.as_str()) => state.head.clone(),
            None => return Ok(false),
        };
        store.write(&self.file(layout::HEAD), format!("{}\n", head).as_bytes())?;
        Ok(true)
    }

    fn file(&self, name: &str) -> String {
        layout::project_file(&self.project.path, name)
    }
}

fn required_ref(point: &RecoveryPoint) -> RequiredRef {
    match point {
        RecoveryPoint::Tag(tag) => RequiredRef::Tag(tag.clone()),
        RecoveryPoint::RemoteBranch(name) => {
            let (remote, branch) = name.split_once('/').unwrap_or((name.as_str(), ""));
            RequiredRef::RemoteBranch {
                remote: remote.to_string(),
                branch: branch.to_string(),
            }
        }
    }
}
