use std::io::Write;

use tracing::{debug, info, warn};

use crate::config::GitConfig;
use crate::core::layout::{self, BaseRecord, RequiredRef};
use crate::core::manifest::Project;
use crate::core::store::{join, Store};
use crate::error::{Result, SnapshotError, ErrorContext};
use crate::system::Git;

/// Steps of a project restore, run strictly in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStep {
    CleanCheck,
    Remotes,
    Prefetch,
    Branches,
    Head,
    WorkingTree,
    Done,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub branches: usize,
    pub patches: usize,
    pub remotes: usize,
    pub has_diff: bool,
}

/// Replays a captured project onto a synced checkout
pub struct ProjectRestorer<'a> {
    git: &'a Git,
    project: &'a Project,
    identity: &'a GitConfig,
    force: bool,
}

impl<'a> ProjectRestorer<'a> {
    pub fn new(git: &'a Git, project: &'a Project, identity: &'a GitConfig, force: bool) -> Self {
        Self {
            git,
            project,
            identity,
            force,
        }
    }

    pub fn restore(&self, store: &dyn Store) -> Result<RestoreSummary> {
        let mut summary = RestoreSummary::default();
        let mut replayed_head: Option<String> = None;
        let mut step = RestoreStep::CleanCheck;

        while step != RestoreStep::Done {
            debug!(project = %self.project.path, ?step, "restore step");
            step = match step {
                RestoreStep::CleanCheck => {
                    self.ensure_clean()?;
                    RestoreStep::Remotes
                }
                RestoreStep::Remotes => {
                    summary.remotes = self.restore_remotes(store)?;
                    RestoreStep::Prefetch
                }
                RestoreStep::Prefetch => {
                    self.prefetch(store)?;
                    RestoreStep::Branches
                }
                RestoreStep::Branches => {
                    replayed_head = self.restore_branches(store, &mut summary)?;
                    RestoreStep::Head
                }
                RestoreStep::Head => {
                    self.restore_head(store, replayed_head.as_deref())?;
                    RestoreStep::WorkingTree
                }
                RestoreStep::WorkingTree => {
                    summary.has_diff = self.apply_diff(store)?;
                    RestoreStep::Done
                }
                RestoreStep::Done => RestoreStep::Done,
            };
        }

        Ok(summary)
    }

    fn ensure_clean(&self) -> Result<()> {
        if self.git.status_porcelain()?.trim().is_empty() {
            return Ok(());
        }
        if !self.force {
            return Err(SnapshotError::precondition(
                Some(&self.project.path),
                "working tree has local modifications",
            ));
        }
        warn!(project = %self.project.path, "discarding local modifications");
        self.git.run(&["reset", "--quiet", "--hard"])?;
        self.git.run(&["clean", "--quiet", "-fd"])?;
        Ok(())
    }

    fn restore_remotes(&self, store: &dyn Store) -> Result<usize> {
        let content = match store.read_string_optional(&self.file(layout::REMOTES))? {
            Some(content) => content,
            None => return Ok(0),
        };

        let existing: std::collections::BTreeMap<String, String> =
            self.git.remotes()?.into_iter().collect();
        let mut restored = 0;
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let (name, url) = line.trim().split_once(' ').ok_or_else(|| SnapshotError::Validation {
                field: layout::REMOTES.to_string(),
                value: line.to_string(),
                reason: "expected '<name> <url>'".to_string(),
            })?;
            let url = url.trim();

            match existing.get(name) {
                Some(current) if current == url => {}
                Some(current) => {
                    if !self.force {
                        return Err(SnapshotError::precondition(
                            Some(&self.project.path),
                            format!("remote '{}' already points at {}", name, current),
                        ));
                    }
                    self.git.run(&["remote", "set-url", name, url])?;
                    restored += 1;
                }
                None => {
                    self.git.run(&["remote", "add", name, url])?;
                    restored += 1;
                }
            }
        }
        Ok(restored)
    }

    /// Best effort: a ref that vanished upstream is reported by the base check later
    fn prefetch(&self, store: &dyn Store) -> Result<()> {
        let content = match store.read_string_optional(&self.file(layout::REMOTE_BRANCHES))? {
            Some(content) => content,
            None => return Ok(()),
        };

        for required in content.lines().filter_map(RequiredRef::parse) {
            let (remote, refspec) = match &required {
                RequiredRef::RemoteBranch { remote, branch } => (
                    remote.clone(),
                    format!("+refs/heads/{}:refs/remotes/{}/{}", branch, remote, branch),
                ),
                RequiredRef::Tag(tag) => (
                    self.project.remote.clone(),
                    format!("+refs/tags/{}:refs/tags/{}", tag, tag),
                ),
            };

            let output = self.git.try_run(&["fetch", "--quiet", remote.as_str(), refspec.as_str()])?;
            if output.status.success() {
                debug!(project = %self.project.path, %required, "fetched");
            } else {
                warn!(
                    project = %self.project.path,
                    %required,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "fetch failed, continuing"
                );
            }
        }
        Ok(())
    }

    /// Captured branch names, relative to the project's `local_branches` dir
    fn branch_names(&self, store: &dyn Store) -> Result<Vec<String>> {
        let root = self.file(layout::LOCAL_BRANCHES);
        let mut names = Vec::new();
        let mut pending = vec![String::new()];
        while let Some(rel) = pending.pop() {
            let entries = store.listdir(&join(&[root.as_str(), rel.as_str()]))?;
            if entries.iter().any(|e| e == layout::BASE) {
                names.push(rel);
            } else {
                pending.extend(entries.iter().map(|e| join(&[rel.as_str(), e.as_str()])));
            }
        }
        names.retain(|n| !n.is_empty());
        names.sort_by_key(|name| (name == layout::DETACHED_BRANCH, name.clone()));
        Ok(names)
    }

    /// Rebuild every captured branch; returns the tip of a replayed detached HEAD
    fn restore_branches(&self, store: &dyn Store, summary: &mut RestoreSummary) -> Result<Option<String>> {
        let mut replayed_head = None;
        for branch in self.branch_names(store)? {
            let dir = layout::branch_dir(&self.project.path, &branch);
            let base = BaseRecord::parse(&String::from_utf8_lossy(&store.read(&join(&[&dir, layout::BASE]))?))?;

            if !self.git.has_commit(&base.commit)? {
                return Err(SnapshotError::structural(
                    &self.project.path,
                    format!(
                        "base {} of branch '{}' is not available (was '{}' rewritten or deleted upstream?)",
                        base.commit, branch, base.name
                    ),
                ));
            }
            self.git.run(&["checkout", "--quiet", "--detach", base.commit.as_str()])?;

            let detached = branch == layout::DETACHED_BRANCH;
            if !detached {
                if self.git.branch_exists(&branch)? {
                    if !self.force {
                        return Err(SnapshotError::precondition(
                            Some(&self.project.path),
                            format!("branch '{}' already exists", branch),
                        ));
                    }
                    self.git.run(&["branch", "--quiet", "-D", branch.as_str()])?;
                }
                self.git.run(&["checkout", "--quiet", "-b", branch.as_str()])?;
            }

            let applied = self.replay(store, &dir)?;
            info!(project = %self.project.path, branch = %branch, base = %base.name, applied, "restored branch");
            summary.branches += 1;
            summary.patches += applied;

            if detached {
                replayed_head = Some(self.git.rev_parse("HEAD")?);
            }
        }
        Ok(replayed_head)
    }

    /// Apply a branch's patch series in filename order, one commit at a time
    fn replay(&self, store: &dyn Store, dir: &str) -> Result<usize> {
        let scratch = tempfile::tempdir()
            .with_io_context(|| "creating patch directory".to_string())?;
        store.extractdir(dir, scratch.path(), false)?;

        let mut patches: Vec<String> = store
            .listdir(dir)?
            .into_iter()
            .filter(|name| name.ends_with(".patch"))
            .collect();
        patches.sort();

        let placeholder = [
            ("GIT_COMMITTER_NAME", self.identity.committer_name.as_str()),
            ("GIT_COMMITTER_EMAIL", self.identity.committer_email.as_str()),
        ];
        for name in &patches {
            let path = scratch.path().join(name).to_string_lossy().into_owned();
            let applied = self.git.run_with_env(
                &[
                    "am",
                    "--quiet",
                    "--keep-cr",
                    "-k",
                    "--empty=keep",
                    "--patch-format=mboxrd",
                    path.as_str(),
                ],
                &placeholder,
            );
            if let Err(e) = applied {
                // aborting records a reflog entry, which needs a committer too
                let _ = self.git.run_with_env(&["am", "--abort"], &placeholder);
                return Err(e);
            }
            self.restore_committer()?;
        }
        Ok(patches.len())
    }

    /// Rewrite HEAD's committer to its author so replayed ids match captured ones
    fn restore_committer(&self) -> Result<()> {
        let (name, email, date) = self.git.author_of("HEAD")?;
        self.git.run_with_env(
            &[
                "commit",
                "--quiet",
                "--amend",
                "--no-edit",
                "--no-verify",
                "--allow-empty",
                "--cleanup=verbatim",
            ],
            &[
                ("GIT_COMMITTER_NAME", name.as_str()),
                ("GIT_COMMITTER_EMAIL", email.as_str()),
                ("GIT_COMMITTER_DATE", date.as_str()),
            ],
        )?;
        Ok(())
    }

    fn restore_head(&self, store: &dyn Store, replayed_head: Option<&str>) -> Result<()> {
        let recorded = store
            .read_string_optional(&self.file(layout::HEAD))?
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let recorded = match recorded {
            Some(recorded) => recorded,
            None => {
                self.git.run(&["checkout", "--quiet", "--detach", self.project.upstream.as_str()])?;
                return Ok(());
            }
        };

        if self.git.branch_exists(&recorded)? {
            self.git.run(&["checkout", "--quiet", recorded.as_str()])?;
        } else if self.git.has_commit(&recorded)? {
            self.git.run(&["checkout", "--quiet", "--detach", recorded.as_str()])?;
        } else if let Some(replayed) = replayed_head {
            warn!(
                project = %self.project.path,
                recorded = %recorded,
                replayed = %replayed,
                "recorded HEAD was not reproduced, using replayed commit"
            );
            self.git.run(&["checkout", "--quiet", "--detach", replayed])?;
        } else {
            return Err(SnapshotError::NotFound {
                resource: format!("HEAD of project '{}'", self.project.path),
                identifier: recorded,
            });
        }
        Ok(())
    }

    fn apply_diff(&self, store: &dyn Store) -> Result<bool> {
        let diff = match store.read_optional(&self.file(layout::DIFF))? {
            Some(diff) => diff,
            None => return Ok(false),
        };

        let mut file = tempfile::NamedTempFile::new()
            .with_io_context(|| "creating diff file".to_string())?;
        file.write_all(&diff)
            .with_io_context(|| format!("writing diff for {}", self.project.path))?;
        file.flush()
            .with_io_context(|| format!("writing diff for {}", self.project.path))?;

        let path = file.path().to_string_lossy().into_owned();
        self.git.run(&["apply", "--binary", "--whitespace=nowarn", path.as_str()])?;
        Ok(true)
    }

    fn file(&self, name: &str) -> String {
        layout::project_file(&self.project.path, name)
    }
}
