use std::collections::BTreeMap;

use crate::core::manifest::Project;
use crate::error::{Result, SnapshotError};
use crate::system::Git;

/// Where a commit can be recovered from after a fresh sync
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum RecoveryPoint {
    RemoteBranch(String),
    Tag(String),
}

impl RecoveryPoint {
    pub fn name(&self) -> &str {
        match self {
            RecoveryPoint::RemoteBranch(name) | RecoveryPoint::Tag(name) => name,
        }
    }
}

/// Point-in-time view of one checkout, queried once per capture or restore
#[derive(Debug, Clone, Default)]
pub struct ProjectState {
    pub head: String,
    /// Branch HEAD is attached to, `None` when detached
    pub head_branch: Option<String>,
    /// Commit of the manifest revision, when it resolves locally
    pub baseline: Option<String>,
    pub local_branches: BTreeMap<String, String>,
    pub remote_branches: BTreeMap<String, String>,
    /// Tag name to the commit it dereferences to
    pub tags: BTreeMap<String, String>,
    pub remotes: BTreeMap<String, String>,
}

impl ProjectState {
    pub fn query(git: &Git, project: &Project) -> Result<Self> {
        let head = git
            .resolve_commit("HEAD")?
            .ok_or_else(|| SnapshotError::structural(&project.path, "HEAD does not point at a commit"))?;
        let head_branch = git.symbolic_head()?;
        let baseline = git.resolve_commit(&project.upstream)?;

        let remotes: BTreeMap<String, String> = git.remotes()?.into_iter().collect();

        let local_branches = git
            .for_each_ref("refs/heads")?
            .into_iter()
            .map(|(name, id, _)| (name, id))
            .collect();

        // Only branches of configured remotes can be fetched again; skip symbolic */HEAD
        let remote_branches = git
            .for_each_ref("refs/remotes")?
            .into_iter()
            .filter(|(name, _, _)| {
                !name.ends_with("/HEAD")
                    && name
                        .split_once('/')
                        .map_or(false, |(remote, _)| remotes.contains_key(remote))
            })
            .map(|(name, id, _)| (name, id))
            .collect();

        let tags = git
            .for_each_ref("refs/tags")?
            .into_iter()
            .map(|(name, id, peeled)| (name, peeled.unwrap_or(id)))
            .collect();

        Ok(Self {
            head,
            head_branch,
            baseline,
            local_branches,
            remote_branches,
            tags,
            remotes,
        })
    }

    pub fn is_detached(&self) -> bool {
        self.head_branch.is_none()
    }

    /// Commit id to candidate recovery points, each list in preference order:
    /// the project's own upstream branch, other remote branches, then tags,
    /// each group by name
    pub fn recovery_points(&self, upstream: &str) -> BTreeMap<String, Vec<RecoveryPoint>> {
        let mut points: BTreeMap<String, Vec<RecoveryPoint>> = BTreeMap::new();
        for (name, id) in &self.remote_branches {
            points
                .entry(id.clone())
                .or_default()
                .push(RecoveryPoint::RemoteBranch(name.clone()));
        }
        for (name, id) in &self.tags {
            points
                .entry(id.clone())
                .or_default()
                .push(RecoveryPoint::Tag(name.clone()));
        }
        for candidates in points.values_mut() {
            candidates.sort_by_key(|point| {
                let own = matches!(point, RecoveryPoint::RemoteBranch(name) if name == upstream);
                (!own, point.clone())
            });
        }
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ProjectState {
        let mut state = ProjectState::default();
        state.remote_branches.insert("origin/master".into(), "c1".into());
        state.remote_branches.insert("origin/dev".into(), "c1".into());
        state.remote_branches.insert("aosp/x".into(), "c2".into());
        state.tags.insert("v1".into(), "c1".into());
        state.tags.insert("a-tag".into(), "c3".into());
        state
    }

    #[test]
    fn own_upstream_wins_ties() {
        let points = state().recovery_points("origin/master");
        assert_eq!(
            points["c1"],
            vec![
                RecoveryPoint::RemoteBranch("origin/master".into()),
                RecoveryPoint::RemoteBranch("origin/dev".into()),
                RecoveryPoint::Tag("v1".into()),
            ]
        );
    }

    #[test]
    fn ties_fall_back_to_name_order_with_branches_before_tags() {
        let points = state().recovery_points("aosp/x");
        assert_eq!(points["c1"][0], RecoveryPoint::RemoteBranch("origin/dev".into()));
        assert_eq!(points["c1"][2], RecoveryPoint::Tag("v1".into()));
        assert_eq!(points["c3"], vec![RecoveryPoint::Tag("a-tag".into())]);
    }
}
