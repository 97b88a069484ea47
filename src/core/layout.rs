//! Names and line formats of the files a snapshot is made of.

use std::fmt;

use crate::core::store::join;
use crate::error::{Result, SnapshotError};

pub const CONFIG: &str = "config";
pub const LOCAL_MANIFESTS: &str = ".local_manifests";
pub const REMOTES: &str = "remotes";
pub const REMOTE_BRANCHES: &str = "remote_branches";
pub const HEAD: &str = "head";
pub const DIFF: &str = "diff";
pub const LOCAL_BRANCHES: &str = "local_branches";
pub const BASE: &str = ".base";

/// Branch directory holding a detached HEAD that is ahead of every branch
pub const DETACHED_BRANCH: &str = "HEAD";

pub fn project_file(project_path: &str, name: &str) -> String {
    join(&[project_path, name])
}

pub fn branch_dir(project_path: &str, branch: &str) -> String {
    join(&[project_path, LOCAL_BRANCHES, branch])
}

/// Contents of a branch's `.base` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseRecord {
    pub name: String,
    pub commit: String,
}

impl BaseRecord {
    pub fn parse(content: &str) -> Result<Self> {
        let line = content.lines().next().unwrap_or_default();
        let (name, commit) = line.trim().rsplit_once(' ').ok_or_else(|| SnapshotError::Validation {
            field: BASE.to_string(),
            value: line.to_string(),
            reason: "expected '<base-name> <base-hash>'".to_string(),
        })?;
        Ok(Self {
            name: name.trim().to_string(),
            commit: commit.to_string(),
        })
    }
}

impl fmt::Display for BaseRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.name, self.commit)
    }
}

/// A ref that must be fetched before a branch's base can be checked out
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequiredRef {
    RemoteBranch { remote: String, branch: String },
    Tag(String),
}

impl RequiredRef {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if let Some(tag) = line.strip_prefix("refs/tags/") {
            return Some(RequiredRef::Tag(tag.to_string()));
        }
        let (remote, branch) = line.split_once('/')?;
        if remote.is_empty() || branch.is_empty() {
            return None;
        }
        Some(RequiredRef::RemoteBranch {
            remote: remote.to_string(),
            branch: branch.to_string(),
        })
    }
}

impl fmt::Display for RequiredRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequiredRef::RemoteBranch { remote, branch } => write!(f, "{}/{}", remote, branch),
            RequiredRef::Tag(tag) => write!(f, "refs/tags/{}", tag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_record_parses_what_it_prints() {
        let record = BaseRecord {
            name: "origin/master".to_string(),
            commit: "a".repeat(40),
        };
        assert_eq!(BaseRecord::parse(&record.to_string()).unwrap(), record);
    }

    #[test]
    fn base_record_rejects_single_token() {
        assert!(BaseRecord::parse("origin/master\n").is_err());
    }

    #[test]
    fn required_refs_keep_branch_slashes() {
        assert_eq!(
            RequiredRef::parse("origin/feature/x\n"),
            Some(RequiredRef::RemoteBranch {
                remote: "origin".to_string(),
                branch: "feature/x".to_string(),
            })
        );
        assert_eq!(RequiredRef::parse("refs/tags/v1"), Some(RequiredRef::Tag("v1".to_string())));
        assert_eq!(RequiredRef::parse("nobranch"), None);
    }
}
