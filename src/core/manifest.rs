//! Manifest model and per-project remote/revision resolution.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::{Result, SnapshotError};

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RemoteDecl {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@fetch", default)]
    pub fetch: Option<String>,
    #[serde(rename = "@revision", default)]
    pub revision: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct DefaultDecl {
    #[serde(rename = "@remote", default)]
    pub remote: Option<String>,
    #[serde(rename = "@revision", default)]
    pub revision: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProjectDecl {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@path", default)]
    pub path: Option<String>,
    #[serde(rename = "@remote", default)]
    pub remote: Option<String>,
    #[serde(rename = "@revision", default)]
    pub revision: Option<String>,
}

/// Parsed manifest; elements the resolver does not consume are ignored
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename = "manifest")]
pub struct Manifest {
    #[serde(rename = "remote", default)]
    pub remotes: Vec<RemoteDecl>,
    #[serde(rename = "default", default)]
    pub default: Option<DefaultDecl>,
    #[serde(rename = "project", default)]
    pub projects: Vec<ProjectDecl>,
}

/// A manifest revision attribute, classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionSpec {
    Branch(String),
    Tag(String),
    Commit(String),
    Name(String),
}

impl RevisionSpec {
    pub fn parse(revision: &str) -> Self {
        if let Some(branch) = revision.strip_prefix("refs/heads/") {
            RevisionSpec::Branch(branch.to_string())
        } else if let Some(tag) = revision.strip_prefix("refs/tags/") {
            RevisionSpec::Tag(tag.to_string())
        } else if is_commit_id(revision) {
            RevisionSpec::Commit(revision.to_string())
        } else {
            RevisionSpec::Name(revision.to_string())
        }
    }

    /// Expression the checkout resolves to find this revision
    pub fn lookup(&self, remote: &str) -> String {
        match self {
            RevisionSpec::Branch(branch) | RevisionSpec::Name(branch) => {
                format!("{}/{}", remote, branch)
            }
            RevisionSpec::Tag(tag) => format!("{}^0", tag),
            RevisionSpec::Commit(id) => id.clone(),
        }
    }
}

impl fmt::Display for RevisionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevisionSpec::Branch(b) => write!(f, "refs/heads/{}", b),
            RevisionSpec::Tag(t) => write!(f, "refs/tags/{}", t),
            RevisionSpec::Commit(id) => write!(f, "{}", id),
            RevisionSpec::Name(n) => write!(f, "{}", n),
        }
    }
}

static COMMIT_ID: OnceLock<Regex> = OnceLock::new();

pub fn is_commit_id(s: &str) -> bool {
    COMMIT_ID
        .get_or_init(|| Regex::new(r"^[0-9a-fA-F]{40}$").expect("valid commit id pattern"))
        .is_match(s)
}

/// A manifest project with its effective remote and revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub path: String,
    pub remote: String,
    pub revision: RevisionSpec,
    /// Lookup expression for the upstream baseline, e.g. `origin/master`
    pub upstream: String,
}

impl Manifest {
    pub fn parse(xml: &str) -> Result<Self> {
        quick_xml::de::from_str(xml).map_err(|e| SnapshotError::Manifest {
            reason: e.to_string(),
        })
    }

    /// Resolve every project; one unresolvable project fails the whole manifest
    pub fn resolve(&self) -> Result<Vec<Project>> {
        let remotes: HashMap<&str, &RemoteDecl> =
            self.remotes.iter().map(|r| (r.name.as_str(), r)).collect();
        let default = self.default.clone().unwrap_or_default();

        self.projects
            .iter()
            .map(|decl| resolve_project(decl, &remotes, &default))
            .collect()
    }
}

fn resolve_project(
    decl: &ProjectDecl,
    remotes: &HashMap<&str, &RemoteDecl>,
    default: &DefaultDecl,
) -> Result<Project> {
    let remote = decl
        .remote
        .clone()
        .or_else(|| default.remote.clone())
        .ok_or_else(|| SnapshotError::Configuration {
            message: format!("no remote for project '{}' and no default remote", decl.name),
            path: None,
        })?;

    let remote_decl = remotes.get(remote.as_str()).ok_or_else(|| SnapshotError::Configuration {
        message: format!("project '{}' uses undeclared remote '{}'", decl.name, remote),
        path: None,
    })?;

    let revision = decl
        .revision
        .clone()
        .or_else(|| remote_decl.revision.clone())
        .or_else(|| default.revision.clone())
        .ok_or_else(|| SnapshotError::Configuration {
            message: format!(
                "no revision for project '{}' (project, remote '{}' and default all omit it)",
                decl.name, remote
            ),
            path: None,
        })?;

    let revision = RevisionSpec::parse(&revision);
    let upstream = revision.lookup(&remote);
    Ok(Project {
        name: decl.name.clone(),
        path: decl.path.clone().unwrap_or_else(|| decl.name.clone()),
        remote,
        revision,
        upstream,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest>
  <notice>ignored</notice>
  <remote name="origin" fetch=".." revision="refs/heads/stable" />
  <remote name="aosp" fetch="https://android.example.com" />
  <default remote="aosp" revision="master" sync-j="4" />
  <project name="platform/core" path="core/lib" remote="origin" />
  <project name="platform/build" path="build" />
  <remote name="late" fetch=".." />
  <project name="tools" revision="refs/tags/v1.2" remote="late">
    <copyfile src="a" dest="b" />
  </project>
  <project name="pinned" path="pinned" revision="0123456789abcdef0123456789abcdef01234567" />
</manifest>
"#;

    #[test]
    fn parses_interleaved_elements() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        assert_eq!(manifest.remotes.len(), 3);
        assert_eq!(manifest.projects.len(), 4);
        assert_eq!(manifest.default.as_ref().unwrap().remote.as_deref(), Some("aosp"));
    }

    #[test]
    fn resolution_follows_precedence() {
        let projects = Manifest::parse(MANIFEST).unwrap().resolve().unwrap();

        // remote revision beats the default
        assert_eq!(projects[0].remote, "origin");
        assert_eq!(projects[0].revision, RevisionSpec::Branch("stable".to_string()));
        assert_eq!(projects[0].upstream, "origin/stable");

        // default remote, default revision
        assert_eq!(projects[1].remote, "aosp");
        assert_eq!(projects[1].upstream, "aosp/master");

        // project attribute wins; path falls back to the name
        assert_eq!(projects[2].path, "tools");
        assert_eq!(projects[2].upstream, "v1.2^0");

        assert_eq!(projects[3].upstream, "0123456789abcdef0123456789abcdef01234567");
    }

    #[test]
    fn missing_revision_everywhere_is_a_configuration_error() {
        let xml = r#"<manifest>
            <remote name="origin" fetch=".." />
            <default remote="origin" />
            <project name="a" />
        </manifest>"#;
        let err = Manifest::parse(xml).unwrap().resolve().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn missing_remote_is_a_configuration_error() {
        let xml = r#"<manifest>
            <remote name="origin" fetch=".." revision="main" />
            <project name="a" />
        </manifest>"#;
        let err = Manifest::parse(xml).unwrap().resolve().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn undeclared_remote_is_a_configuration_error() {
        let xml = r#"<manifest>
            <default remote="nowhere" revision="main" />
            <project name="a" />
        </manifest>"#;
        assert!(Manifest::parse(xml).unwrap().resolve().unwrap_err().is_configuration());
    }

    #[test]
    fn lookup_rewrites_each_revision_form() {
        assert_eq!(RevisionSpec::parse("refs/heads/main").lookup("o"), "o/main");
        assert_eq!(RevisionSpec::parse("refs/tags/v1").lookup("o"), "v1^0");
        assert_eq!(RevisionSpec::parse("main").lookup("o"), "o/main");
        let id = "a".repeat(40);
        assert_eq!(RevisionSpec::parse(&id).lookup("o"), id);
        // 39 characters is a name, not an id
        assert_eq!(RevisionSpec::parse(&"a".repeat(39)).lookup("o"), format!("o/{}", "a".repeat(39)));
    }

    #[test]
    fn commit_ids_are_forty_hex_digits() {
        assert!(is_commit_id("0123456789ABCDEFabcdef0123456789abcdef01"));
        assert!(!is_commit_id("g123456789abcdef0123456789abcdef01234567"));
        assert!(!is_commit_id("master"));
    }
}
