use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::{debug, trace};

use crate::error::{Result, SnapshotError, ErrorContext};

/// Blocking wrapper around the `git` binary for one checkout
#[derive(Debug, Clone)]
pub struct Git {
    bin: String,
    dir: PathBuf,
}

impl Git {
    pub fn new<P: AsRef<Path>>(bin: &str, dir: P) -> Self {
        Self {
            bin: bin.to_string(),
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Run a command and return its stdout; a non-zero exit is an error
    pub fn run<S: AsRef<OsStr>>(&self, args: &[S]) -> Result<String> {
        self.run_with_env(args, &[])
    }

    pub fn run_with_env<S: AsRef<OsStr>>(&self, args: &[S], env: &[(&str, &str)]) -> Result<String> {
        let output = self.output(args, env)?;
        if !output.status.success() {
            return Err(self.command_error(args, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run a command and hand back the raw output whatever the exit status
    pub fn try_run<S: AsRef<OsStr>>(&self, args: &[S]) -> Result<Output> {
        self.output(args, &[])
    }

    /// Like `run`, but keeps stdout as bytes (diffs may carry binary payloads)
    pub fn run_bytes<S: AsRef<OsStr>>(&self, args: &[S], accepted: &[i32]) -> Result<Vec<u8>> {
        let output = self.output(args, &[])?;
        let ok = output.status.success()
            || output.status.code().map_or(false, |code| accepted.contains(&code));
        if !ok {
            return Err(self.command_error(args, &output));
        }
        Ok(output.stdout)
    }

    fn output<S: AsRef<OsStr>>(&self, args: &[S], env: &[(&str, &str)]) -> Result<Output> {
        let command_line = self.command_line(args);
        debug!(dir = %self.dir.display(), "{}", command_line);

        let mut cmd = Command::new(&self.bin);
        cmd.current_dir(&self.dir).args(args);
        for (key, value) in env {
            cmd.env(key, value);
        }
        let output = cmd
            .output()
            .with_io_context(|| format!("running '{}' in {}", command_line, self.dir.display()))?;

        trace!(status = ?output.status.code(), stdout_len = output.stdout.len(), "{}", command_line);
        Ok(output)
    }

    fn command_line<S: AsRef<OsStr>>(&self, args: &[S]) -> String {
        let mut parts = vec![self.bin.clone()];
        parts.extend(args.iter().map(|a| a.as_ref().to_string_lossy().into_owned()));
        parts.join(" ")
    }

    fn command_error<S: AsRef<OsStr>>(&self, args: &[S], output: &Output) -> SnapshotError {
        SnapshotError::Command {
            command: self.command_line(args),
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }

    // Queries

    pub fn rev_parse(&self, expr: &str) -> Result<String> {
        Ok(self.run(&["rev-parse", "--verify", "--quiet", expr])?.trim().to_string())
    }

    /// Resolve `expr` to a commit id, `None` when it names nothing
    pub fn resolve_commit(&self, expr: &str) -> Result<Option<String>> {
        let revspec = format!("{}^{{commit}}", expr);
        let output = self.try_run(&["rev-parse", "--verify", "--quiet", revspec.as_str()])?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
        } else {
            Ok(None)
        }
    }

    pub fn has_commit(&self, id: &str) -> Result<bool> {
        let revspec = format!("{}^{{commit}}", id);
        Ok(self.try_run(&["cat-file", "-e", revspec.as_str()])?.status.success())
    }

    /// Branch name HEAD points at, `None` when detached
    pub fn symbolic_head(&self) -> Result<Option<String>> {
        let output = self.try_run(&["symbolic-ref", "--quiet", "--short", "HEAD"])?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
        } else {
            Ok(None)
        }
    }

    /// `(short name, object id, peeled id)` for every ref under `prefix`
    pub fn for_each_ref(&self, prefix: &str) -> Result<Vec<(String, String, Option<String>)>> {
        let out = self.run(&[
            "for-each-ref",
            "--format=%(refname)%00%(objectname)%00%(*objectname)",
            prefix,
        ])?;

        let strip = format!("{}/", prefix.trim_end_matches('/'));
        Ok(out
            .lines()
            .filter_map(|line| {
                let mut fields = line.split('\0');
                let name = fields.next()?.strip_prefix(strip.as_str())?.to_string();
                let id = fields.next()?.to_string();
                let peeled = fields.next().filter(|p| !p.is_empty()).map(str::to_string);
                Some((name, id, peeled))
            })
            .collect())
    }

    /// `(name, url)` for each configured remote
    pub fn remotes(&self) -> Result<Vec<(String, String)>> {
        let output = self.try_run(&["config", "--get-regexp", r"^remote\..*\.url$"])?;
        // exit 1 means no remote is configured
        if !output.status.success() && output.status.code() != Some(1) {
            return Err(self.command_error(&["config", "--get-regexp"], &output));
        }
        Ok(parse_remote_config(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Full ancestry of `tip`, children before parents
    pub fn ancestry(&self, tip: &str) -> Result<Vec<String>> {
        Ok(self
            .run(&["rev-list", "--topo-order", tip])?
            .lines()
            .map(str::to_string)
            .collect())
    }

    pub fn status_porcelain(&self) -> Result<String> {
        self.run(&["status", "--porcelain"])
    }

    pub fn untracked_files(&self) -> Result<Vec<String>> {
        Ok(self
            .run(&["ls-files", "--others", "--exclude-standard", "-z"])?
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub fn branch_exists(&self, name: &str) -> Result<bool> {
        let full = format!("refs/heads/{}", name);
        Ok(self
            .try_run(&["show-ref", "--verify", "--quiet", full.as_str()])?
            .status
            .success())
    }

    /// `(name, email, raw date)` of a commit's author
    pub fn author_of(&self, rev: &str) -> Result<(String, String, String)> {
        let out = self.run(&["log", "-1", "--format=%an%x00%ae%x00%ad", "--date=raw", rev])?;
        let mut fields = out.trim_end_matches('\n').split('\0');
        let name = fields.next().unwrap_or_default().to_string();
        let email = fields.next().unwrap_or_default().to_string();
        let date = fields.next().unwrap_or_default().to_string();
        Ok((name, email, date))
    }
}

fn parse_remote_config(out: &str) -> Vec<(String, String)> {
    out.lines()
        .filter_map(|line| {
            let (key, url) = line.split_once(' ')?;
            let name = key.strip_prefix("remote.")?.strip_suffix(".url")?;
            Some((name.to_string(), url.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_config_lines_are_split_into_name_and_url() {
        let out = "remote.origin.url https://example.com/a.git\nremote.my.fork.url git@host:b.git\n";
        let remotes = parse_remote_config(out);
        assert_eq!(
            remotes,
            vec![
                ("origin".to_string(), "https://example.com/a.git".to_string()),
                ("my.fork".to_string(), "git@host:b.git".to_string()),
            ]
        );
    }

    #[test]
    fn malformed_remote_lines_are_skipped() {
        assert!(parse_remote_config("core.bare false\n").is_empty());
    }
}
