use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::{tempdir, TempDir};

fn bin(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("repo-snapshot").unwrap();
    cmd.env("HOME", home).env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git").current_dir(dir).args(args).status().unwrap();
    assert!(status.success(), "git {:?} failed", args);
}

/// Workspace with no projects, driven by a stub `repo` script
fn workspace() -> TempDir {
    let tmp = tempdir().unwrap();
    let root = tmp.path();

    let manifests = root.join(".repo/manifests");
    fs::create_dir_all(&manifests).unwrap();
    git(&manifests, &["init", "-q"]);
    git(&manifests, &["config", "remote.origin.url", "https://example.com/manifest.git"]);
    git(&manifests, &["config", "branch.default.merge", "refs/heads/main"]);

    fs::write(
        root.join("manifest.xml"),
        "<manifest>\n  <remote name=\"origin\" fetch=\"..\" />\n  <default remote=\"origin\" revision=\"master\" />\n</manifest>\n",
    )
    .unwrap();

    let script = root.join("fake-repo");
    fs::write(
        &script,
        format!(
            "#!/bin/sh\ncase \"$1\" in\n  manifest) cat '{}' ;;\n  *) exit 0 ;;\nesac\n",
            root.join("manifest.xml").display()
        ),
    )
    .unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fs::write(
        root.join(".repo-snapshot.toml"),
        format!("[tools]\nrepo = '{}'\n\n[ui]\nprogress_bars = false\n", script.display()),
    )
    .unwrap();
    tmp
}

#[test]
fn help_lists_subcommands() {
    let home = tempdir().unwrap();
    bin(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("backup"))
        .stdout(predicate::str::contains("restore"));
}

#[test]
fn backup_refuses_to_overwrite_without_force() {
    let home = tempdir().unwrap();
    let ws = workspace();
    let archive = ws.path().join("out.zip");

    bin(home.path())
        .arg("-w")
        .arg(ws.path())
        .args(["backup", "-a"])
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("Captured 0 project(s)"));
    assert!(archive.is_file());

    bin(home.path())
        .arg("-w")
        .arg(ws.path())
        .args(["backup", "-a"])
        .arg(&archive)
        .assert()
        .failure()
        .stdout(predicate::str::contains("already exists"));

    bin(home.path())
        .arg("-w")
        .arg(ws.path())
        .args(["backup", "--force", "-a"])
        .arg(&archive)
        .assert()
        .success();
}

#[test]
fn unknown_project_is_reported() {
    let home = tempdir().unwrap();
    let ws = workspace();

    bin(home.path())
        .current_dir(ws.path())
        .args(["backup", "-a", "out", "no/such/project"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("not in the manifest"));
    assert!(!ws.path().join("out").exists());
}

#[test]
fn restore_from_missing_archive_fails() {
    let home = tempdir().unwrap();
    let ws = workspace();

    bin(home.path())
        .arg("-w")
        .arg(ws.path())
        .args(["restore", "--no-sync", "-a"])
        .arg(ws.path().join("missing.zip"))
        .assert()
        .failure()
        .stdout(predicate::str::contains("not found"));
}

#[test]
fn backup_then_restore_without_projects() {
    let home = tempdir().unwrap();
    let ws = workspace();
    let archive = ws.path().join("snap");

    bin(home.path())
        .arg("-w")
        .arg(ws.path())
        .args(["backup", "-a"])
        .arg(&archive)
        .assert()
        .success();
    assert!(archive.join("config").is_file());

    bin(home.path())
        .arg("-w")
        .arg(ws.path())
        .args(["-v", "restore", "-a"])
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("Restored 0 project(s)"));
}
