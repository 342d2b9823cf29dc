#![allow(missing_docs)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

fn evolve_cmd(root: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("evolve");
    cmd.arg("--repo").arg(root).arg("--plain").env("EVOLVE_LOG", "off");
    cmd
}

fn setup_repo() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    evolve_cmd(dir.path()).arg("init").assert().success();
    dir
}

fn commit(root: &Path, message: &str, write: &str) {
    evolve_cmd(root)
        .args(["commit", "-u", "tester", "-m", message, "--write", write])
        .assert()
        .success();
}

fn json(root: &Path, args: &[&str]) -> Value {
    let output = evolve_cmd(root)
        .args(["--format", "json"])
        .args(args)
        .assert()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("valid json")
}

fn stderr_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn init_creates_the_state_directory() {
    let dir = setup_repo();
    assert!(dir.path().join(".evolve").is_dir());
    evolve_cmd(dir.path()).arg("init").assert().code(255);
}

#[test]
fn log_lists_changesets_newest_first() {
    let dir = setup_repo();
    commit(dir.path(), "base", "a=0");
    commit(dir.path(), "second change", "a=1");

    let log = json(dir.path(), &["log"]);
    let entries = log.as_array().expect("array");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["summary"], "second change");
    assert_eq!(entries[0]["rev"], 1);
    assert_eq!(entries[0]["working"], true);
    assert_eq!(entries[0]["phase"], "draft");
    assert_eq!(entries[1]["summary"], "base");
    assert_eq!(entries[0]["parents"][0], entries[1]["node"]);
}

#[test]
fn amend_warns_and_evolve_stabilizes() {
    let dir = setup_repo();
    commit(dir.path(), "base", "a=0");
    commit(dir.path(), "c1", "a=1");
    commit(dir.path(), "c2", "b=1");
    evolve_cmd(dir.path()).args(["update", "1"]).assert().success();

    let output = evolve_cmd(dir.path())
        .args(["amend", "--write", "a=2"])
        .assert()
        .success()
        .get_output()
        .clone();
    assert!(stderr_of(&output).contains("1 new unstable changesets"));

    let troubles = json(dir.path(), &["troubles"]);
    assert_eq!(troubles.as_array().unwrap().len(), 1);
    assert_eq!(troubles[0]["kinds"][0], "unstable");

    let report = json(dir.path(), &["evolve"]);
    assert_eq!(report["status"], "ok");
    assert_eq!(report["fixes"].as_array().unwrap().len(), 1);

    let troubles = json(dir.path(), &["troubles"]);
    assert!(troubles.as_array().unwrap().is_empty());
    let log = json(dir.path(), &["log"]);
    assert_eq!(log.as_array().unwrap().len(), 3);
}

#[test]
fn evolve_without_troubles_exits_one() {
    let dir = setup_repo();
    commit(dir.path(), "base", "a=0");
    evolve_cmd(dir.path()).arg("evolve").assert().code(1);
    evolve_cmd(dir.path()).args(["evolve", "--all"]).assert().code(1);
}

#[test]
fn prune_hides_the_changeset_and_verify_passes() {
    let dir = setup_repo();
    commit(dir.path(), "base", "a=0");
    commit(dir.path(), "doomed", "a=1");

    let stdout = evolve_cmd(dir.path())
        .args(["prune", "."])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert!(String::from_utf8_lossy(&stdout).contains("1 changesets pruned"));

    assert_eq!(json(dir.path(), &["log"]).as_array().unwrap().len(), 1);
    assert_eq!(
        json(dir.path(), &["log", "--hidden"]).as_array().unwrap().len(),
        2
    );

    let verify = json(dir.path(), &["verify"]);
    assert_eq!(verify["success"], true);
    assert_eq!(verify["counts"]["markers"], 1);
    evolve_cmd(dir.path()).arg("verify").assert().success();
}

#[test]
fn successors_follow_an_amend() {
    let dir = setup_repo();
    commit(dir.path(), "base", "a=0");
    evolve_cmd(dir.path())
        .args(["amend", "-m", "base, reworded"])
        .assert()
        .success();
    let log = json(dir.path(), &["log", "--hidden"]);
    let new = log[0]["node"].as_str().unwrap().to_string();
    let old = log[1]["node"].as_str().unwrap().to_string();

    let succs = json(dir.path(), &["successors", &old]);
    assert_eq!(succs[0], Value::String(new.clone()));
    let sets = json(dir.path(), &["successors", "--sets", &old]);
    assert_eq!(sets[0][0], Value::String(new.clone()));
    let precs = json(dir.path(), &["precursors", &new]);
    assert_eq!(precs[0], Value::String(old));
}

#[test]
fn stats_report_counts() {
    let dir = setup_repo();
    commit(dir.path(), "base", "a=0");
    commit(dir.path(), "c1", "a=1");
    evolve_cmd(dir.path())
        .args(["phase", "--public", "0"])
        .assert()
        .success();

    let stats = json(dir.path(), &["stats"]);
    assert_eq!(stats["changesets"]["total"], 2);
    assert_eq!(stats["changesets"]["public"], 1);
    assert_eq!(stats["changesets"]["draft"], 1);
    assert!(stats["filesystem"]["obsstore_size_bytes"].is_number());
}

#[test]
fn phase_regression_needs_force() {
    let dir = setup_repo();
    commit(dir.path(), "base", "a=0");
    evolve_cmd(dir.path())
        .args(["phase", "--public", "."])
        .assert()
        .success();
    evolve_cmd(dir.path())
        .args(["phase", "--draft", "."])
        .assert()
        .code(1);
    evolve_cmd(dir.path())
        .args(["phase", "--draft", "--force", "."])
        .assert()
        .success();
}

#[test]
fn push_refuses_troubled_history_with_a_hint() {
    let dir = setup_repo();
    commit(dir.path(), "base", "a=0");
    commit(dir.path(), "c1", "a=1");
    commit(dir.path(), "c2", "b=1");
    evolve_cmd(dir.path()).args(["prune", "1"]).assert().success();

    let output = evolve_cmd(dir.path())
        .arg("push")
        .assert()
        .code(255)
        .get_output()
        .clone();
    let stderr = stderr_of(&output);
    assert!(stderr.contains("abort:"));
    assert!(stderr.contains("--force"));

    evolve_cmd(dir.path())
        .args(["push", "--force"])
        .assert()
        .success();
}

#[test]
fn unknown_revision_aborts() {
    let dir = setup_repo();
    commit(dir.path(), "base", "a=0");
    let output = evolve_cmd(dir.path())
        .args(["update", "nope"])
        .assert()
        .code(255)
        .get_output()
        .clone();
    assert!(stderr_of(&output).contains("unknown revision 'nope'"));
}

#[test]
fn commands_outside_a_repository_abort() {
    let dir = TempDir::new().expect("tempdir");
    evolve_cmd(dir.path()).arg("log").assert().code(255);
}

#[test]
fn commit_dates_are_parsed() {
    let dir = setup_repo();
    evolve_cmd(dir.path())
        .args([
            "commit",
            "-u",
            "tester",
            "-m",
            "dated",
            "-d",
            "1970-01-01T00:01:00Z",
            "--write",
            "a=0",
        ])
        .assert()
        .success();
    evolve_cmd(dir.path())
        .args(["amend", "--date", "120 -3600", "--write", "a=1"])
        .assert()
        .success();
    let output = evolve_cmd(dir.path())
        .args(["amend", "--date", "yesterday"])
        .assert()
        .code(255)
        .get_output()
        .clone();
    assert!(stderr_of(&output).contains("bad date 'yesterday'"));
}
