#![cfg(unix)]

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;

mod common;

use common::{fixture_file, parse_json, Sandbox, SORTED_GO_MOD, SORTED_MAIN_GO};

#[test]
fn write_mode_tidies_manifest_and_imports() {
    let sandbox = Sandbox::new("gotidy-write");
    let assert = sandbox
        .cmd()
        .args(["--tidy", "--imports", "--write"])
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
    assert!(stdout.contains("updated 2 file(s)"), "stdout: {stdout}");
    assert_eq!(sandbox.read("go.mod"), SORTED_GO_MOD);
    assert_eq!(sandbox.read("main.go"), SORTED_MAIN_GO);
    assert_eq!(sandbox.read("go.sum"), fixture_file("go.sum"));
    assert_eq!(
        sandbox.read("internal/greet/greet.go"),
        fixture_file("internal/greet/greet.go")
    );
}

#[test]
fn second_write_run_is_a_no_op() {
    let sandbox = Sandbox::new("gotidy-idempotent");
    sandbox
        .cmd()
        .args(["--tidy", "--imports", "--write"])
        .assert()
        .success();

    let assert = sandbox
        .cmd()
        .args(["--tidy", "--imports", "--write", "--json"])
        .assert()
        .success();
    let payload = parse_json(&assert);
    assert_eq!(payload["status"], "ok");
    assert_eq!(payload["message"], "already tidy");
    assert_eq!(payload["details"]["state"], "unchanged");
    assert_eq!(sandbox.read("go.mod"), SORTED_GO_MOD);
    assert_eq!(sandbox.read("main.go"), SORTED_MAIN_GO);
}

#[test]
fn detect_mode_reports_changes_without_touching_files() {
    let sandbox = Sandbox::new("gotidy-detect");
    let assert = sandbox.cmd().args(["--tidy", "--imports"]).assert().code(1);

    let stderr = String::from_utf8_lossy(&assert.get_output().stderr);
    assert!(stderr.contains("detected changes"), "stderr: {stderr}");
    assert!(stderr.contains("go.mod"), "stderr: {stderr}");
    assert_eq!(sandbox.read("go.mod"), fixture_file("go.mod"));
    assert_eq!(sandbox.read("go.sum"), fixture_file("go.sum"));
    assert_eq!(sandbox.read("main.go"), fixture_file("main.go"));
}

#[test]
fn detect_mode_json_lists_changed_files() {
    let sandbox = Sandbox::new("gotidy-detect-json");
    let assert = sandbox
        .cmd()
        .args(["--imports", "--json"])
        .assert()
        .code(1);

    let payload = parse_json(&assert);
    assert_eq!(payload["status"], "user_error");
    assert_eq!(payload["details"]["reason"], "change_detected");
    assert_eq!(payload["details"]["state"], "rolled_back");
    let key = payload["details"]["changes"][0]["key"]
        .as_str()
        .expect("change key");
    assert!(key.ends_with("main.go"), "key: {key}");
    assert_eq!(payload["details"]["changes"][0]["kind"], "modified");
    assert_eq!(sandbox.read("main.go"), fixture_file("main.go"));
}

#[test]
fn detect_mode_passes_once_tree_is_tidy() {
    let sandbox = Sandbox::new("gotidy-clean");
    sandbox
        .cmd()
        .args(["--tidy", "--imports", "--write"])
        .assert()
        .success();

    let assert = sandbox
        .cmd()
        .args(["--tidy", "--imports"])
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
    assert!(stdout.contains("no changes needed"), "stdout: {stdout}");
}

#[test]
fn deleted_lock_file_is_detected_and_restored() {
    let sandbox = Sandbox::with_go("gotidy-gosum", "rm -f go.sum");
    let assert = sandbox.cmd().args(["--tidy", "--json"]).assert().code(1);

    let payload = parse_json(&assert);
    assert_eq!(payload["details"]["reason"], "change_detected");
    let kinds: Vec<&str> = payload["details"]["changes"]
        .as_array()
        .expect("changes")
        .iter()
        .filter_map(|change| change["kind"].as_str())
        .collect();
    assert!(kinds.contains(&"missing"), "kinds: {kinds:?}");
    assert_eq!(sandbox.read("go.sum"), fixture_file("go.sum"));
    assert_eq!(sandbox.read("go.mod"), fixture_file("go.mod"));
}

#[test]
fn failing_goimports_rolls_back_and_exits_two() {
    let sandbox = Sandbox::new("gotidy-prefix");
    let assert = sandbox
        .cmd()
        .args([
            "--imports-prefix",
            "example.com/does-not-exist",
            "--write",
            "--json",
        ])
        .assert()
        .code(2);

    let payload = parse_json(&assert);
    assert_eq!(payload["status"], "failure");
    assert_eq!(payload["details"]["reason"], "tool_exit_failure");
    assert_eq!(payload["details"]["stage"], "SORT");
    assert_eq!(payload["details"]["state"], "rolled_back");
    assert_eq!(sandbox.read("main.go"), fixture_file("main.go"));
}

#[test]
fn failing_go_leaves_manifest_untouched() {
    let sandbox = Sandbox::with_go(
        "gotidy-gofail",
        "echo 'go: example.com/sample: no network' >&2; exit 1",
    );
    let assert = sandbox
        .cmd()
        .args(["--tidy", "--imports", "--write"])
        .assert()
        .code(2);

    let stderr = String::from_utf8_lossy(&assert.get_output().stderr);
    assert!(stderr.contains("no network"), "stderr: {stderr}");
    assert_eq!(sandbox.read("go.mod"), fixture_file("go.mod"));
    assert_eq!(sandbox.read("main.go"), fixture_file("main.go"));
}

#[test]
fn nothing_enabled_is_a_user_error() {
    let sandbox = Sandbox::new("gotidy-empty");
    let assert = sandbox.cmd().arg("--json").assert().code(1);
    let payload = parse_json(&assert);
    assert_eq!(payload["status"], "user_error");
    assert_eq!(payload["details"]["reason"], "nothing_enabled");
}

#[test]
fn empty_prefix_is_rejected() {
    let sandbox = Sandbox::new("gotidy-empty-prefix");
    let assert = sandbox
        .cmd()
        .args(["--imports-prefix", "", "--json"])
        .assert()
        .code(1);
    let payload = parse_json(&assert);
    assert_eq!(payload["details"]["reason"], "empty_prefix");
    assert_eq!(sandbox.read("main.go"), fixture_file("main.go"));
}

#[test]
fn missing_manifest_is_a_user_error() {
    let sandbox = Sandbox::new("gotidy-nomod");
    fs::remove_file(sandbox.module.join("go.mod")).expect("remove go.mod");
    let assert = sandbox
        .cmd()
        .args(["--tidy", "--write", "--json"])
        .assert()
        .code(1);
    let payload = parse_json(&assert);
    assert_eq!(payload["details"]["reason"], "missing_manifest");
    assert!(payload["details"]["hint"].is_string());
}

#[test]
fn quiet_write_prints_nothing() {
    let sandbox = Sandbox::new("gotidy-quiet");
    let assert = sandbox
        .cmd()
        .args(["--tidy", "--write", "-q"])
        .assert()
        .success();
    assert!(assert.get_output().stdout.is_empty());
    assert_eq!(sandbox.read("go.mod"), SORTED_GO_MOD);
}

#[test]
fn version_flag_reports_package_version() {
    let assert = cargo_bin_cmd!("gotidy").arg("--version").assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")), "stdout: {stdout}");
}
