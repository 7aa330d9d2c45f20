// End-to-end tests for the toolrig binary.

use std::process::Command;

/// Create a [`Command`] pointing at the built `toolrig` binary with its
/// state and catalog dirs redirected into the given temp directory, so
/// tests never touch real user state.
fn toolrig_cmd(tmp: &std::path::Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_toolrig"));
    cmd.arg("--state-dir")
        .arg(tmp.join("state"))
        .arg("--catalog-dir")
        .arg(tmp.join("recipes"));
    cmd
}

#[test]
fn cli_help_displays_correctly() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let output = toolrig_cmd(tmp.path()).arg("--help").output().expect("failed to run toolrig --help");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("detect"));
    assert!(stdout.contains("plan"));
    assert!(stdout.contains("install"));
    assert!(stdout.contains("remove"));
    assert!(stdout.contains("resume"));
    assert!(stdout.contains("cancel"));
    assert!(stdout.contains("list-plans"));
}

#[test]
fn install_help_shows_confirmation_and_sudo_flags() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let output =
        toolrig_cmd(tmp.path()).args(["install", "--help"]).output().expect("failed to run toolrig install --help");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--answer"));
    assert!(stdout.contains("--yes"));
    assert!(stdout.contains("--sudo-password"));
}

#[test]
fn detect_prints_a_system_profile() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let output = toolrig_cmd(tmp.path()).arg("detect").output().expect("failed to run toolrig detect");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("detect output is valid JSON");
    assert!(parsed.get("os").is_some());
}

#[test]
fn plan_for_unknown_tool_fails_with_bad_arguments() {
    let tmp = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir_all(tmp.path().join("recipes")).unwrap();
    let output = toolrig_cmd(tmp.path()).args(["plan", "not-a-real-tool"]).output().expect("failed to run toolrig plan");

    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not-a-real-tool"));
}

#[test]
fn list_plans_on_empty_state_dir_prints_empty_array() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let output = toolrig_cmd(tmp.path()).arg("list-plans").output().expect("failed to run toolrig list-plans");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("list-plans output is valid JSON");
    assert!(parsed.as_array().is_some_and(|a| a.is_empty()));
}

#[test]
fn resume_unknown_plan_id_fails_with_runtime_error() {
    let tmp = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir_all(tmp.path().join("state")).unwrap();
    let output =
        toolrig_cmd(tmp.path()).args(["resume", "no-such-plan"]).output().expect("failed to run toolrig resume");

    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(1));
}
