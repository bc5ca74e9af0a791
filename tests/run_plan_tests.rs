//! Integration tests for `homestead run` with real shell commands

mod common;

use common::TestWorkspace;
use predicates::prelude::*;

#[test]
fn test_plan_runs_every_step_in_order() {
    let workspace = TestWorkspace::new();
    let plan = workspace.write_file(
        "plan.yaml",
        r#"
name: smoke
steps:
  - label: Create first marker
    kind: resilient
    command: [sh, -c, "touch first"]
  - label: Check first marker
    kind: health_polled
    check: [test, -f, first]
    timeout: 10s
    poll_interval: 1s
  - label: Create second marker
    kind: resilient
    command: [sh, -c, "touch second"]
"#,
    );

    let output = workspace.command().arg("run").arg(&plan).output().unwrap();
    assert!(output.status.success());
    assert!(workspace.file_exists("first"));
    assert!(workspace.file_exists("second"));

    let stderr = String::from_utf8_lossy(&output.stderr);
    let positions: Vec<_> = ["[1/3] Create first marker", "[2/3] Check first marker", "[3/3] Create second marker"]
        .iter()
        .map(|line| stderr.find(line).unwrap_or_else(|| panic!("missing {line:?} in {stderr}")))
        .collect();
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("smoke: 3 of 3 steps"));
}

#[test]
fn test_failing_step_stops_the_plan() {
    let workspace = TestWorkspace::new();
    let plan = workspace.write_file(
        "plan.yaml",
        r#"
steps:
  - label: Succeed
    kind: resilient
    command: "true"
  - label: Always fail
    kind: resilient
    command: "false"
    retry:
      attempts: 2
      delay: 0s
  - label: Never reached
    kind: resilient
    command: [sh, -c, "touch reached"]
"#,
    );

    workspace
        .command()
        .arg("run")
        .arg(&plan)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("[1/3] done"))
        .stderr(predicate::str::contains("[2/3] failed"))
        .stderr(predicate::str::contains("Always fail"))
        .stderr(predicate::str::contains("1. Succeed"))
        .stderr(predicate::str::contains("--start-at 2"))
        .stderr(predicate::str::contains("[3/3]").not());

    assert!(!workspace.file_exists("reached"));
}

#[test]
fn test_non_fatal_step_does_not_stop_the_plan() {
    let workspace = TestWorkspace::new();
    let plan = workspace.write_file(
        "plan.yaml",
        r#"
steps:
  - label: Optional cleanup
    kind: resilient
    command: "false"
    fatal: false
    retry:
      attempts: 1
  - label: Create marker
    kind: resilient
    command: [sh, -c, "touch marker"]
"#,
    );

    workspace.command().arg("run").arg(&plan).assert().success();
    assert!(workspace.file_exists("marker"));
}

#[test]
fn test_start_at_skips_earlier_steps() {
    let workspace = TestWorkspace::new();
    let plan = workspace.write_file(
        "plan.yaml",
        r#"
steps:
  - label: Skipped
    kind: resilient
    command: [sh, -c, "touch skipped"]
  - label: Resumed
    kind: resilient
    command: [sh, -c, "touch resumed"]
"#,
    );

    workspace
        .command()
        .arg("run")
        .arg(&plan)
        .args(["--start-at", "2"])
        .assert()
        .success()
        .stderr(predicate::str::contains("[2/2] Resumed"))
        .stderr(predicate::str::contains("[1/2]").not());

    assert!(!workspace.file_exists("skipped"));
    assert!(workspace.file_exists("resumed"));
}

#[test]
fn test_start_at_out_of_range() {
    let workspace = TestWorkspace::new();
    let plan = workspace.write_file(
        "plan.yaml",
        "steps:\n  - label: Only\n    kind: resilient\n    command: \"true\"\n",
    );

    workspace
        .command()
        .arg("run")
        .arg(&plan)
        .args(["--start-at", "5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot start at step 5"));
}

#[test]
fn test_invalid_plan_is_rejected_before_running() {
    let workspace = TestWorkspace::new();
    let plan = workspace.write_file(
        "plan.yaml",
        r#"
steps:
  - label: Create marker
    kind: resilient
    command: [sh, -c, "touch marker"]
  - label: Broken
    kind: health_polled
"#,
    );

    workspace
        .command()
        .arg("run")
        .arg(&plan)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid plan"));

    assert!(!workspace.file_exists("marker"));
}

#[test]
fn test_missing_plan_file() {
    TestWorkspace::new()
        .command()
        .args(["run", "nowhere.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nowhere.yaml"));
}

#[test]
fn test_log_file_records_steps() {
    let workspace = TestWorkspace::new();
    let plan = workspace.write_file(
        "plan.yaml",
        "steps:\n  - label: Logged step\n    kind: resilient\n    command: \"true\"\n",
    );

    workspace
        .command()
        .arg("run")
        .arg(&plan)
        .arg("--log-file")
        .arg(workspace.path.join("homestead.log"))
        .assert()
        .success();

    let log = std::fs::read_to_string(workspace.path.join("homestead.log")).unwrap();
    assert!(log.contains("Logged step"));
}
