// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Command-line smoke tests

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const CLAUDE_AGENT: &str = "---\nname: reviewer\ntools: Read, Write\npermissionMode: default\n---\nReview the diff.\n";

fn opkg(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("opkg").unwrap();
    cmd.current_dir(dir.path()).env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

#[test]
fn lists_builtin_platforms() {
    let temp = TempDir::new().unwrap();
    opkg(&temp)
        .arg("platforms")
        .assert()
        .success()
        .stdout(predicate::str::contains("claude"))
        .stdout(predicate::str::contains("cursor"))
        .stdout(predicate::str::contains("codex"));
}

#[test]
fn lists_transforms() {
    let temp = TempDir::new().unwrap();
    opkg(&temp)
        .args(["platforms", "--transforms"])
        .assert()
        .success()
        .stdout(predicate::str::contains("yaml"))
        .stdout(predicate::str::contains("codec"));
}

#[test]
fn validate_reports_every_violation() {
    let temp = TempDir::new().unwrap();
    std::fs::write(
        temp.path().join("good.yaml"),
        "- from: \"agents/*.md\"\n  to: \".claude/agents/*.md\"\n",
    )
    .unwrap();
    std::fs::write(
        temp.path().join("bad.yaml"),
        "- from: \"\"\n  to: out.md\n  merge: sideways\n",
    )
    .unwrap();

    opkg(&temp)
        .args(["validate", "good.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("All flows are valid"));

    opkg(&temp)
        .args(["validate", "bad.yaml"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("pattern is empty"))
        .stdout(predicate::str::contains("unknown merge strategy 'sideways'"));
}

#[test]
fn classify_as_json() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("reviewer.md"), CLAUDE_AGENT).unwrap();

    let output = opkg(&temp)
        .args(["classify", "--format", "json", "reviewer.md"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed[0]["file"], "reviewer.md");
    assert_eq!(parsed[0]["platform"], "claude");
    assert!(parsed[0]["confidence"].as_f64().unwrap() > 0.8);
}

#[test]
fn invert_prints_import_flows() {
    let temp = TempDir::new().unwrap();
    opkg(&temp)
        .args(["invert", "--platform", "cursor"])
        .assert()
        .success()
        .stdout(predicate::str::contains("$rename"))
        .stdout(predicate::str::contains(".cursor/rules/**/*.mdc"));

    opkg(&temp)
        .args(["invert", "--platform", "emacs"])
        .assert()
        .failure();
}

#[test]
fn convert_writes_universal_package() {
    let temp = TempDir::new().unwrap();
    let agents = temp.path().join("pkg/.claude/agents");
    std::fs::create_dir_all(&agents).unwrap();
    std::fs::write(agents.join("reviewer.md"), CLAUDE_AGENT).unwrap();

    opkg(&temp)
        .args(["convert", "pkg", "--output", "out", "--name", "review-kit"])
        .assert()
        .success();

    let converted = std::fs::read_to_string(temp.path().join("out/agents/reviewer.md")).unwrap();
    assert!(converted.contains("- Read"));
    assert!(converted.ends_with("Review the diff.\n"));
    assert!(!temp.path().join("out/.claude").exists());
}

#[test]
fn apply_installs_for_platform() {
    let temp = TempDir::new().unwrap();
    let agents = temp.path().join("pkg/agents");
    std::fs::create_dir_all(&agents).unwrap();
    std::fs::write(agents.join("reviewer.md"), "---\ntools:\n- read\n---\nReview.\n").unwrap();
    std::fs::create_dir_all(temp.path().join("ws")).unwrap();

    opkg(&temp)
        .args(["apply", "-p", "claude", "--package-root", "pkg", "--workspace-root", "ws", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains(".claude/agents/reviewer.md"));
    assert!(!temp.path().join("ws/.claude").exists());

    opkg(&temp)
        .args(["apply", "-p", "claude", "--package-root", "pkg", "--workspace-root", "ws"])
        .assert()
        .success();
    let installed = std::fs::read_to_string(temp.path().join("ws/.claude/agents/reviewer.md")).unwrap();
    assert!(installed.contains("tools: Read"));
}
