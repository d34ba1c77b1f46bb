//! Integration tests for the `solarweb` CLI binary.
//!
//! Argument parsing, config handling and a full `once` run against a
//! wiremock stand-in for Solar.web.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `solarweb` binary with env isolation.
///
/// Clears all `SOLARWEB_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn solarweb_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("solarweb");
    cmd.env("HOME", "/tmp/solarweb-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/solarweb-cli-test-nonexistent")
        .env_remove("SOLARWEB_PROFILE")
        .env_remove("SOLARWEB_CONFIG")
        .env_remove("SOLARWEB_USERNAME")
        .env_remove("SOLARWEB_DEFAULT_PROFILE")
        .env_remove("RUST_LOG");
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, body).unwrap();
    path
}

fn bearer_profile(base_url: &str) -> String {
    format!(
        r#"
default_profile = "home"

[profiles.home]
username = "owner@example.com"
password = "hunter2"
api_profile = "bearer"
base_url = "{base_url}"
"#
    )
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = solarweb_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_lists_commands() {
    solarweb_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("run")
            .and(predicate::str::contains("once"))
            .and(predicate::str::contains("config")),
    );
}

#[test]
fn test_version_flag() {
    solarweb_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("solarweb"));
}

#[test]
fn test_unknown_output_format_is_usage_error() {
    solarweb_cmd()
        .args(["once", "--output", "table"])
        .assert()
        .code(2);
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honours_flag() {
    solarweb_cmd()
        .args(["config", "path", "--config", "/etc/solarweb/custom.toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/etc/solarweb/custom.toml"));
}

#[test]
fn test_config_show_masks_secrets() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), &bearer_profile("https://swqapi.solarweb.com/"));

    solarweb_cmd()
        .args(["config", "show", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("owner@example.com")
                .and(predicate::str::contains("hunter2").not()),
        );
}

#[test]
fn test_missing_config_exits_with_config_code() {
    let dir = tempfile::tempdir().unwrap();
    let output = solarweb_cmd()
        .args(["once", "--config"])
        .arg(dir.path().join("absent.toml"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Configuration file not found"));
}

#[test]
fn test_unknown_profile_exits_with_config_code() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), &bearer_profile("https://swqapi.solarweb.com/"));
    let output = solarweb_cmd()
        .args(["once", "--profile", "cabin", "--config"])
        .arg(&path)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("home"));
}

#[test]
fn test_access_key_profile_without_id_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"
[profiles.default]
username = "owner@example.com"
password = "hunter2"
"#,
    );
    let output = solarweb_cmd()
        .args(["once", "--config"])
        .arg(&path)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("access_key_id"));
}

// ── Against a mock Solar.web ────────────────────────────────────────

async fn mount_account(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/pvsystems"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "pvSystems": [ { "pvSystemId": "sys-a", "name": "Roof" } ]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pvsystems/sys-a/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "devices": [] })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/pvsystems/sys-a/flowdata$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "power": 1234.5, "status": "OK" }
        })))
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_once_prints_mirrored_tree() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/iam/jwt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jwtToken": "jwt-1",
            "refreshToken": "refresh-1",
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_account(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), &bearer_profile(&format!("{}/", server.uri())));

    let output = tokio::task::spawn_blocking(move || {
        solarweb_cmd()
            .args(["once", "--output", "json", "--config"])
            .arg(&path)
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert!(output.status.success(), "{}", combined_output(&output));
    let tree: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(tree["sys-a"]["flowdata"]["power"], json!(1234.5));
    assert_eq!(tree["sys-a"]["flowdata"]["status"], json!("OK"));
    assert_eq!(tree["info"]["connection"], json!(false));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_once_rejected_login_exits_with_auth_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/iam/jwt"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), &bearer_profile(&format!("{}/", server.uri())));

    let output = tokio::task::spawn_blocking(move || {
        solarweb_cmd()
            .args(["once", "--config"])
            .arg(&path)
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert_eq!(output.status.code(), Some(3), "{}", combined_output(&output));
}
