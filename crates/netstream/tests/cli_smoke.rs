//! CLI smoke tests for `nst`.
//!
//! Every command runs against temp files or loopback sockets only.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::{BufRead, BufReader};
use std::process::Stdio;

#[allow(deprecated)]
fn nst_cmd() -> Command {
    let mut cmd = Command::cargo_bin("nst").expect("nst binary should be built");
    cmd.env_remove("NETSTREAM_CONFIG");
    cmd.env_remove("RUST_LOG");
    cmd.args(["--log-level", "warn"]);
    cmd
}

// =============================================================================
// Basics
// =============================================================================

#[test]
fn help_mentions_commands() {
    nst_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("inspect"));
}

#[test]
fn version_prints_crate_version() {
    nst_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn transports_lists_schemes() {
    nst_cmd()
        .arg("transports")
        .assert()
        .success()
        .stdout(predicate::str::diff("tcp\nudp\nunix\nudg\n"));
}

// =============================================================================
// inspect
// =============================================================================

#[test]
fn inspect_reports_file_capabilities() {
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), b"12345").unwrap();

    let output = nst_cmd()
        .arg("inspect")
        .arg(file.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["readable"], true);
    assert_eq!(report["writable"], false);
    assert_eq!(report["seekable"], true);
    assert_eq!(report["size"], 5);
    assert_eq!(report["metadata"]["stream_type"], "STDIO");
    assert_eq!(report["metadata"]["wrapper_type"], "plainfile");
}

#[test]
fn inspect_missing_file_fails_with_code() {
    let dir = tempfile::TempDir::new().unwrap();
    nst_cmd()
        .arg("inspect")
        .arg(dir.path().join("absent"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[5001]"))
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn inspect_invalid_mode_fails() {
    let file = tempfile::NamedTempFile::new().unwrap();
    nst_cmd()
        .arg("inspect")
        .arg(file.path())
        .args(["--mode", "q"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid mode 'q'."));
}

// =============================================================================
// config
// =============================================================================

#[test]
fn broken_config_is_reported() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("nst.toml");
    std::fs::write(&path, "[server\n").unwrap();
    nst_cmd()
        .arg("--config")
        .arg(&path)
        .arg("transports")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config error"));
}

// =============================================================================
// serve + connect
// =============================================================================

#[test]
fn unsupported_scheme_is_rejected() {
    nst_cmd()
        .args(["serve", "http://127.0.0.1:0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Scheme 'http' is not supported."));
}

#[test]
fn connect_to_closed_port_fails() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    nst_cmd()
        .args(["connect", &format!("tcp://127.0.0.1:{port}")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Client could not connect"));
}

#[test]
#[allow(deprecated)]
fn serve_echoes_to_connect() {
    let bin = assert_cmd::cargo::cargo_bin("nst");
    let mut server = std::process::Command::new(&bin)
        .args(["--log-level", "warn", "serve", "tcp://127.0.0.1:0", "--max-clients", "1"])
        .env_remove("NETSTREAM_CONFIG")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let mut banner = String::new();
    BufReader::new(server.stdout.take().unwrap())
        .read_line(&mut banner)
        .unwrap();
    let address = banner
        .trim()
        .strip_prefix("listening on ")
        .expect("serve prints its address first")
        .to_string();

    nst_cmd()
        .args(["connect", &format!("tcp://{address}"), "--send", "ping"])
        .assert()
        .success()
        .stdout(predicate::str::diff("ping\n"));

    let status = server.wait().unwrap();
    assert!(status.success());
}
