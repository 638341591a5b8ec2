//! Operator CLI (spec §6) smoke test: invokes the built `motif` binary the
//! way an operator would, rather than calling `cli::run()` in-process.

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

fn db_url(dir: &TempDir) -> String {
    format!("sqlite://{}", dir.path().join("motif.sqlite3").display())
}

#[test]
fn health_reports_ok_against_a_fresh_database() {
    let dir = TempDir::new().expect("tempdir");

    let output = cargo_bin_cmd!("motif")
        .env("DATABASE_URL", db_url(&dir))
        .env("FETCH_USER_AGENT", "motif-test/1.0")
        .args(["--format", "json", "health"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let json: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(json["status"], "ok");
}

#[test]
fn optimize_recomputes_stats_and_prints_json() {
    let dir = TempDir::new().expect("tempdir");

    let output = cargo_bin_cmd!("motif")
        .env("DATABASE_URL", db_url(&dir))
        .env("FETCH_USER_AGENT", "motif-test/1.0")
        .args(["--format", "json", "optimize"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let json: Value = serde_json::from_slice(&output).expect("valid json");
    assert!(json["total_sites"].is_number());
}

#[test]
fn missing_database_url_fails_with_bad_request_exit_code() {
    cargo_bin_cmd!("motif")
        .env_remove("DATABASE_URL")
        .env_remove("FETCH_USER_AGENT")
        .arg("health")
        .assert()
        .code(2);
}
