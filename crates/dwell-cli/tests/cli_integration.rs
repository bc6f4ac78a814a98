//! Integration tests driving the `dwell` binary against a temp database.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use base64::Engine as _;
use chrono::NaiveDate;
use dwell_core::{BufferLimits, Interval, PendingBuffer};
use dwell_db::Database;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tempfile::TempDir;

fn dwell_binary() -> String {
    env!("CARGO_BIN_EXE_dwell").to_string()
}

/// Writes a config pointing at a database inside `temp`.
fn write_config(temp: &Path, collector_url: &str) -> PathBuf {
    let config_path = temp.join("config.toml");
    let db_path = temp.join("state").join("dwell.db");
    std::fs::write(
        &config_path,
        format!(
            "database_path = {:?}\ncollector_url = {collector_url:?}\nrequest_timeout_secs = 2\n",
            db_path.display().to_string()
        ),
    )
    .unwrap();
    config_path
}

fn dwell(temp: &Path, config: &Path, args: &[&str]) -> Output {
    Command::new(dwell_binary())
        .env("HOME", temp)
        .env("XDG_CONFIG_HOME", temp.join("xdg"))
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .expect("failed to run dwell")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "dwell should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Buffers one interval in the database `write_config` points at.
fn seed_interval(temp: &Path) {
    let db_path = temp.join("state").join("dwell.db");
    std::fs::create_dir_all(db_path.parent().unwrap()).unwrap();
    let db = Database::open(&db_path).unwrap();
    let mut buffer = PendingBuffer::load(db, BufferLimits::default()).unwrap();
    buffer.append(Interval {
        site: "docs.rs".to_string(),
        url: "https://docs.rs/".to_string(),
        title: None,
        date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        duration_seconds: 60,
    });
}

fn valid_token() -> String {
    format!("e30.{}.sig", URL_SAFE_NO_PAD.encode(r#"{"exp":4102444800}"#))
}

#[test]
fn help_lists_commands() {
    let output = Command::new(dwell_binary()).arg("--help").output().unwrap();
    assert_success(&output);
    let text = stdout(&output);
    for command in ["track", "flush", "status", "token", "report"] {
        assert!(text.contains(command), "help should mention {command}");
    }
}

#[test]
fn status_on_fresh_database() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), "http://127.0.0.1:1");

    let output = dwell(temp.path(), &config, &["status"]);
    assert_success(&output);
    let text = stdout(&output);
    assert!(text.contains("Credential: not set"));
    assert!(text.contains("Pending: 0 intervals"));
    assert!(temp.path().join("state").join("dwell.db").exists());
}

#[test]
fn token_set_and_clear_round_trip() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), "http://127.0.0.1:1");

    let output = dwell(temp.path(), &config, &["token", "set", &valid_token()]);
    assert_success(&output);
    assert!(stdout(&output).contains("valid until 2100-01-01T00:00:00Z"));

    let status = stdout(&dwell(temp.path(), &config, &["status"]));
    assert!(status.contains("Credential: valid until 2100-01-01T00:00:00Z"));
    assert!(status.contains("- credential: "));

    assert_success(&dwell(temp.path(), &config, &["token", "clear"]));
    let status = stdout(&dwell(temp.path(), &config, &["status"]));
    assert!(status.contains("Credential: not set"));
}

#[test]
fn empty_token_fails() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), "http://127.0.0.1:1");

    let output = dwell(temp.path(), &config, &["token", "set", " "]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("token must not be empty"));
}

#[test]
fn flush_with_empty_buffer_is_skipped() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), "http://127.0.0.1:1");

    let output = dwell(temp.path(), &config, &["flush"]);
    assert_success(&output);
    assert!(stdout(&output).contains("Nothing uploaded: nothing to flush."));
}

#[test]
fn flush_without_credential_keeps_buffer() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), "http://127.0.0.1:1");
    seed_interval(temp.path());

    let output = dwell(temp.path(), &config, &["flush"]);
    assert_success(&output);
    assert!(stdout(&output).contains("Nothing uploaded: no valid credential."));

    let status = stdout(&dwell(temp.path(), &config, &["status"]));
    assert!(status.contains("Pending: 1 intervals"));
    assert!(status.contains("docs.rs 60s https://docs.rs/"));
}

#[test]
fn track_reads_events_until_stdin_closes() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), "http://127.0.0.1:1");

    let mut child = Command::new(dwell_binary())
        .env("HOME", temp.path())
        .env("XDG_CONFIG_HOME", temp.path().join("xdg"))
        .arg("--config")
        .arg(&config)
        .arg("track")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    {
        let mut stdin = child.stdin.take().unwrap();
        writeln!(stdin, r#"{{"type":"tab_activated","tab":{{"url":"https://docs.rs/"}}}}"#).unwrap();
        writeln!(stdin, "not json").unwrap();
        writeln!(stdin, r#"{{"type":"idle_state_changed","state":"locked"}}"#).unwrap();
    }
    let output = child.wait_with_output().unwrap();
    assert_success(&output);

    // Sub-second sessions fall below the minimum, so nothing is buffered.
    let status = stdout(&dwell(temp.path(), &config, &["status"]));
    assert!(status.contains("Pending: 0 intervals"));
}

#[test]
fn report_rejects_inverted_range() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), "http://127.0.0.1:1");

    let output = dwell(
        temp.path(),
        &config,
        &["report", "--from", "2025-06-10", "--to", "2025-06-01"],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("is after --to"));

    let output = dwell(temp.path(), &config, &["report", "--json", "--csv"]);
    assert!(!output.status.success());
}
