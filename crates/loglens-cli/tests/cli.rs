use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;

const LINES: &str = concat!(
    r#"10.0.0.1 - - [22/Aug/2024:10:30:45 +0000] "GET /a HTTP/1.1" 200 100 "-" "curl/8""#,
    "\n",
    r#"10.0.0.2 - - [22/Aug/2024:10:30:46 +0000] "GET /a HTTP/1.1" 404 50 "-" "Mozilla""#,
    "\n",
    r#"10.0.0.1 - - [22/Aug/2024:10:30:47 +0000] "POST /b HTTP/1.1" 500 0 "-" "curl/8""#,
    "\n",
);

fn loglens() -> Command {
    Command::cargo_bin("loglens").expect("binary builds")
}

fn write_log(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("access.log");
    fs::write(&path, LINES).expect("write log");
    path
}

#[test]
fn analyse_writes_a_json_report() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = write_log(&dir);
    let report = dir.path().join("report.json");

    loglens()
        .arg("analyse")
        .arg(&log)
        .arg("-o")
        .arg(&report)
        .assert()
        .success();

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report).expect("read report"))
            .expect("valid json");
    assert_eq!(json["total_requests"], 3);
    assert_eq!(json["unique_ips"], 2);
    assert_eq!(json["top_ips"][0]["key"], "10.0.0.1");
}

#[test]
fn analyse_accepts_the_analyze_alias_and_csv() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = write_log(&dir);

    loglens()
        .arg("analyze")
        .arg(&log)
        .arg("--format")
        .arg("csv")
        .arg("--quiet")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("section,metric,value,percentage"));
}

#[test]
fn query_renders_a_table() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = write_log(&dir);

    loglens()
        .arg("query")
        .arg("SELECT status, COUNT() FROM logs GROUP BY status ORDER BY status")
        .arg(&log)
        .arg("--quiet")
        .assert()
        .success()
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("200"))
        .stdout(predicate::str::contains("500"));
}

#[test]
fn bad_query_fails_with_a_hint() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = write_log(&dir);

    loglens()
        .arg("query")
        .arg("SELECT staus FROM logs")
        .arg(&log)
        .arg("--quiet")
        .assert()
        .failure()
        .stderr(predicate::str::contains("did you mean"));
}

#[test]
fn missing_input_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    loglens()
        .arg("analyse")
        .arg(dir.path().join("nope.log"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("no records parsed"));
}

#[test]
fn security_report_carries_a_score() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = write_log(&dir);

    let output = loglens()
        .arg("security")
        .arg(&log)
        .arg("--quiet")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&output).expect("valid json");
    assert!(json["score"]["overall"].is_number());
    assert!(json["profiles"].is_object());
}

#[test]
fn trends_requires_enough_samples() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = write_log(&dir);

    loglens()
        .arg("trends")
        .arg(&log)
        .arg("--quiet")
        .assert()
        .failure()
        .stderr(predicate::str::contains("insufficient data"));

    loglens()
        .arg("trends")
        .arg(&log)
        .arg("--min-samples")
        .arg("2")
        .arg("--quiet")
        .assert()
        .success()
        .stdout(predicate::str::contains("overall"));
}
