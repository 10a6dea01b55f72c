//! Tests for the `timecard` binary

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use pretty_assertions::assert_eq;
use tempfile::{tempdir, TempDir};

const REQUEST: &str = r#"{
    "employee_name": "Ada Lovelace",
    "pay_period_num": 1,
    "year": 2025,
    "jobs": [{"job_code": "29699", "job_name": "201"}],
    "weeks": [{
        "week_number": 1,
        "week_start_date": "2025-01-06T00:00:00Z",
        "week_label": "WEEK 1",
        "entries": [{"date": "2025-01-06T00:00:00Z", "code": "29699", "hours": 8}]
    }]
}"#;

fn timecard_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_timecard"))
}

/// The binary, run in `dir`, isolated from the caller's timecard settings
fn timecard(dir: &Path) -> Command {
    let mut cmd = Command::new(timecard_binary());
    cmd.current_dir(dir);
    for var in [
        "TIMECARD_CONFIG",
        "TIMECARD_TEMPLATE",
        "TIMECARD_SOFFICE",
        "TIMECARD_SENDMAIL",
        "SMTP_HOST",
        "SMTP_PORT",
        "SMTP_USER",
        "SMTP_PASS",
        "SMTP_FROM",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn workspace() -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let request = dir.path().join("request.json");
    fs::write(&request, REQUEST).unwrap();
    (dir, request)
}

fn write_template(path: &Path) {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    for name in ["Week 1", "Week 2"] {
        workbook.add_worksheet().set_name(name).unwrap();
    }
    workbook.save(path).unwrap();
}

fn read_cell(path: &Path, sheet: &str, row: u32, col: u32) -> Data {
    let bytes = fs::read(path).unwrap();
    let mut xlsx: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes)).unwrap();
    let range = xlsx.worksheet_range(sheet).unwrap();
    range.get_value((row, col)).cloned().unwrap_or(Data::Empty)
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn generate_fills_template() {
    let (dir, request) = workspace();
    let template = dir.path().join("form.xlsx");
    write_template(&template);
    let out = dir.path().join("out.xlsx");

    let output = timecard(dir.path())
        .arg("--template")
        .arg(&template)
        .arg("generate")
        .arg(&request)
        .arg("-o")
        .arg(&out)
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success(), "{}", stderr(&output));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Wrote:"));
    assert_eq!(read_cell(&out, "Week 1", 3, 2), Data::String("201".into()));
    assert_eq!(read_cell(&out, "Week 1", 4, 2), Data::Float(8.0));
}

#[test]
fn generate_without_template_writes_basic_workbook() {
    let (dir, request) = workspace();

    let output = timecard(dir.path())
        .arg("generate")
        .arg(&request)
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success(), "{}", stderr(&output));
    let out = dir.path().join("timecard_Ada Lovelace.xlsx");
    assert!(out.exists(), "default output name should be used");
    assert_eq!(read_cell(&out, "Sheet1", 0, 0), Data::String("Employee:".into()));
    assert_eq!(read_cell(&out, "Sheet1", 0, 1), Data::String("Ada Lovelace".into()));
}

#[test]
fn template_from_environment() {
    let (dir, request) = workspace();
    write_template(&dir.path().join("env.xlsx"));
    let out = dir.path().join("out.xlsx");

    let output = timecard(dir.path())
        .env("TIMECARD_TEMPLATE", "env.xlsx")
        .arg("generate")
        .arg(&request)
        .arg("-o")
        .arg(&out)
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(read_cell(&out, "Week 1", 1, 12), Data::String("Ada Lovelace".into()));
}

#[test]
fn template_from_config_file() {
    let (dir, request) = workspace();
    write_template(&dir.path().join("configured.xlsx"));
    fs::write(dir.path().join("timecard.toml"), "template = \"configured.xlsx\"\n").unwrap();
    let out = dir.path().join("out.xlsx");

    let output = timecard(dir.path())
        .arg("generate")
        .arg(&request)
        .arg("-o")
        .arg(&out)
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(read_cell(&out, "Week 1", 3, 35), Data::String("WEEK 1".into()));
}

#[test]
fn generate_reads_stdin() {
    let (dir, _) = workspace();
    let out = dir.path().join("stdin.xlsx");

    let mut child = timecard(dir.path())
        .args(["generate", "-", "-o"])
        .arg(&out)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to execute command");
    child.stdin.take().unwrap().write_all(REQUEST.as_bytes()).unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success(), "{}", stderr(&output));
    assert!(fs::read(&out).unwrap().starts_with(b"PK"));
}

#[test]
fn malformed_request_is_a_client_error() {
    let (dir, _) = workspace();
    let request = dir.path().join("bad.json");
    fs::write(&request, r#"{"employee_name": "Ada", "weeks": [{"entries": [{"hours": "eight"}]}]}"#).unwrap();

    let output = timecard(dir.path())
        .arg("generate")
        .arg(&request)
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("invalid request"), "{}", stderr(&output));
}

#[test]
fn missing_request_file_fails() {
    let (dir, _) = workspace();

    let output = timecard(dir.path())
        .args(["generate", "nope.json"])
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("reading request nope.json"));
}

#[test]
fn invalid_config_file_fails() {
    let (dir, request) = workspace();
    fs::write(dir.path().join("timecard.toml"), "[converter]\ntimeout = 3\n").unwrap();

    let output = timecard(dir.path())
        .arg("generate")
        .arg(&request)
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    assert!(stderr(&output).contains("invalid config file"), "{}", stderr(&output));
}

#[cfg(unix)]
#[test]
fn pdf_conversion_failure_is_reported() {
    let (dir, request) = workspace();

    let output = timecard(dir.path())
        .arg("pdf")
        .arg(&request)
        .args(["--soffice", "false"])
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("converting to PDF"), "{}", stderr(&output));
    assert!(!dir.path().join("timecard_Ada Lovelace.pdf").exists());
}

fn email_request(dir: &Path) -> PathBuf {
    let path = dir.join("email.json");
    let mut body: serde_json::Value = serde_json::from_str(REQUEST).unwrap();
    body["to"] = "a@example.com".into();
    body["subject"] = "Timecard".into();
    body["body"] = "Attached.".into();
    fs::write(&path, body.to_string()).unwrap();
    path
}

#[test]
fn email_requires_smtp_settings() {
    let (dir, _) = workspace();
    let request = email_request(dir.path());

    let output = timecard(dir.path())
        .env("SMTP_HOST", "smtp.example.com")
        .env("SMTP_USER", "mailer@example.com")
        .arg("email")
        .arg(&request)
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("SMTP not configured"), "{}", stderr(&output));
    assert!(output.stdout.is_empty());
}

#[cfg(unix)]
#[test]
fn email_sender_defaults_to_smtp_user() {
    let (dir, _) = workspace();
    let request = email_request(dir.path());

    let output = timecard(dir.path())
        .env("SMTP_USER", "mailer@example.com")
        .env("SMTP_FROM", "")
        .arg("email")
        .arg(&request)
        .args(["--sendmail", "false"])
        .output()
        .expect("Failed to execute command");

    // past the sender check, failing only at delivery
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("sending email"), "{}", stderr(&output));
}

#[cfg(unix)]
#[test]
fn email_delivery_failure_is_reported() {
    let (dir, _) = workspace();
    let request = email_request(dir.path());

    let output = timecard(dir.path())
        .env("SMTP_FROM", "payroll@example.com")
        .arg("email")
        .arg(&request)
        .args(["--sendmail", "false"])
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("sending email"), "{}", stderr(&output));
}
