/// Tests that drive the `qcoder` binary end to end (no network).
use std::path::Path;
use std::process::{Command, Output};

use anyhow::Result;
use rust_xlsxwriter::Workbook;
use tempfile::tempdir;

const ENV_VARS: [&str; 5] = [
    "QCODER_API_BASE_URL",
    "QCODER_API_KEY",
    "QCODER_MODEL",
    "QCODER_TIMEOUT_SECS",
    "QCODER_DELAY_SECS",
];

/// Runs the binary inside `dir` with a clean environment and private settings file.
fn qcoder(dir: &Path, args: &[&str]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_qcoder"));
    cmd.current_dir(dir)
        .arg("--config")
        .arg(dir.join("settings.json"))
        .args(args);
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.output().expect("failed to run qcoder")
}

fn write_dataset(path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let items = workbook.add_worksheet();
    items.set_name("Coding Results")?;
    items.write_string(0, 0, "text")?;
    items.write_string(1, 0, "Is the exam open book?")?;

    let code = workbook.add_worksheet();
    code.set_name("code")?;
    let rows = [
        ["code_num", "code", "explain", "example"],
        ["q", "Question", "Asks something", "Why?"],
        ["f", "Filler", "Unused", "-"],
    ];
    for (r, row) in rows.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            code.write_string(r as u32, c as u16, *value)?;
        }
    }
    workbook.save(path)?;
    Ok(())
}

#[test]
fn config_set_then_show_masks_key() {
    let dir = tempdir().unwrap();

    let set = qcoder(
        dir.path(),
        &["config", "set", "--endpoint", "https://llm.example.com", "--api-key", "sk-secret-9876", "--delay", "0"],
    );
    assert!(set.status.success(), "{}", String::from_utf8_lossy(&set.stderr));
    assert!(dir.path().join("settings.json").exists());

    let show = qcoder(dir.path(), &["config", "show"]);
    assert!(show.status.success());
    let stdout = String::from_utf8_lossy(&show.stdout);
    assert!(stdout.contains("https://llm.example.com"));
    assert!(stdout.contains("9876"));
    assert!(!stdout.contains("sk-secret"));
    assert!(stdout.contains("Delay:         0s"));
}

#[test]
fn config_set_without_values_is_rejected() {
    let dir = tempdir().unwrap();
    let output = qcoder(dir.path(), &["config", "set"]);
    assert!(!output.status.success());
    assert!(!dir.path().join("settings.json").exists());
}

#[test]
fn prompt_prints_template_with_placeholder() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("data.xlsx");
    write_dataset(&input)?;

    let output = qcoder(dir.path(), &["prompt", "data.xlsx"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("The available codes are: q."));
    assert!(stdout.contains("Text to code: [TEXT]"));
    assert!(!stdout.contains("Code f"));
    Ok(())
}

#[test]
fn run_without_credentials_exits_with_user_error() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("data.xlsx");
    write_dataset(&input)?;

    let output = qcoder(dir.path(), &["run", "data.xlsx", "--mode", "encode"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("QCODER_API_BASE_URL"));
    Ok(())
}

#[test]
fn run_with_missing_sheet_exits_with_user_error() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("bare.xlsx");
    let mut workbook = Workbook::new();
    workbook.add_worksheet().set_name("Coding Results")?.write_string(0, 0, "text")?;
    workbook.save(&input)?;

    let output = qcoder(
        dir.path(),
        &["run", "bare.xlsx", "--endpoint", "http://127.0.0.1:9", "--api-key", "k", "--delay", "0"],
    );
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("code"));
    Ok(())
}

#[test]
fn oversized_timeout_is_rejected_as_user_error() -> Result<()> {
    let dir = tempdir()?;
    write_dataset(&dir.path().join("data.xlsx"))?;

    let output = qcoder(
        dir.path(),
        &["run", "data.xlsx", "--endpoint", "http://127.0.0.1:9", "--api-key", "k", "--timeout", "1e20"],
    );
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("timeout_secs"));
    Ok(())
}
