//! End-to-end tests for the `jseval` binary.

use std::process::{Command, Output};

fn jseval(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_jseval"))
        .args(args)
        .env("NO_COLOR", "1")
        .output()
        .expect("failed to run jseval")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim_end().to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim_end().to_string()
}

#[test]
fn eval_flag_prints_result() {
    let output = jseval(&["-c", "let x = 1 + 1; x"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "2");
}

#[test]
fn no_return_value_succeeds() {
    let output = jseval(&["-c", "if (false) { 1 }"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "");
    assert!(stderr(&output).contains("Did you forget to `return`?"));
}

#[test]
fn syntax_error_fails() {
    let output = jseval(&["-c", "("]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("✗ Syntax error"));
}

#[test]
fn runtime_error_fails() {
    let output = jseval(&["-c", "throw new TypeError('nope')"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("TypeError: nope"));
}

#[test]
fn script_file_with_shebang() {
    let path = std::env::temp_dir().join(format!("jseval-script-{}.js", std::process::id()));
    std::fs::write(
        &path,
        "#!/usr/bin/env jseval\nconst xs = [3, 1, 2];\nxs.sort();\nxs.join('-')\n",
    )
    .expect("write script");

    let output = jseval(&[path.to_str().expect("utf-8 path")]);
    let _ = std::fs::remove_file(&path);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "'1-2-3'");
}

#[test]
fn missing_script_fails() {
    let output = jseval(&["/nonexistent/jseval/script.js"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Failed to read script"));
}

#[test]
fn unknown_option_fails() {
    let output = jseval(&["--bogus"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Unknown option: --bogus"));
}

#[test]
fn version_flag() {
    let output = jseval(&["--version"]);
    assert!(output.status.success());
    assert!(stdout(&output).starts_with("jseval "));
}
