//! Runs the `sandpiper` binary end to end.

use std::io::Write;
use std::process::{Command, Output, Stdio};

use base64::Engine;

fn encode(source: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(source)
}

fn sandpiper(args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_sandpiper"))
        .args(args)
        .env("RUST_LOG", "off")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to start sandpiper");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(stdin.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn error_record(output: &Output) -> serde_json::Value {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let line = stderr.lines().last().expect("no error record on stderr");
    serde_json::from_str(line).unwrap()
}

#[test]
fn test_b64_program_with_input() {
    let program = encode("name = input(\"Name: \")\nprint(\"Hi \" + name)\n");
    let output = sandpiper(&["--b64", &program], "Ada\n");
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "Name: Hi Ada\n");
}

#[test]
fn test_program_on_first_stdin_line() {
    let program = encode("a = int(input())\nb = int(input())\nprint(a + b)\n");
    let output = sandpiper(&[], &format!("{}\n2\n3\n", program));
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "5\n");
}

#[test]
fn test_file_program() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "for i in range(3):\n    print(i)\n").unwrap();
    let path = file.path().to_str().unwrap();
    let output = sandpiper(&["--file", path], "");
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "0\n1\n2\n");
}

#[test]
fn test_runtime_error_prints_record() {
    let program = encode("def f():\n  raise ValueError(\"x\")\nf()\n");
    let output = sandpiper(&["--b64", &program], "");
    assert_eq!(output.status.code(), Some(1));
    let record = error_record(&output);
    assert_eq!(record["kind"], "ValueError");
    assert_eq!(record["message"], "x");
    assert_eq!(record["line"], 2);
    assert_eq!(record["frames"].as_array().unwrap().len(), 2);
}

#[test]
fn test_syntax_error_prints_record() {
    let program = encode("if True\n    pass\n");
    let output = sandpiper(&["--b64", &program], "");
    assert_eq!(output.status.code(), Some(1));
    let record = error_record(&output);
    assert_eq!(record["kind"], "SyntaxError");
    assert_eq!(record["line"], 1);
    assert_eq!(record["frames"], serde_json::json!([]));
}

#[test]
fn test_deeply_nested_program_is_rejected() {
    let depth = 200_000;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "x = {}1{}\n", "(".repeat(depth), ")".repeat(depth)).unwrap();
    let path = file.path().to_str().unwrap();
    let output = sandpiper(&["--file", path], "");
    assert_eq!(output.status.code(), Some(1));
    let record = error_record(&output);
    assert_eq!(record["kind"], "SyntaxError");
    assert_eq!(record["message"], "too many nested parentheses");
}

#[test]
fn test_closed_stdin_raises_eoferror() {
    let program = encode("input()\n");
    let output = sandpiper(&["--b64", &program], "");
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(error_record(&output)["kind"], "EOFError");
}

#[test]
fn test_step_limit_flag() {
    let program = encode("while True:\n    pass\n");
    let output = sandpiper(&["--b64", &program, "--step-limit", "100"], "");
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(error_record(&output)["kind"], "ExecutionLimitError");
}

#[test]
fn test_dump_ast_does_not_run() {
    let program = encode("print('hi')\nx = input()\n");
    let output = sandpiper(&["--b64", &program, "--dump-ast"], "");
    assert_eq!(output.status.code(), Some(0));
    let dump = stdout(&output);
    assert!(!dump.contains("hi\n"));
    assert!(dump.contains("(await input())"));
}

#[test]
fn test_bad_base64_is_a_usage_error() {
    let output = sandpiper(&["--b64", "@@@"], "");
    assert_eq!(output.status.code(), Some(2));
}
