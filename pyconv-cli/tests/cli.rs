use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn cli() -> Command {
    Command::cargo_bin("pyconv-cli").expect("binary exists")
}

#[test]
fn converts_file_to_c() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("input.py");
    fs::write(&input_path, "x = 5\nprint(x)\n").expect("write input");
    let output_path = dir.path().join("out").join("main.c");

    cli()
        .arg("--input")
        .arg(&input_path)
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success()
        .stderr(predicate::str::is_empty());

    let code = fs::read_to_string(&output_path).expect("read output");
    assert!(code.contains("int x = 5;"));
    assert!(code.contains("printf(\"%d\\n\", x);"));
}

#[test]
fn converts_stdin_to_cpp_on_stdout() {
    cli()
        .args(["--target", "cpp"])
        .write_stdin("def add(a, b):\n    return a + b\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("int add(int a, int b) {"));
}

#[test]
fn prints_warnings_and_still_converts() {
    cli()
        .write_stdin("class Foo:\n    pass\nx = 1\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("// unsupported class definition"))
        .stderr(predicate::str::contains(
            "<stdin>:1:1: warning[W0001]: class definition is not supported",
        ));
}

#[test]
fn fails_on_fatal_conditions() {
    cli()
        .write_stdin("print(y)\n")
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("fatal[E0002]: undeclared name `y`"));
}

#[test]
fn honours_depth_and_indent_flags() {
    cli()
        .args(["--indent", "2"])
        .write_stdin("if 1:\n    x = 1\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("\n  if (1) {\n    int x = 1;\n"));

    cli()
        .args(["--max-depth", "2"])
        .write_stdin("if 1:\n    if 1:\n        if 1:\n            pass\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("nesting depth exceeds the limit of 2"));
}

#[test]
fn answers_json_requests() {
    cli()
        .arg("--json")
        .write_stdin(r#"{"sourceText": "print(1)\n", "target": "CPP"}"#)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"generatedCode\""))
        .stdout(predicate::str::contains("std::cout << 1 << std::endl;"))
        .stdout(predicate::str::contains("\"success\": true"));

    cli()
        .arg("--json")
        .write_stdin(r#"{"sourceText": "f(1)\n", "target": "C"}"#)
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"error\": \"undeclared name `f`\""));
}

#[test]
fn rejects_malformed_json_requests() {
    cli()
        .arg("--json")
        .write_stdin("{\"target\": \"C\"}")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a valid conversion request"));
}

#[test]
fn reports_missing_input_file() {
    let dir = tempdir().expect("tempdir");
    cli()
        .arg("--input")
        .arg(dir.path().join("missing.py"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read input file"));
}
