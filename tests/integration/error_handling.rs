// tests/integration/error_handling.rs

use std::io::Write;

use tempfile::NamedTempFile;

use stagegate::config::load_and_validate;
use stagegate::errors::StagegateError;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn test_dag_cycle_returns_structured_error() {
    let file = config_file(
        r#"
[task.A]
cmd = "echo A"
after = ["B"]

[task.B]
cmd = "echo B"
after = ["A"]
"#,
    );

    match load_and_validate(file.path()) {
        Err(StagegateError::Cycle(task)) => {
            assert!(task == "A" || task == "B", "unexpected cycle member {task}");
        }
        Err(e) => panic!("Expected Cycle error, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_unknown_dependency_names_both_tasks() {
    let file = config_file(
        r#"
[task.A]
cmd = "echo A"
after = ["NonExistent"]
"#,
    );

    match load_and_validate(file.path()) {
        Err(StagegateError::UnknownTask { task, dependency }) => {
            assert_eq!(task, "A");
            assert_eq!(dependency, "NonExistent");
        }
        other => panic!("Expected UnknownTask error, got: {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_invalid_toml_returns_toml_error() {
    let file = config_file("[task.A\ncmd = ");

    let result = load_and_validate(file.path());
    assert!(matches!(result, Err(StagegateError::TomlError(_))));
}

#[test]
fn test_unknown_gate_kind_is_rejected() {
    let file = config_file(
        r#"
[task.A]
cmd = "echo rows=1"

[[task.A.gate]]
kind = "freshness"
"#,
    );

    assert!(load_and_validate(file.path()).is_err());
}

#[test]
fn test_bad_timeout_is_a_config_error() {
    let file = config_file(
        r#"
[task.A]
cmd = "echo A"
timeout = "soon"
"#,
    );

    match load_and_validate(file.path()) {
        Err(StagegateError::ConfigError(msg)) => {
            assert!(msg.contains("task 'A'"), "{msg}");
            assert!(msg.contains("timeout"), "{msg}");
        }
        other => panic!("Expected ConfigError, got: {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_missing_config_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Stagegate.toml");

    let err = load_and_validate(&path).unwrap_err();
    assert!(err.to_string().contains("Stagegate.toml"), "{err}");
}
