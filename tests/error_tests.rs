//! Error handling tests

use pipeforge::core::library::declarative::parse_library;
use pipeforge::core::library::LibrarySet;
use pipeforge::core::run::{execute, RunRequest};
use pipeforge::error::PipeError;
use pipeforge::parser::RunConfig;
use std::path::Path;

#[test]
fn test_error_display_messages() {
    assert_eq!(
        PipeError::MissingInput("source 'savings'".to_string()).to_string(),
        "Missing input: source 'savings'"
    );
    assert_eq!(
        PipeError::InvalidParameter("balance".to_string()).to_string(),
        "Invalid parameter: balance"
    );
    assert_eq!(
        PipeError::Library("x".to_string()).to_string(),
        "Library error: x"
    );
}

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err: PipeError = io.into();
    assert!(matches!(err, PipeError::Io(_)));
    assert!(err.to_string().contains("gone"));
}

#[test]
fn test_yaml_error_conversion() {
    let err = RunConfig::parse("formula: [unclosed").unwrap_err();
    assert!(matches!(err, PipeError::Yaml(_)));
}

#[test]
fn test_invalid_convex_params_rejected() {
    let err = RunConfig::parse(
        "formula: a.b\ngroup_by: id\nconvex:\n  min_distinct_exclusive: 20\n  max_distinct: 16\n",
    )
    .unwrap_err();
    assert!(matches!(err, PipeError::Config(_)));
}

#[test]
fn test_unknown_library_file() {
    let err = LibrarySet::from_specs(&["no/such/lib.yaml".to_string()], Path::new("/tmp"))
        .unwrap_err();
    assert!(matches!(err, PipeError::Library(_)));
}

#[test]
fn test_library_with_empty_expression() {
    let err = parse_library("functions:\n  f:\n    expression: ''\n", "bad").unwrap_err();
    assert!(matches!(err, PipeError::Library(_)));
}

#[tokio::test]
async fn test_missing_input_is_fatal() {
    let request = RunRequest::new("input.rate(rate) * 2", "id");
    let err = execute(request).await.unwrap_err();
    assert!(matches!(err, PipeError::MissingInput(_)));
    assert!(err.to_string().contains("rate"));
}

#[tokio::test]
async fn test_classification_error_is_fatal_for_run() {
    let mut libraries = LibrarySet::new();
    libraries.add(pipeforge::core::library::builtins::ai());

    // Balance is text on the only row, so the classification cannot run
    let request = RunRequest::new("checking.isBusiness", "account")
        .with_source_text(
            "checking",
            "Account,Balance,ConsumerMaximum,AnnualDeposits\nA1,lots,10,5\n",
        )
        .with_libraries(libraries);
    let err = execute(request).await.unwrap_err();
    assert!(matches!(err, PipeError::InvalidParameter(_)));
}

#[tokio::test]
async fn test_unresolvable_tokens_degrade_to_zero() {
    let request = RunRequest::new("checking.nothing + 1", "account")
        .with_source_text("checking", "Account,Balance\nA1,5\n");
    let output = execute(request).await.unwrap();
    assert_eq!(output.results["A1"].result, 1.0);
}
