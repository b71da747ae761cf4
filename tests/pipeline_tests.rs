//! End-to-end pipeline tests: run files, sources on disk, reports

use pipeforge::core::library::LibrarySet;
use pipeforge::core::run::{execute, run_tables, RunRequest};
use pipeforge::error::PipeError;
use pipeforge::mapping::label_mapping;
use pipeforge::parser::{load_run_config, load_table, parse_table};
use pipeforge::report::build_report;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn test_data_path(filename: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("test-data");
    path.push(filename);
    path
}

fn request_for(run_file: &str) -> RunRequest {
    let path = test_data_path(run_file);
    let config = load_run_config(&path).unwrap();
    RunRequest::from_config(&config, path.parent().unwrap()).unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════
// RUN FILES
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_fee_run_groups_by_account() {
    let output = execute(request_for("fees_run.yaml")).await.unwrap();

    let keys: Vec<&str> = output.results.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["A100", "A200", "A300"]);

    // The first row's block is true, so every block of the group is
    assert_eq!(output.results["A100"].result, 25.0);
    assert_eq!(output.results["A100"].tally, 1);
    assert_eq!(output.results["A100"].units, 2);
    assert_eq!(output.results["A100"].presentation["checking.branch"].to_string(), "12, 12");

    assert_eq!(output.results["A200"].result, 40.0);
    assert_eq!(output.results["A300"].result, 0.0);
    assert_eq!(output.results["A300"].tally, 0);
}

#[tokio::test]
async fn test_library_run() {
    let output = execute(request_for("interest_run.yaml")).await.unwrap();

    assert_eq!(output.results["A100"].result, 950.25);
    assert_eq!(output.results["A200"].result, 4080.0);
    assert_eq!(output.results["A300"].result, 25.0);
}

#[tokio::test]
async fn test_run_analytics_cover_numeric_fields() {
    let output = execute(request_for("fees_run.yaml")).await.unwrap();

    let fields: Vec<&String> = output.analytics.source("checking").unwrap().keys().collect();
    assert_eq!(fields, vec!["Branch", "Avg_Balance", "Late_Charges"]);

    let balance = output.analytics.field("checking", "Avg_Balance").unwrap();
    assert_eq!(balance.count, 4);
    assert_eq!(balance.max, 8000.0);
}

#[tokio::test]
async fn test_report_from_run() {
    let request = request_for("fees_run.yaml");
    let presentation = request.presentation.clone();
    let output = execute(request).await.unwrap();

    let labels = label_mapping(&load_table("labels", &test_data_path("labels.csv")).unwrap().records);
    let report = build_report(&output.results, &presentation, "account", Some(&labels));

    let rendered: Vec<(&str, f64)> = report
        .rows
        .iter()
        .map(|r| (r.label.as_str(), r.result))
        .collect();
    assert_eq!(rendered, vec![("Harbor (1)", 40.0), ("Main Street (1)", 25.0)]);
    assert_eq!(report.totals.result, 65.0);
    assert_eq!(report.rows[1].cells, vec!["12"]);
}

// ═══════════════════════════════════════════════════════════════════════════
// SOURCES ON DISK
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_multiple_sources_share_groups() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("checking.csv"), "Account,Balance\nA1,100\nA2,5\n").unwrap();
    fs::write(dir.path().join("savings.csv"), "Acct_Account,Savings_Balance\nA1,900\n").unwrap();

    let request = RunRequest::new("checking.balance + savings.balance", "account")
        .with_source_path("checking", dir.path().join("checking.csv"))
        .with_source_path("savings", dir.path().join("savings.csv"));
    let output = execute(request).await.unwrap();

    // Each row contributes its own source's value; the other source is null
    assert_eq!(output.results["A1"].result, 1000.0);
    assert_eq!(output.results["A1"].units, 2);
    assert_eq!(output.results["A1"].tally, 2);
    assert_eq!(output.results["A2"].result, 5.0);
}

#[tokio::test]
async fn test_units_in_formula() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("loans.csv");
    fs::write(&path, "Branch,Amount\nN,10\nN,20\nS,7\n").unwrap();

    let request = RunRequest::new("loans.amount / units", "branch").with_source_path("loans", &path);
    let output = execute(request).await.unwrap();

    // Each addend is divided by the group's row count: an average
    assert_eq!(output.results["N"].result, 15.0);
    assert_eq!(output.results["S"].result, 7.0);
}

#[tokio::test]
async fn test_run_file_with_cli_style_overrides() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("other.csv"), "Account,Avg_Balance,Fee\nZ9,5000,3\n").unwrap();

    let request = request_for("fees_run.yaml")
        .with_source_path("checking", dir.path().join("other.csv"));
    let output = execute(request).await.unwrap();

    assert_eq!(output.results.len(), 1);
    assert_eq!(output.results["Z9"].result, 3.0);
}

#[tokio::test]
async fn test_header_only_source_yields_no_groups() {
    let request = RunRequest::new("checking.balance", "account")
        .with_source_text("checking", "Account,Balance\n");
    let output = execute(request).await.unwrap();
    assert!(output.results.is_empty());
    assert!(output.analytics.source("checking").unwrap().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
// LARGE AND AWKWARD INPUTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_large_single_group() {
    let rows: u32 = 20_000;
    let mut csv = String::from("Branch,Balance\n");
    for _ in 0..rows {
        csv.push_str("North,1\n");
    }

    let request = RunRequest::new("checking.balance", "branch").with_source_text("checking", csv);
    let output = execute(request).await.unwrap();

    let north = &output.results["North"];
    assert_eq!(north.result, rows as f64);
    assert_eq!(north.tally, rows);
    assert_eq!(north.units, rows);
}

#[tokio::test]
async fn test_text_ending_in_date_stays_text() {
    let request = RunRequest::new("checking.balance + (checking.note == 'x')", "account")
        .with_source_text("checking", "Account,Note,Balance\nA1,Opened 2024-01-01,100\n");
    let output = execute(request).await.unwrap();

    assert_eq!(output.results["A1"].result, 100.0);
    assert_eq!(output.results["A1"].tally, 1);
}

#[tokio::test]
async fn test_failing_library_body_degrades_per_row() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("broken.yaml"),
        "name: broken\nfunctions:\n  fee:\n    params: [balance]\n    expression: \"balance * rat\"\n",
    )
    .unwrap();
    let libraries = LibrarySet::from_specs(&["broken.yaml".to_string()], dir.path()).unwrap();

    let request = RunRequest::new("checking.fee + checking.balance", "account")
        .with_source_text("checking", "Account,Balance\nA1,200\nA2,30\n")
        .with_libraries(libraries);
    let output = execute(request).await.unwrap();

    assert_eq!(output.results["A1"].result, 200.0);
    assert_eq!(output.results["A1"].tally, 1);
    assert_eq!(output.results["A2"].result, 30.0);
}

// ═══════════════════════════════════════════════════════════════════════════
// FAILURES
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_missing_source_file_fails_whole_run() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("checking.csv"), "Account,Balance\nA1,1\n").unwrap();

    let request = RunRequest::new("checking.balance + savings.balance", "account")
        .with_source_path("checking", dir.path().join("checking.csv"))
        .with_source_path("savings", dir.path().join("missing.csv"));
    let err = execute(request).await.unwrap_err();
    assert!(matches!(err, PipeError::Io(_)));
}

#[test]
fn test_run_tables_reports_unsupplied_source() {
    let table = parse_table("checking", "Account,Balance\nA1,1\n");
    let request = RunRequest::new("checking.balance + savings.balance", "account")
        .with_source_text("checking", "");
    let err = run_tables(&request, &[table]).unwrap_err();
    assert!(matches!(err, PipeError::MissingInput(_)));
    assert!(err.to_string().contains("savings"));
}
