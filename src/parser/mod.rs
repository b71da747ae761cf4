//! Tabular parser and run-file loading
//!
//! The tabular parser is deliberately lenient: it never fails on malformed
//! quoting and recovers rows on a best-effort basis.

pub mod config;

use crate::error::PipeResult;
use crate::types::{Cell, Record, SourceTable};
use std::path::Path;

pub use config::{load_run_config, RunConfig};

/// Rows split into trimmed field strings, header row first
fn split_rows(text: &str) -> Vec<Vec<String>> {
    let chars: Vec<char> = text.chars().collect();
    let mut rows = Vec::new();
    let mut current_row: Vec<String> = Vec::new();
    let mut current_field = String::new();
    let mut in_quotes = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' if in_quotes && chars.get(i + 1) == Some(&'"') => {
                // Doubled quote inside a quoted field
                current_field.push('"');
                i += 1;
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                current_row.push(current_field.trim().to_string());
                current_field.clear();
            }
            '\n' | '\r' if !in_quotes => {
                // Blank lines and the second half of CRLF produce nothing
                if !current_field.is_empty() || !current_row.is_empty() {
                    current_row.push(current_field.trim().to_string());
                    current_field.clear();
                    rows.push(std::mem::take(&mut current_row));
                }
            }
            _ => current_field.push(c),
        }
        i += 1;
    }

    // Final row without a trailing line terminator
    if !current_field.is_empty() || !current_row.is_empty() {
        current_row.push(current_field.trim().to_string());
        rows.push(current_row);
    }

    rows
}

fn build_record(headers: &[String], row: &[String]) -> Record {
    headers
        .iter()
        .enumerate()
        .map(|(j, header)| {
            let value = match row.get(j) {
                Some(field) => Cell::from_field(field),
                None => Cell::Null,
            };
            (header.clone(), value)
        })
        .collect()
}

/// Parse delimited text into a named source table.
///
/// The first completed row becomes the header set; every later row becomes a
/// record keyed by header position. A header-only input yields zero records.
pub fn parse_table(name: &str, text: &str) -> SourceTable {
    let mut rows = split_rows(text).into_iter();
    let headers = rows.next().unwrap_or_default();
    let records: Vec<Record> = rows.map(|row| build_record(&headers, &row)).collect();
    tracing::debug!(
        source = name,
        headers = headers.len(),
        records = records.len(),
        "parsed source table"
    );
    SourceTable::new(name, headers, records)
}

/// Parse delimited text into records only
pub fn parse_csv(text: &str) -> Vec<Record> {
    parse_table("", text).records
}

/// Read and parse a file synchronously
pub fn load_table(name: &str, path: &Path) -> PipeResult<SourceTable> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_table(name, &content))
}

/// Read and parse a file on the async runtime
pub async fn read_table(name: String, path: std::path::PathBuf) -> PipeResult<SourceTable> {
    let content = tokio::fs::read_to_string(&path).await?;
    Ok(parse_table(&name, &content))
}
