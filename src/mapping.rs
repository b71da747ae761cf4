//! Label mappings applied to a finished report
//!
//! Two kinds of two-column lookup tables are supported: a group label table
//! (first column is the group key, second the label) and a legend table
//! keyed by whichever of its two columns is numeric.

use crate::types::{format_number, is_numeric_text, Cell, Record};
use indexmap::IndexMap;
use regex::Regex;
use std::sync::OnceLock;

fn zip_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{5}").expect("valid zip regex"))
}

fn first_two(record: &Record) -> Option<(&Cell, &Cell)> {
    let mut values = record.iter().map(|(_, v)| v);
    Some((values.next()?, values.next()?))
}

fn unquoted(cell: &Cell) -> String {
    cell.to_display().replace('\'', "")
}

/// Group key -> label, from the first two columns of each row
pub fn label_mapping(records: &[Record]) -> IndexMap<String, String> {
    records
        .iter()
        .filter_map(first_two)
        .map(|(key, label)| (unquoted(key), unquoted(label)))
        .collect()
}

/// Numeric value -> label. Rows where neither column is numeric are skipped.
pub fn create_mapping(records: &[Record]) -> IndexMap<String, String> {
    let mut mapping = IndexMap::new();
    for (first, second) in records.iter().filter_map(first_two) {
        match (first, second) {
            (Cell::Number(n), label) | (label, Cell::Number(n)) => {
                mapping.insert(format_number(*n), label.to_display());
            }
            _ => {}
        }
    }
    mapping
}

/// Normalize a displayed value to the key format of a legend mapping:
/// a ZIP+4 keeps its 5-digit prefix, leading zeros and quotes are dropped,
/// and numeric text is canonicalized.
pub fn normalize_legend_value(value: &str) -> String {
    let mut text = value.trim().to_string();
    if let Some(zip) = zip_regex().find(&text) {
        text = zip.as_str().to_string();
    }
    let text: String = text
        .trim_start_matches('0')
        .chars()
        .filter(|c| *c != '\'' && *c != '"')
        .collect();

    if is_numeric_text(&text) {
        if let Ok(n) = text.trim().parse::<f64>() {
            return format_number(n);
        }
    }
    text
}

/// `label (value)` when the normalized value has a legend entry
pub fn apply_legend(mapping: &IndexMap<String, String>, value: &str) -> Option<String> {
    let key = normalize_legend_value(value);
    mapping
        .get(&key)
        .filter(|label| !label.is_empty())
        .map(|label| format!("{} ({})", label, key))
}

/// `label (tally)` when the group key has a label
pub fn label_group(mapping: &IndexMap<String, String>, key: &str, tally: u32) -> Option<String> {
    mapping
        .get(key)
        .filter(|label| !label.is_empty())
        .map(|label| format!("{} ({})", label, tally))
}
