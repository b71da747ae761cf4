//! Result report: groups sorted by result with formatted presentation columns
//! and a totals row.

use crate::core::analytics::mode;
use crate::core::binding::{GroupResult, PresentationValues};
use crate::mapping::label_group;
use crate::types::{format_number, PresentationConfig};
use indexmap::IndexMap;
use serde::Serialize;

/// Largest value still displayed as an integer code
pub const MAX_INTEGER_CODE: f64 = 9999.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    /// Codes and counts, displayed by their mode
    Integer,
    /// Amounts, displayed and totalled as sums
    Currency,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportColumn {
    pub field: String,
    pub heading: String,
    pub kind: ColumnKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub key: String,
    /// `key (tally)`, or `label (tally)` when a label mapping applies
    pub label: String,
    pub tally: u32,
    pub cells: Vec<String>,
    pub result: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportTotals {
    pub tally: u32,
    /// Sum per column; `None` for integer columns
    pub columns: Vec<Option<f64>>,
    pub result: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub group_heading: String,
    pub columns: Vec<ReportColumn>,
    pub rows: Vec<ReportRow>,
    pub totals: ReportTotals,
}

/// Numeric values of a presentation field; `None` if any is not numeric
fn numeric_values(values: &PresentationValues) -> Option<Vec<f64>> {
    values
        .values()
        .iter()
        .map(|v| v.trim().parse::<f64>().ok().filter(|n| n.is_finite()))
        .collect()
}

/// Currency wins when more values look like amounts than like integer codes
fn classify_column(results: &[(&String, &GroupResult)], field: &str) -> ColumnKind {
    let (mut integers, mut amounts) = (0usize, 0usize);
    for (_, group) in results {
        let Some(values) = group.presentation.get(field).and_then(numeric_values) else {
            continue;
        };
        if values.iter().all(|v| v.fract() == 0.0 && *v <= MAX_INTEGER_CODE) {
            integers += values.len();
        } else {
            amounts += values.len();
        }
    }
    if amounts > integers {
        ColumnKind::Currency
    } else {
        ColumnKind::Integer
    }
}

/// `$1,234.56`, with a leading minus for negatives
pub fn format_currency(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let digits = (cents / 100).to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

/// Build the report for a run's group results.
///
/// Groups are sorted by descending result and groups whose result is zero are
/// omitted. `labels` maps group keys to display labels.
pub fn build_report(
    results: &IndexMap<String, GroupResult>,
    presentation: &PresentationConfig,
    group_heading: &str,
    labels: Option<&IndexMap<String, String>>,
) -> Report {
    let mut sorted: Vec<(&String, &GroupResult)> = results.iter().collect();
    sorted.sort_by(|a, b| b.1.result.total_cmp(&a.1.result));

    let columns: Vec<ReportColumn> = presentation
        .columns
        .iter()
        .map(|c| ReportColumn {
            field: c.field.clone(),
            heading: c.heading.clone(),
            kind: classify_column(&sorted, &c.field),
        })
        .collect();

    let mut totals = ReportTotals {
        tally: 0,
        columns: columns
            .iter()
            .map(|c| (c.kind == ColumnKind::Currency).then_some(0.0))
            .collect(),
        result: 0.0,
    };

    let mut rows = Vec::new();
    for (key, group) in sorted.into_iter().filter(|(_, g)| g.result != 0.0) {
        let mut cells = Vec::with_capacity(columns.len());
        for (idx, column) in columns.iter().enumerate() {
            let raw = group.presentation.get(&column.field);
            let cell = match (raw.and_then(numeric_values), column.kind) {
                (Some(values), ColumnKind::Integer) => format_number(mode(&values).primary()),
                (Some(values), ColumnKind::Currency) => {
                    let sum: f64 = values.iter().sum();
                    if let Some(Some(total)) = totals.columns.get_mut(idx) {
                        *total += sum;
                    }
                    format_currency(sum)
                }
                (None, _) => raw.map(ToString::to_string).unwrap_or_default(),
            };
            cells.push(cell);
        }

        let label = labels
            .and_then(|m| label_group(m, key, group.tally))
            .unwrap_or_else(|| format!("{} ({})", key, group.tally));

        totals.tally += group.tally;
        totals.result += group.result;
        rows.push(ReportRow {
            key: key.clone(),
            label,
            tally: group.tally,
            cells,
            result: group.result,
        });
    }

    Report {
        group_heading: group_heading.to_string(),
        columns,
        rows,
        totals,
    }
}
