//! Analytics engine: descriptive statistics per numeric field, plus the
//! mode-centred convex probability model.

use crate::core::engine::dates::is_date_like;
use crate::error::{PipeError, PipeResult};
use crate::types::{format_number, is_numeric_text, Cell, SourceTable};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

//==============================================================================
// Parameters
//==============================================================================

/// Shape of the convex probability model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvexParams {
    /// The model applies only when the distinct count exceeds this
    pub min_distinct_exclusive: usize,
    /// ... and does not exceed this
    pub max_distinct: usize,
    /// Probability range interpolated over values below the mode
    pub lower: (f64, f64),
    /// Probability range interpolated over the mode and above
    pub upper: (f64, f64),
}

impl Default for ConvexParams {
    fn default() -> Self {
        Self {
            min_distinct_exclusive: 4,
            max_distinct: 16,
            lower: (0.0, 1.0),
            upper: (5.0, 100.0),
        }
    }
}

impl ConvexParams {
    pub fn validate(&self) -> PipeResult<()> {
        if self.min_distinct_exclusive >= self.max_distinct {
            return Err(PipeError::Config(format!(
                "convex: min_distinct_exclusive ({}) must be below max_distinct ({})",
                self.min_distinct_exclusive, self.max_distinct
            )));
        }
        let bounds = [self.lower.0, self.lower.1, self.upper.0, self.upper.1];
        if bounds.iter().any(|b| !b.is_finite()) {
            return Err(PipeError::Config(
                "convex: probability bounds must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

//==============================================================================
// Results
//==============================================================================

/// Most frequent value, or every value sharing the top frequency (ascending)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Mode {
    Single(f64),
    Multiple(Vec<f64>),
}

impl Mode {
    /// The mode, or the smallest of tied modes
    pub fn primary(&self) -> f64 {
        match self {
            Mode::Single(v) => *v,
            Mode::Multiple(values) => values.first().copied().unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnFormat {
    Integer,
    Float,
}

/// A `mean ± k·σ` interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldAnalytics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub mode: Mode,
    /// Population variance
    pub variance: f64,
    pub std_deviation: f64,
    pub two_std_deviations: Band,
    pub three_std_deviations: Band,
    pub sum: f64,
    pub count: usize,
    /// Number of distinct values
    pub unique: usize,
    pub ytd_factor: u32,
    pub format: ColumnFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_values: Option<Vec<f64>>,
    /// `'value'` -> probability, present only when the model applies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convex_probability: Option<IndexMap<String, f64>>,
}

/// Field name -> analytics for one source
pub type SourceAnalytics = IndexMap<String, FieldAnalytics>;

/// Analytics for every source of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalyticsReport {
    sources: IndexMap<String, SourceAnalytics>,
}

impl AnalyticsReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: impl Into<String>, analytics: SourceAnalytics) {
        self.sources.insert(source.into(), analytics);
    }

    pub fn source(&self, name: &str) -> Option<&SourceAnalytics> {
        self.sources.get(name)
    }

    pub fn field(&self, source: &str, field: &str) -> Option<&FieldAnalytics> {
        self.sources.get(source).and_then(|s| s.get(field))
    }

    pub fn sources(&self) -> impl Iterator<Item = (&String, &SourceAnalytics)> {
        self.sources.iter()
    }

    pub fn into_inner(self) -> IndexMap<String, SourceAnalytics> {
        self.sources
    }
}

//==============================================================================
// Field classification and coercion
//==============================================================================

fn starts_with_digit(text: &str) -> bool {
    text.trim().starts_with(|c: char| c.is_ascii_digit())
}

/// Every value is a number, blank, or text led by a digit; none is a date
pub fn is_numeric_field(values: &[&Cell]) -> bool {
    let all_numeric = values.iter().all(|cell| match cell {
        Cell::Number(_) => true,
        c if c.is_blank() => true,
        Cell::Text(s) => starts_with_digit(s),
        Cell::Null => true,
    });
    let any_date = values
        .iter()
        .any(|cell| matches!(cell, Cell::Text(s) if is_date_like(s)));
    all_numeric && !any_date
}

/// Numeric reading of a cell: `"3W"` reads as `3.5`, blanks read as nothing
pub fn to_numeric(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Number(n) => Some(*n),
        c if c.is_blank() => None,
        Cell::Text(s) => {
            let t = s.trim();
            if is_numeric_text(t) {
                return t.parse().ok();
            }
            let digits: String = t.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                return None;
            }
            let whole: f64 = digits.parse().ok()?;
            Some(if digits.len() < t.len() { whole + 0.5 } else { whole })
        }
        Cell::Null => None,
    }
}

/// 12 for month-to-date fields, 365 for daily fields, otherwise 1
pub fn ytd_factor(field: &str) -> u32 {
    let lower = field.to_lowercase();
    if lower.contains("mtd") {
        12
    } else if lower.contains("day") || lower.contains("daily") {
        365
    } else {
        1
    }
}

pub fn column_format(values: &[f64]) -> ColumnFormat {
    let integers = values.iter().filter(|v| v.fract() == 0.0).count();
    let floats = values.len() - integers;
    if floats > integers {
        ColumnFormat::Float
    } else {
        ColumnFormat::Integer
    }
}

//==============================================================================
// Statistics
//==============================================================================

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Median of values already sorted ascending
fn median_sorted(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

/// Mode of values already sorted ascending
fn mode_sorted(sorted: &[f64]) -> Mode {
    let mut runs: Vec<(f64, usize)> = Vec::new();
    for &v in sorted {
        match runs.last_mut() {
            Some((value, count)) if *value == v => *count += 1,
            _ => runs.push((v, 1)),
        }
    }
    let top = runs.iter().map(|(_, c)| *c).max().unwrap_or(0);
    let modes: Vec<f64> = runs
        .into_iter()
        .filter(|(_, c)| *c == top)
        .map(|(v, _)| v)
        .collect();
    match modes.as_slice() {
        [single] => Mode::Single(*single),
        _ => Mode::Multiple(modes),
    }
}

/// Mode of unsorted values; ties keep every value, ascending
pub fn mode(values: &[f64]) -> Mode {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    mode_sorted(&sorted)
}

pub fn variance(values: &[f64]) -> f64 {
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

fn interpolate(start: f64, end: f64, steps: usize) -> Vec<f64> {
    match steps {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (steps - 1) as f64;
            (0..steps).map(|i| start + i as f64 * step).collect()
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Probability per distinct value: the values below the (truncated) mode
/// climb across `lower`, the rest climb steeply across `upper`
pub fn convex_probability(
    mode: f64,
    distinct: &[f64],
    params: &ConvexParams,
) -> IndexMap<String, f64> {
    let unique = distinct.len();
    let split = (mode.trunc().max(0.0) as usize).min(unique);
    let first = interpolate(params.lower.0, params.lower.1, split);
    let second = interpolate(params.upper.0, params.upper.1, unique - split);

    distinct
        .iter()
        .zip(first.into_iter().chain(second))
        .map(|(value, p)| (format!("'{}'", format_number(*value)), round2(p)))
        .collect()
}

/// Statistics of one field's numeric values; `None` when there are none
pub fn analyze_values(field: &str, values: &[f64], params: &ConvexParams) -> Option<FieldAnalytics> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mut distinct = sorted.clone();
    distinct.dedup();

    let mean = mean(values);
    let variance = variance(values);
    let std_deviation = variance.sqrt();
    let median = median_sorted(&sorted);
    let mode = mode_sorted(&sorted);
    let unique = distinct.len();

    let convex_applies = unique > params.min_distinct_exclusive
        && unique <= params.max_distinct
        && median.trunc() < unique as f64 - 1.0;
    let (unique_values, convex) = if convex_applies {
        let probabilities = convex_probability(mode.primary(), &distinct, params);
        (Some(distinct), Some(probabilities))
    } else {
        (None, None)
    };

    Some(FieldAnalytics {
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        mean,
        median,
        mode,
        variance,
        std_deviation,
        two_std_deviations: Band {
            lower: mean - 2.0 * std_deviation,
            upper: mean + 2.0 * std_deviation,
        },
        three_std_deviations: Band {
            lower: mean - 3.0 * std_deviation,
            upper: mean + 3.0 * std_deviation,
        },
        sum: values.iter().sum(),
        count: values.len(),
        unique,
        ytd_factor: ytd_factor(field),
        format: column_format(values),
        unique_values,
        convex_probability: convex,
    })
}

/// Analytics for every numeric field of a table, in header order
pub fn analyze_table(table: &SourceTable, params: &ConvexParams) -> SourceAnalytics {
    let mut analytics = SourceAnalytics::new();

    for header in &table.headers {
        let cells = table.column(header);
        if !is_numeric_field(&cells) {
            tracing::debug!(source = %table.name, field = %header, "skipping non-numeric field");
            continue;
        }
        let values: Vec<f64> = cells.iter().filter_map(|c| to_numeric(c)).collect();
        if let Some(field) = analyze_values(header, &values, params) {
            analytics.insert(header.clone(), field);
        }
    }

    analytics
}

/// Analytics for a set of tables
pub fn compute_analytics<'a>(
    tables: impl IntoIterator<Item = &'a SourceTable>,
    params: &ConvexParams,
) -> AnalyticsReport {
    let mut report = AnalyticsReport::new();
    for table in tables {
        report.insert(table.name.clone(), analyze_table(table, params));
    }
    report
}
