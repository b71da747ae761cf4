//! Binding layer: rewrites `source.field` and `source.function(...)` tokens of
//! a formula into literals for each row, and accumulates one expression per
//! group key.

use crate::core::analytics::AnalyticsReport;
use crate::core::engine::dates::{is_date_like, text_to_days};
use crate::core::engine::{self, Evaluation, ExpressionEngine, Value};
use crate::core::library::{CallContext, FunctionArgs, FunctionDef, LibrarySet};
use crate::error::{PipeError, PipeResult};
use crate::pipes::INPUT_SOURCE;
use crate::resolver::resolve_header;
use crate::types::{format_number, is_numeric_text, Cell, PresentationConfig, Record, SourceTable};
use indexmap::IndexMap;
use regex::{Captures, Regex};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::OnceLock;

/// Group key used when the group-by field cannot be resolved on a row
pub const MISSING_GROUP: &str = "null";

fn call_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\w+\.\w+)\([^)]*\)").expect("valid call regex"))
}

fn reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([A-Za-z_]\w*)\.(\w+)").expect("valid reference regex"))
}

//==============================================================================
// Groups
//==============================================================================

/// Raw values one presentation field collected across a group's rows.
///
/// Serializes as the comma-joined text. Deserializes from that text (as one
/// value) or from a list of values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresentationValues(pub Vec<String>);

impl PresentationValues {
    pub fn values(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for PresentationValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

impl Serialize for PresentationValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PresentationValues {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Joined(String),
            Values(Vec<String>),
        }
        Ok(match Repr::deserialize(deserializer)? {
            Repr::Joined(text) => Self(vec![text]),
            Repr::Values(values) => Self(values),
        })
    }
}

/// Running state of one group key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupAccumulator {
    pub expression: String,
    pub units: u32,
    pub presentation: IndexMap<String, PresentationValues>,
}

impl GroupAccumulator {
    fn push_fragment(&mut self, fragment: &str) {
        if !self.expression.is_empty() {
            self.expression.push_str(" + ");
        }
        self.expression.push_str("( ");
        self.expression.push_str(fragment);
        self.expression.push_str(" )");
        self.units += 1;
    }

    fn push_presentation(&mut self, field: &str, value: &Cell) {
        let text = match value {
            Cell::Null => String::new(),
            other => other.to_display(),
        };
        match self.presentation.get_mut(field) {
            Some(existing) => existing.0.push(text),
            None => {
                let truthy = match value {
                    Cell::Number(n) => *n != 0.0,
                    Cell::Text(s) => !s.is_empty(),
                    Cell::Null => false,
                };
                if truthy {
                    self.presentation
                        .insert(field.to_string(), PresentationValues(vec![text]));
                }
            }
        }
    }

    /// Evaluate the accumulated expression with `units` bound
    pub fn finalize(&self, engine: &ExpressionEngine) -> GroupResult {
        let Evaluation {
            result,
            non_null_count,
        } = engine
            .clone()
            .with_scalar(engine::UNITS, Value::Number(f64::from(self.units)))
            .evaluate(&self.expression);
        GroupResult {
            result,
            tally: non_null_count,
            units: self.units,
            presentation: self.presentation.clone(),
        }
    }
}

/// Final per-group output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupResult {
    pub result: f64,
    pub tally: u32,
    pub units: u32,
    #[serde(flatten)]
    pub presentation: IndexMap<String, PresentationValues>,
}

//==============================================================================
// Literals
//==============================================================================

/// Formula literal for a field value
pub fn field_literal(cell: &Cell, engine: &ExpressionEngine) -> String {
    match cell {
        Cell::Number(n) => format_number(*n),
        c if c.is_blank() => "null".to_string(),
        Cell::Text(s) => {
            if let Some(days) = text_to_days(s, engine.now()) {
                days.to_string()
            } else if is_numeric_text(s) {
                s.trim().to_string()
            } else {
                format!("\"{}\"", s.replace('"', "\"\""))
            }
        }
        Cell::Null => "null".to_string(),
    }
}

/// Formula literal for a function result
pub fn value_literal(value: &Value) -> String {
    match value {
        Value::Number(n) => format_number(*n),
        Value::Boolean(b) => b.to_string(),
        Value::Text(s) => format!("\"{}\"", s.replace('"', "\"\"")),
        Value::Null => "null".to_string(),
    }
}

/// Argument value for a function parameter
fn argument_value(cell: &Cell, engine: &ExpressionEngine) -> Value {
    match cell {
        Cell::Number(n) => Value::Number(*n),
        Cell::Text(s) if is_date_like(s) => text_to_days(s, engine.now())
            .map(|d| Value::Number(d as f64))
            .unwrap_or(Value::Null),
        Cell::Text(s) if is_numeric_text(s) => Value::Number(s.trim().parse().unwrap_or(f64::NAN)),
        Cell::Text(s) => Value::Text(s.trim().to_string()),
        Cell::Null => Value::Null,
    }
}

/// Apply `replace` to every stretch of text outside quoted string literals
fn replace_outside_quotes(text: &str, replace: &mut dyn FnMut(&str) -> PipeResult<String>) -> PipeResult<String> {
    let mut out = String::with_capacity(text.len());
    let mut plain = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '"' && c != '\'' {
            plain.push(c);
            continue;
        }
        out.push_str(&replace(&plain)?);
        plain.clear();

        out.push(c);
        while let Some(inner) = chars.next() {
            out.push(inner);
            if inner == c {
                if chars.peek() == Some(&c) {
                    out.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
        }
    }
    out.push_str(&replace(&plain)?);
    Ok(out)
}

//==============================================================================
// Binder
//==============================================================================

/// Run-scoped binding context
pub struct Binder<'a> {
    pub libraries: &'a LibrarySet,
    pub analytics: &'a AnalyticsReport,
    pub engine: &'a ExpressionEngine,
    /// User inputs as the pseudo-source `input`
    pub inputs: &'a Record,
    pub presentation: &'a PresentationConfig,
    pub group_by: &'a str,
}

impl<'a> Binder<'a> {
    /// Bind one row of `source` into a formula fragment
    pub fn bind_row(&self, formula: &str, source: &str, row: &Record) -> PipeResult<String> {
        let headers = row.headers();
        let input_headers = self.inputs.headers();

        let scrubbed = call_regex().replace_all(formula, "$1");
        let dated = engine::dates::normalize_dates(&scrubbed, self.engine.now());

        let bound = replace_outside_quotes(&dated, &mut |plain: &str| {
            let mut error = None;
            let replaced = reference_regex().replace_all(plain, |caps: &Captures| {
                let (name, token) = (&caps[1], &caps[2]);
                let result = if name == source {
                    self.resolve_token(token, source, row, &headers, &input_headers)
                } else if name == INPUT_SOURCE {
                    self.resolve_token(token, source, self.inputs, &input_headers, &input_headers)
                } else {
                    return caps[0].to_string();
                };
                match result {
                    Ok(literal) => literal,
                    Err(e) => {
                        error.get_or_insert(e);
                        "0".to_string()
                    }
                }
            });
            match error {
                Some(e) => Err(e),
                None => Ok(replaced.into_owned()),
            }
        })?;

        // Anything still shaped like `name.token` belongs to no bound source
        let resolved = replace_outside_quotes(&bound, &mut |plain: &str| {
            Ok(reference_regex()
                .replace_all(plain, |caps: &Captures| {
                    tracing::debug!(reference = &caps[0], "unresolved reference set to null");
                    "null".to_string()
                })
                .into_owned())
        })?;

        tracing::debug!(source, fragment = %resolved, "row bound");
        Ok(resolved)
    }

    fn resolve_token(
        &self,
        token: &str,
        source: &str,
        record: &Record,
        headers: &[String],
        input_headers: &[String],
    ) -> PipeResult<String> {
        if let Some(function) = self.libraries.find(token) {
            return self.call_function(function, source, record, headers, input_headers);
        }

        match resolve_header(headers, token) {
            Some(header) => Ok(field_literal(
                record.get(&header).unwrap_or(&Cell::Null),
                self.engine,
            )),
            None => {
                tracing::warn!(source, token, "token unresolved, substituting 0");
                Ok("0".to_string())
            }
        }
    }

    fn call_function(
        &self,
        function: &FunctionDef,
        source: &str,
        record: &Record,
        headers: &[String],
        input_headers: &[String],
    ) -> PipeResult<String> {
        let mut args = FunctionArgs::new();

        for param in function.row_params() {
            let from_row = resolve_header(headers, &param.name).and_then(|h| record.get(&h));
            let from_inputs =
                || resolve_header(input_headers, &param.name).and_then(|h| self.inputs.get(&h));

            match from_row.or_else(from_inputs) {
                Some(cell) => args.insert(param.name.clone(), argument_value(cell, self.engine)),
                None if param.optional => {
                    if let Some(default) = param.default_value() {
                        args.insert(param.name.clone(), default);
                    }
                }
                None => {
                    tracing::debug!(
                        function = %function.name,
                        param = %param.name,
                        "missing required argument, substituting 0"
                    );
                    return Ok("0".to_string());
                }
            }
        }

        let ctx = CallContext {
            source,
            analytics: self.analytics,
            engine: self.engine,
        };
        match function.call(&ctx, &args) {
            Ok(value) => {
                tracing::debug!(function = %function.name, result = ?value, "function bound");
                Ok(value_literal(&value))
            }
            Err(e @ (PipeError::Library(_) | PipeError::Eval(_) | PipeError::Parse(_))) => {
                tracing::warn!(
                    function = %function.name,
                    source,
                    error = %e,
                    "function failed, substituting 0"
                );
                Ok("0".to_string())
            }
            Err(e) => Err(e),
        }
    }

    /// Group key of a row: the display value of the group-by field
    pub fn group_key(&self, row: &Record) -> String {
        resolve_header(&row.headers(), self.group_by)
            .and_then(|h| row.get(&h))
            .map(Cell::to_display)
            .unwrap_or_else(|| MISSING_GROUP.to_string())
    }

    fn accumulate_presentation(&self, group: &mut GroupAccumulator, source: &str, row: &Record) {
        let headers = row.headers();
        for column in &self.presentation.columns {
            if let Some((prefix, _)) = column.field.split_once('.') {
                if prefix != source {
                    continue;
                }
            }
            if let Some(value) = resolve_header(&headers, &column.field).and_then(|h| row.get(&h)) {
                group.push_presentation(&column.field, value);
            }
        }
    }

    /// Bind every row of a table into the group map
    pub fn accumulate_table(
        &self,
        formula: &str,
        table: &SourceTable,
        groups: &mut IndexMap<String, GroupAccumulator>,
    ) -> PipeResult<()> {
        for row in &table.records {
            let fragment = self.bind_row(formula, &table.name, row)?;
            let group = groups.entry(self.group_key(row)).or_default();
            group.push_fragment(&fragment);
            self.accumulate_presentation(group, &table.name, row);
        }
        tracing::debug!(source = %table.name, rows = table.row_count(), groups = groups.len(), "source bound");
        Ok(())
    }

    /// Bind a formula that references inputs only, as a single group
    pub fn accumulate_inputs(
        &self,
        formula: &str,
        groups: &mut IndexMap<String, GroupAccumulator>,
    ) -> PipeResult<()> {
        let fragment = self.bind_row(formula, INPUT_SOURCE, self.inputs)?;
        groups
            .entry(INPUT_SOURCE.to_string())
            .or_default()
            .push_fragment(&fragment);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::library::{builtins, FunctionLibrary};
    use crate::parser::parse_table;
    use crate::types::PresentationColumn;
    use chrono::{TimeZone, Utc};

    struct Fixture {
        libraries: LibrarySet,
        analytics: AnalyticsReport,
        engine: ExpressionEngine,
        inputs: Record,
        presentation: PresentationConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let mut libraries = LibrarySet::new();
            libraries.add(builtins::financial());
            let mut inputs = Record::new();
            inputs.insert("rate", Cell::Number(0.5));
            inputs.insert("region", Cell::Text("west".to_string()));
            Self {
                libraries,
                analytics: AnalyticsReport::new(),
                engine: ExpressionEngine::new()
                    .with_now(Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()),
                inputs,
                presentation: PresentationConfig {
                    columns: vec![PresentationColumn::new("checking.branch", "Branch")],
                },
            }
        }

        fn binder(&self) -> Binder<'_> {
            Binder {
                libraries: &self.libraries,
                analytics: &self.analytics,
                engine: &self.engine,
                inputs: &self.inputs,
                presentation: &self.presentation,
                group_by: "account",
            }
        }
    }

    fn row(csv: &str) -> Record {
        parse_table("checking", csv).records.remove(0)
    }

    #[test]
    fn test_bind_fields() {
        let fx = Fixture::new();
        let mut r = Record::new();
        r.insert("Account", Cell::Text("A1".to_string()));
        r.insert("Balance", Cell::Number(1500.0));
        r.insert("Owner", Cell::Text("Pat \"P\"".to_string()));
        r.insert("Opened", Cell::Text("2024-03-15".to_string()));
        r.insert("Late_Charges", Cell::Text(String::new()));
        let bound = fx
            .binder()
            .bind_row(
                "checking.balance + checking.owner + checking.opened + checking.fee",
                "checking",
                &r,
            )
            .unwrap();
        assert_eq!(bound, "1500 + \"Pat \"\"P\"\"\" + 4 + null");
    }

    #[test]
    fn test_unresolved_token_is_zero() {
        let fx = Fixture::new();
        let r = row("Account,Balance\nA1,10\n");
        let bound = fx
            .binder()
            .bind_row("checking.nothing * 2", "checking", &r)
            .unwrap();
        assert_eq!(bound, "0 * 2");
    }

    #[test]
    fn test_other_sources_become_null() {
        let fx = Fixture::new();
        let r = row("Account,Balance\nA1,10\n");
        let bound = fx
            .binder()
            .bind_row("checking.balance + savings.balance", "checking", &r)
            .unwrap();
        assert_eq!(bound, "10 + null");
    }

    #[test]
    fn test_inputs_and_quoted_text_untouched() {
        let fx = Fixture::new();
        let r = row("Account,Balance\nA1,10\n");
        let bound = fx
            .binder()
            .bind_row(
                "checking.balance * input.rate + ('a.b' == input.region)",
                "checking",
                &r,
            )
            .unwrap();
        assert_eq!(bound, "10 * 0.5 + ('a.b' == \"west\")");
    }

    #[test]
    fn test_function_binding() {
        let fx = Fixture::new();
        let r = row("Account,Balance,Rate\nA1,1000,0.25\n");
        let bound = fx
            .binder()
            .bind_row("checking.interestIncome(balance, rate)", "checking", &r)
            .unwrap();
        assert_eq!(bound, "250");
    }

    #[test]
    fn test_function_params_fall_back_to_inputs() {
        let fx = Fixture::new();
        let r = row("Account,Balance\nA1,1000\n");
        let bound = fx
            .binder()
            .bind_row("checking.interestIncome", "checking", &r)
            .unwrap();
        assert_eq!(bound, "500");
    }

    #[test]
    fn test_function_missing_required_is_zero() {
        let fx = Fixture::new();
        let r = row("Account,Owner\nA1,Pat\n");
        let bound = fx
            .binder()
            .bind_row("checking.interestIncome + 1", "checking", &r)
            .unwrap();
        assert_eq!(bound, "0 + 1");
    }

    #[test]
    fn test_function_errors_propagate() {
        let mut fx = Fixture::new();
        fx.libraries.add(builtins::ai());
        let r = row("Account,Balance,ConsumerMaximum,AnnualDeposits\nA1,abc,10,5\n");
        let result = fx
            .binder()
            .bind_row("checking.isBusiness", "checking", &r);
        assert!(matches!(result, Err(PipeError::InvalidParameter(_))));
    }

    #[test]
    fn test_function_body_error_is_zero() {
        let mut fx = Fixture::new();
        fx.libraries.add(FunctionLibrary::new("fees").with_function(FunctionDef::expression(
            "fee",
            &["balance".to_string()],
            "balance * rat",
        )));
        let r = row("Account,Balance\nA1,200\n");
        let bound = fx
            .binder()
            .bind_row("checking.fee + checking.balance", "checking", &r)
            .unwrap();
        assert_eq!(bound, "0 + 200");
    }

    #[test]
    fn test_accumulate_groups_and_presentation() {
        let fx = Fixture::new();
        let table = parse_table(
            "checking",
            "Account,Balance,Branch\nA1,10,North\nA2,0,\nA1,5,South\n",
        );
        let mut groups = IndexMap::new();
        fx.binder()
            .accumulate_table("checking.balance", &table, &mut groups)
            .unwrap();

        let keys: Vec<&String> = groups.keys().collect();
        assert_eq!(keys, vec!["A1", "A2"]);
        assert_eq!(groups["A1"].expression, "( 10 ) + ( 5 )");
        assert_eq!(groups["A1"].units, 2);
        assert_eq!(groups["A1"].presentation["checking.branch"].to_string(), "North, South");
        assert!(groups["A2"].presentation.is_empty());

        let result = groups["A1"].finalize(&fx.engine);
        assert_eq!(result.result, 15.0);
        assert_eq!(result.tally, 2);
        assert_eq!(result.units, 2);
    }

    #[test]
    fn test_missing_group_field() {
        let fx = Fixture::new();
        let r = row("Balance\n10\n");
        assert_eq!(fx.binder().group_key(&r), MISSING_GROUP);
    }

    #[test]
    fn test_inputs_only_formula() {
        let fx = Fixture::new();
        let mut groups = IndexMap::new();
        fx.binder()
            .accumulate_inputs("input.rate * 10", &mut groups)
            .unwrap();
        let result = groups[INPUT_SOURCE].finalize(&fx.engine);
        assert_eq!(result.result, 5.0);
    }

    #[test]
    fn test_value_literal() {
        assert_eq!(value_literal(&Value::Number(2.5)), "2.5");
        assert_eq!(value_literal(&Value::Boolean(true)), "true");
        assert_eq!(value_literal(&Value::Text("a\"b".to_string())), "\"a\"\"b\"");
        assert_eq!(value_literal(&Value::Null), "null");
    }
}
