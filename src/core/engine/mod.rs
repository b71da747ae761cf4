//! Expression engine
//!
//! Evaluates a fully bound formula in explicit stages over the AST:
//!
//! 1. date literals become day offsets (textual, before tokenizing)
//! 2. null-led conditional blocks are forced to `false`
//! 3. conditional blocks are evaluated with truth propagation
//! 4. remaining `null` literals become `0`
//! 5. top-level addends are tallied
//! 6. the whole tree is evaluated with `tally` bound
//!
//! Membership tests are evaluated natively by the evaluator, and characters
//! outside the formula alphabet are dropped by the tokenizer.

pub mod dates;
pub mod evaluator;
pub mod parser;
pub mod tokenizer;

#[cfg(test)]
mod tests;

use crate::error::PipeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use evaluator::{evaluate, EvalContext, EvalError, Value};
pub use parser::{parse, Condition, Expr, ParseError};
pub use tokenizer::{tokenize, Token, TokenizeError};

/// Scalar bound to the number of non-null addends
pub const TALLY: &str = "tally";
/// Scalar bound to the number of rows accumulated into a group
pub const UNITS: &str = "units";

/// Outcome of evaluating one formula
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub result: f64,
    /// Number of top-level addends that were neither null nor zero
    #[serde(rename = "tally")]
    pub non_null_count: u32,
}

impl Evaluation {
    pub fn zero() -> Self {
        Self {
            result: 0.0,
            non_null_count: 0,
        }
    }
}

impl From<TokenizeError> for PipeError {
    fn from(e: TokenizeError) -> Self {
        PipeError::Parse(e.to_string())
    }
}

impl From<ParseError> for PipeError {
    fn from(e: ParseError) -> Self {
        PipeError::Parse(e.to_string())
    }
}

impl From<EvalError> for PipeError {
    fn from(e: EvalError) -> Self {
        PipeError::Eval(e.to_string())
    }
}

/// Staged evaluator with a fixed reference instant for date arithmetic
#[derive(Debug, Clone)]
pub struct ExpressionEngine {
    now: DateTime<Utc>,
    context: EvalContext,
}

impl Default for ExpressionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionEngine {
    pub fn new() -> Self {
        Self {
            now: Utc::now(),
            context: EvalContext::new(),
        }
    }

    /// Pin the reference instant used for date offsets
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Bind a scalar name (e.g. `units`) for every evaluation
    pub fn with_scalar(mut self, name: impl Into<String>, value: Value) -> Self {
        self.context.set_scalar(name, value);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Parse formula text into a tree, dates already normalized
    pub fn parse(&self, expression: &str) -> Result<Expr, PipeError> {
        let normalized = dates::normalize_dates(expression, self.now);
        let tokens = tokenize(&normalized)?;
        Ok(parse(tokens)?)
    }

    /// Evaluate without staging, with extra scalars bound.
    ///
    /// Used for declarative library bodies, where the result value matters
    /// more than a tally.
    pub fn evaluate_value(
        &self,
        expression: &str,
        scalars: impl IntoIterator<Item = (String, Value)>,
    ) -> Result<Value, PipeError> {
        let tree = self.parse(expression)?;
        let mut ctx = self.context.clone();
        for (name, value) in scalars {
            ctx.set_scalar(name, value);
        }
        Ok(evaluate(&tree, &ctx)?)
    }

    /// Evaluate an accumulated formula. Never fails: errors degrade to a zero
    /// result with the tally counted so far.
    pub fn evaluate(&self, expression: &str) -> Evaluation {
        if expression.trim().is_empty() {
            return Evaluation::zero();
        }

        let tree = match self.parse(expression) {
            Ok(tree) => tree,
            Err(e) => {
                tracing::warn!(expression, error = %e, "formula could not be parsed");
                return Evaluation::zero();
            }
        };

        let tree = force_null_led_blocks(tree);
        let tree = self.resolve_blocks(tree);
        let tree = null_to_zero(tree);
        tracing::debug!(?tree, "formula after block and null stages");

        let non_null_count = self.tally(&tree);
        let ctx = self
            .context
            .clone()
            .with_scalar(TALLY, Value::Number(f64::from(non_null_count)));

        match evaluate(&tree, &ctx) {
            Ok(value) => Evaluation {
                result: to_result(&value),
                non_null_count,
            },
            Err(e) => {
                tracing::warn!(expression, error = %e, "formula evaluation failed");
                Evaluation {
                    result: 0.0,
                    non_null_count,
                }
            }
        }
    }

    /// Evaluate every block; if any is exactly `true`, all become `true`
    fn resolve_blocks(&self, tree: Expr) -> Expr {
        let mut outcomes = Vec::new();
        collect_blocks(&tree, &mut |condition| {
            outcomes.push(self.evaluate_condition(condition));
        });

        if outcomes.iter().any(|(locked, _)| *locked) {
            tracing::debug!(blocks = outcomes.len(), "truth propagated to every block");
            replace_blocks(tree, &mut std::iter::repeat(true))
        } else {
            replace_blocks(tree, &mut outcomes.into_iter().map(|(_, truthy)| truthy))
        }
    }

    /// (strictly true, truthy) for one block
    fn evaluate_condition(&self, condition: &Condition) -> (bool, bool) {
        match condition {
            Condition::Parsed(expr) => match evaluate(expr, &self.context) {
                Ok(value) => (value == Value::Boolean(true), value.is_truthy()),
                Err(e) => {
                    tracing::warn!(error = %e, "condition evaluation failed, treating as false");
                    (false, false)
                }
            },
            Condition::Malformed(message) => {
                tracing::warn!(error = %message, "malformed condition, treating as false");
                (false, false)
            }
        }
    }

    /// Count top-level addends whose value is neither null nor zero
    fn tally(&self, tree: &Expr) -> u32 {
        let mut addends = Vec::new();
        flatten_addends(tree, &mut addends);

        let mut count = 0;
        for addend in addends {
            let addend = if addend.references(TALLY) {
                neutralize_tally_comparisons(addend.clone())
            } else {
                addend.clone()
            };
            match evaluate(&addend, &self.context) {
                Ok(Value::Null) => {}
                Ok(Value::Number(n)) if n == 0.0 => {}
                Ok(_) => count += 1,
                Err(e) => tracing::debug!(error = %e, "addend not counted"),
            }
        }
        count
    }
}

/// A block whose condition opens with a `null` comparison
fn is_null_led(expr: &Expr) -> bool {
    match expr {
        Expr::BinaryOp { op, left, .. } => {
            (Expr::is_comparison_op(op) && matches!(**left, Expr::Null)) || is_null_led(left)
        }
        Expr::Sum(terms) => terms.first().is_some_and(is_null_led),
        Expr::Ternary { condition, .. } => is_null_led(condition),
        Expr::Membership { value, .. } => is_null_led(value),
        _ => false,
    }
}

fn force_null_led_blocks(expr: Expr) -> Expr {
    match expr {
        Expr::Block(Condition::Parsed(inner)) if is_null_led(&inner) => {
            Expr::Block(Condition::Parsed(Box::new(Expr::Boolean(false))))
        }
        other => other.map_children(&mut force_null_led_blocks),
    }
}

fn collect_blocks<'a>(expr: &'a Expr, f: &mut impl FnMut(&'a Condition)) {
    if let Expr::Block(condition) = expr {
        f(condition);
        return;
    }
    for child in expr.children() {
        collect_blocks(child, f);
    }
}

fn replace_blocks(expr: Expr, outcomes: &mut impl Iterator<Item = bool>) -> Expr {
    match expr {
        Expr::Block(_) => Expr::Boolean(outcomes.next().unwrap_or(false)),
        other => other.map_children(&mut |child| replace_blocks(child, outcomes)),
    }
}

fn null_to_zero(expr: Expr) -> Expr {
    match expr {
        Expr::Null => Expr::Number(0.0),
        other => other.map_children(&mut null_to_zero),
    }
}

/// Operands of the top-level `+` chain; parenthesized groups stay whole
fn flatten_addends<'a>(expr: &'a Expr, out: &mut Vec<&'a Expr>) {
    match expr {
        Expr::Sum(terms) => out.extend(terms.iter()),
        other => out.push(other),
    }
}

fn is_tally_operand(expr: &Expr) -> bool {
    matches!(expr, Expr::Number(_)) || matches!(expr, Expr::Identifier(name) if name == TALLY)
}

/// Comparisons between numbers and `tally` read as `true` while counting
fn neutralize_tally_comparisons(expr: Expr) -> Expr {
    match expr {
        Expr::BinaryOp { op, left, right }
            if Expr::is_comparison_op(&op) && is_tally_operand(&left) && is_tally_operand(&right) =>
        {
            Expr::Boolean(true)
        }
        other => other.map_children(&mut neutralize_tally_comparisons),
    }
}

/// Final numeric coercion of an evaluated formula
fn to_result(value: &Value) -> f64 {
    let n = match value {
        Value::Text(s) => s.trim().parse().unwrap_or(0.0),
        other => other.as_number(),
    };
    if n.is_finite() {
        n
    } else {
        tracing::warn!(value = ?value, "non-finite formula result, reporting 0");
        0.0
    }
}
