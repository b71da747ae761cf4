//! Formula evaluator for the expression engine
//!
//! Evaluates an AST with JavaScript-like value semantics: `+` concatenates
//! when either side is text, `&&`/`||` return an operand, loose equality
//! coerces between numbers and text, and arithmetic follows `f64`.

use super::parser::{Condition, Expr};
use crate::types::format_number;
use std::collections::HashMap;

/// Value type that can be returned from evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Boolean(bool),
    Null,
}

impl Value {
    /// Numeric coercion. Unparseable text is NaN, blank text and null are 0.
    pub fn as_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Text(s) => {
                let t = s.trim();
                if t.is_empty() {
                    0.0
                } else {
                    t.parse().unwrap_or(f64::NAN)
                }
            }
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Null => 0.0,
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
            Value::Boolean(b) => b.to_string(),
            Value::Null => "null".to_string(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Text(s) => !s.is_empty(),
            Value::Boolean(b) => *b,
            Value::Null => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Evaluation context holding bound scalar names such as `tally` and `units`
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    pub scalars: HashMap<String, Value>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_scalar(&self, name: &str) -> Option<&Value> {
        self.scalars.get(name)
    }

    pub fn set_scalar(&mut self, name: impl Into<String>, value: Value) {
        self.scalars.insert(name.into(), value);
    }

    pub fn with_scalar(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set_scalar(name, value);
        self
    }
}

/// Error during evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct EvalError {
    pub message: String,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Eval error: {}", self.message)
    }
}

impl std::error::Error for EvalError {}

/// Evaluate an expression in the given context
pub fn evaluate(expr: &Expr, ctx: &EvalContext) -> Result<Value, EvalError> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Text(s) => Ok(Value::Text(s.clone())),
        Expr::Boolean(b) => Ok(Value::Boolean(*b)),
        Expr::Null => Ok(Value::Null),

        Expr::Identifier(name) => ctx
            .get_scalar(name)
            .cloned()
            .ok_or_else(|| EvalError::new(format!("Unknown identifier: {}", name))),

        Expr::Group(inner) => evaluate(inner, ctx),

        Expr::Block(Condition::Parsed(inner)) => {
            Ok(Value::Boolean(evaluate(inner, ctx)?.is_truthy()))
        }
        Expr::Block(Condition::Malformed(message)) => Err(EvalError::new(format!(
            "Malformed condition: {}",
            message
        ))),

        Expr::FunctionCall { name, args } => evaluate_function(name, args, ctx),

        Expr::Sum(terms) => {
            let mut terms = terms.iter();
            let mut total = match terms.next() {
                Some(first) => evaluate(first, ctx)?,
                None => return Ok(Value::Number(0.0)),
            };
            for term in terms {
                total = evaluate_binary_op("+", &total, &evaluate(term, ctx)?)?;
            }
            Ok(total)
        }

        Expr::BinaryOp { op, left, right } => match op.as_str() {
            "&&" => {
                let l = evaluate(left, ctx)?;
                if l.is_truthy() {
                    evaluate(right, ctx)
                } else {
                    Ok(l)
                }
            }
            "||" => {
                let l = evaluate(left, ctx)?;
                if l.is_truthy() {
                    Ok(l)
                } else {
                    evaluate(right, ctx)
                }
            }
            _ => {
                let l = evaluate(left, ctx)?;
                let r = evaluate(right, ctx)?;
                evaluate_binary_op(op, &l, &r)
            }
        },

        Expr::UnaryOp { op, operand } => {
            let val = evaluate(operand, ctx)?;
            evaluate_unary_op(op, &val)
        }

        Expr::Ternary {
            condition,
            then_branch,
            else_branch,
        } => {
            if evaluate(condition, ctx)?.is_truthy() {
                evaluate(then_branch, ctx)
            } else {
                evaluate(else_branch, ctx)
            }
        }

        Expr::Membership { value, items } => {
            let needle = strip_quotes(evaluate(value, ctx)?.as_text().trim()).to_string();
            Ok(Value::Boolean(
                items.iter().any(|item| strip_quotes(item.trim()) == needle),
            ))
        }
    }
}

fn strip_quotes(text: &str) -> &str {
    let text = text
        .strip_prefix('"')
        .or_else(|| text.strip_prefix('\''))
        .unwrap_or(text);
    text.strip_suffix('"')
        .or_else(|| text.strip_suffix('\''))
        .unwrap_or(text)
}

/// Evaluate a binary operation on already evaluated operands
pub fn evaluate_binary_op(op: &str, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match op {
        "+" => {
            if matches!(left, Value::Text(_)) || matches!(right, Value::Text(_)) {
                Ok(Value::Text(format!("{}{}", left.as_text(), right.as_text())))
            } else {
                Ok(Value::Number(left.as_number() + right.as_number()))
            }
        }
        "-" => Ok(Value::Number(left.as_number() - right.as_number())),
        "*" => Ok(Value::Number(left.as_number() * right.as_number())),
        // Division by zero yields an infinity or NaN, never an error
        "/" => Ok(Value::Number(left.as_number() / right.as_number())),
        "%" => Ok(Value::Number(left.as_number() % right.as_number())),

        "==" => Ok(Value::Boolean(loose_equal(left, right))),
        "!=" => Ok(Value::Boolean(!loose_equal(left, right))),
        "===" => Ok(Value::Boolean(strict_equal(left, right))),
        "!==" => Ok(Value::Boolean(!strict_equal(left, right))),

        "<" | ">" | "<=" | ">=" => Ok(Value::Boolean(compare(op, left, right))),

        "&&" => Ok(if left.is_truthy() {
            right.clone()
        } else {
            left.clone()
        }),
        "||" => Ok(if left.is_truthy() {
            left.clone()
        } else {
            right.clone()
        }),

        _ => Err(EvalError::new(format!("Unknown operator: {}", op))),
    }
}

fn compare(op: &str, left: &Value, right: &Value) -> bool {
    if let (Value::Text(l), Value::Text(r)) = (left, right) {
        return match op {
            "<" => l < r,
            ">" => l > r,
            "<=" => l <= r,
            _ => l >= r,
        };
    }
    // NaN compares false in every direction
    let (l, r) = (left.as_number(), right.as_number());
    match op {
        "<" => l < r,
        ">" => l > r,
        "<=" => l <= r,
        _ => l >= r,
    }
}

/// `==` semantics: null equals only null, otherwise numeric coercion unless
/// both sides are text
fn loose_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Text(l), Value::Text(r)) => l == r,
        _ => left.as_number() == right.as_number(),
    }
}

/// `===` semantics: same kind and same value
fn strict_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l == r,
        (Value::Text(l), Value::Text(r)) => l == r,
        (Value::Boolean(l), Value::Boolean(r)) => l == r,
        (Value::Null, Value::Null) => true,
        _ => false,
    }
}

fn evaluate_unary_op(op: &str, operand: &Value) -> Result<Value, EvalError> {
    match op {
        "!" => Ok(Value::Boolean(!operand.is_truthy())),
        "-" => Ok(Value::Number(-operand.as_number())),
        "+" => Ok(Value::Number(operand.as_number())),
        _ => Err(EvalError::new(format!("Unknown unary operator: {}", op))),
    }
}

/// Evaluate a built-in function call
fn evaluate_function(name: &str, args: &[Expr], ctx: &EvalContext) -> Result<Value, EvalError> {
    match name {
        // ═══════════════════════════════════════════════════════════════════════
        // ROUNDING
        // ═══════════════════════════════════════════════════════════════════════
        "abs" => {
            require_args(name, args, 1)?;
            Ok(Value::Number(evaluate(&args[0], ctx)?.as_number().abs()))
        }
        "round" => {
            require_args_range(name, args, 1, 2)?;
            let val = evaluate(&args[0], ctx)?.as_number();
            let decimals = match args.get(1) {
                Some(arg) => evaluate(arg, ctx)?.as_number() as i32,
                None => 0,
            };
            let multiplier = 10_f64.powi(decimals);
            // Halves round toward positive infinity
            Ok(Value::Number((val * multiplier + 0.5).floor() / multiplier))
        }
        "floor" => {
            require_args(name, args, 1)?;
            Ok(Value::Number(evaluate(&args[0], ctx)?.as_number().floor()))
        }
        "ceil" => {
            require_args(name, args, 1)?;
            Ok(Value::Number(evaluate(&args[0], ctx)?.as_number().ceil()))
        }
        "sqrt" => {
            require_args(name, args, 1)?;
            Ok(Value::Number(evaluate(&args[0], ctx)?.as_number().sqrt()))
        }

        // ═══════════════════════════════════════════════════════════════════════
        // EXTREMES
        // ═══════════════════════════════════════════════════════════════════════
        "min" => {
            let values = collect_numeric_values(args, ctx)?;
            if values.iter().any(|v| v.is_nan()) {
                return Ok(Value::Number(f64::NAN));
            }
            Ok(Value::Number(values.into_iter().fold(f64::INFINITY, f64::min)))
        }
        "max" => {
            let values = collect_numeric_values(args, ctx)?;
            if values.iter().any(|v| v.is_nan()) {
                return Ok(Value::Number(f64::NAN));
            }
            Ok(Value::Number(
                values.into_iter().fold(f64::NEG_INFINITY, f64::max),
            ))
        }

        _ => Err(EvalError::new(format!("Unknown function: {}", name))),
    }
}

fn require_args(func: &str, args: &[Expr], count: usize) -> Result<(), EvalError> {
    if args.len() != count {
        Err(EvalError::new(format!(
            "{} requires {} argument(s), got {}",
            func,
            count,
            args.len()
        )))
    } else {
        Ok(())
    }
}

fn require_args_range(func: &str, args: &[Expr], min: usize, max: usize) -> Result<(), EvalError> {
    if args.len() < min || args.len() > max {
        Err(EvalError::new(format!(
            "{} requires {}-{} arguments, got {}",
            func,
            min,
            max,
            args.len()
        )))
    } else {
        Ok(())
    }
}

fn collect_numeric_values(args: &[Expr], ctx: &EvalContext) -> Result<Vec<f64>, EvalError> {
    args.iter()
        .map(|arg| evaluate(arg, ctx).map(|v| v.as_number()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::parser::parse;
    use crate::core::engine::tokenizer::tokenize;

    fn eval(formula: &str, ctx: &EvalContext) -> Result<Value, EvalError> {
        let tokens = tokenize(formula).map_err(|e| EvalError::new(e.message))?;
        let ast = parse(tokens).map_err(|e| EvalError::new(e.message))?;
        evaluate(&ast, ctx)
    }

    fn eval_plain(formula: &str) -> Value {
        eval(formula, &EvalContext::new()).unwrap()
    }

    #[test]
    fn test_eval_arithmetic() {
        assert_eq!(eval_plain("2 + 3 * 4"), Value::Number(14.0));
        assert_eq!(eval_plain("(2 + 3) * 4"), Value::Number(20.0));
        assert_eq!(eval_plain("7 % 3"), Value::Number(1.0));
        assert_eq!(eval_plain("-2 - -3"), Value::Number(1.0));
    }

    #[test]
    fn test_eval_division_by_zero() {
        assert_eq!(eval_plain("1 / 0"), Value::Number(f64::INFINITY));
        match eval_plain("0 / 0") {
            Value::Number(n) => assert!(n.is_nan()),
            other => panic!("Expected number, got {:?}", other),
        }
    }

    #[test]
    fn test_eval_text_concatenation() {
        assert_eq!(eval_plain("'a' + 1"), Value::Text("a1".to_string()));
        assert_eq!(eval_plain("1 + 2 + 'a' + 3"), Value::Text("3a3".to_string()));
        assert_eq!(eval_plain("\"5\" * 2"), Value::Number(10.0));
    }

    #[test]
    fn test_eval_booleans_in_arithmetic() {
        assert_eq!(eval_plain("true * 5"), Value::Number(5.0));
        assert_eq!(eval_plain("false + 1"), Value::Number(1.0));
        assert_eq!(eval_plain("null + 1"), Value::Number(1.0));
    }

    #[test]
    fn test_eval_comparisons() {
        assert_eq!(eval_plain("3 > 2"), Value::Boolean(true));
        assert_eq!(eval_plain("'abc' < 'abd'"), Value::Boolean(true));
        assert_eq!(eval_plain("'10' == 10"), Value::Boolean(true));
        assert_eq!(eval_plain("'10' === 10"), Value::Boolean(false));
        assert_eq!(eval_plain("null == 0"), Value::Boolean(false));
        assert_eq!(eval_plain("null == null"), Value::Boolean(true));
        assert_eq!(eval_plain("'x' > 1"), Value::Boolean(false));
        assert_eq!(eval_plain("'x' <= 1"), Value::Boolean(false));
    }

    #[test]
    fn test_eval_logical_returns_operand() {
        assert_eq!(eval_plain("0 || 7"), Value::Number(7.0));
        assert_eq!(eval_plain("3 && 'yes'"), Value::Text("yes".to_string()));
        assert_eq!(eval_plain("!0"), Value::Boolean(true));
    }

    #[test]
    fn test_eval_ternary() {
        assert_eq!(eval_plain("1 > 2 ? 10 : 20"), Value::Number(20.0));
        assert_eq!(eval_plain("'' ? 1 : 2"), Value::Number(2.0));
    }

    #[test]
    fn test_eval_membership() {
        assert_eq!(eval_plain("\"B\" in [A, B, C]"), Value::Boolean(true));
        assert_eq!(eval_plain("\"D\" in [A, B, C]"), Value::Boolean(false));
        assert_eq!(eval_plain("3 in [1, 2, 3]"), Value::Boolean(true));
        assert_eq!(eval_plain("'B' in ['A', \"B\"]"), Value::Boolean(true));
    }

    #[test]
    fn test_eval_functions() {
        assert_eq!(eval_plain("abs(-4)"), Value::Number(4.0));
        assert_eq!(eval_plain("round(2.5)"), Value::Number(3.0));
        assert_eq!(eval_plain("round(-2.5)"), Value::Number(-2.0));
        assert_eq!(eval_plain("round(3.14159, 2)"), Value::Number(3.14));
        assert_eq!(eval_plain("floor(2.7) + ceil(2.1)"), Value::Number(5.0));
        assert_eq!(eval_plain("sqrt(16)"), Value::Number(4.0));
        assert_eq!(eval_plain("min(4, 2, 9)"), Value::Number(2.0));
        assert_eq!(eval_plain("max(4, 2, 9)"), Value::Number(9.0));
    }

    #[test]
    fn test_eval_scalar_binding() {
        let ctx = EvalContext::new().with_scalar("units", Value::Number(4.0));
        assert_eq!(eval("units * 2", &ctx).unwrap(), Value::Number(8.0));
        assert!(eval("tally * 2", &ctx).is_err());
    }

    #[test]
    fn test_eval_unknown_function() {
        assert!(eval("nope(1)", &EvalContext::new()).is_err());
        assert!(eval("abs(1, 2)", &EvalContext::new()).is_err());
    }

    #[test]
    fn test_eval_block_coerces_to_boolean() {
        assert_eq!(eval_plain("{{ 5 }}"), Value::Boolean(true));
        assert!(eval("{{ 5 > }}", &EvalContext::new()).is_err());
    }
}
