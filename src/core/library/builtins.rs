//! Libraries shipped with the crate

use super::{CallContext, FunctionArgs, FunctionDef, FunctionLibrary};
use crate::core::classify;
use crate::core::engine::Value;
use crate::error::{PipeError, PipeResult};

pub const FINANCIAL: &str = "financial";
pub const AI: &str = "ai";

/// Built-in library by name
pub fn builtin(name: &str) -> Option<FunctionLibrary> {
    match name {
        FINANCIAL => Some(financial()),
        AI => Some(ai()),
        _ => None,
    }
}

pub fn financial() -> FunctionLibrary {
    FunctionLibrary::new(FINANCIAL).with_function(FunctionDef::native(
        "interestIncome",
        &["balance", "rate", "term = 1"],
        interest_income,
    ))
}

pub fn ai() -> FunctionLibrary {
    FunctionLibrary::new(AI).with_function(FunctionDef::native(
        "isBusiness",
        &["balance", "consumerMaximum", "annualDeposits", "sourceIndex = source"],
        is_business,
    ))
}

fn interest_income(_ctx: &CallContext, args: &FunctionArgs) -> PipeResult<Value> {
    let balance = args.number("balance")?;
    let rate = args.number("rate")?;
    let term = match args.get("term") {
        Some(v) => v.as_number(),
        None => 1.0,
    };
    Ok(Value::Number(balance * rate * term))
}

fn is_business(ctx: &CallContext, args: &FunctionArgs) -> PipeResult<Value> {
    let balance = args.strict_number("balance")?;
    let consumer_maximum = args.strict_number("consumerMaximum")?;
    let annual_deposits = args.strict_number("annualDeposits")?;

    // The declared default names the implicit source parameter
    let source = match args.text("sourceIndex") {
        Some(s) if s != super::SOURCE_PARAM => s,
        _ => ctx.source.to_string(),
    };
    let analytics = ctx.analytics.source(&source).ok_or_else(|| {
        PipeError::InvalidParameter(format!("no analytics for source '{}'", source))
    })?;

    classify::is_business(analytics, &source, balance, consumer_maximum, annual_deposits)
        .map(Value::Boolean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::analytics::{compute_analytics, AnalyticsReport, ConvexParams};
    use crate::core::engine::ExpressionEngine;
    use crate::parser::parse_table;

    #[test]
    fn test_interest_income() {
        let engine = ExpressionEngine::new();
        let analytics = AnalyticsReport::new();
        let ctx = CallContext {
            source: "savings",
            analytics: &analytics,
            engine: &engine,
        };
        let lib = financial();
        let def = lib.get("interestIncome").unwrap();
        assert!(def.params[2].optional);

        let mut args = FunctionArgs::new();
        args.insert("balance", Value::Number(1000.0));
        args.insert("rate", Value::Number(0.5));
        assert_eq!(def.call(&ctx, &args).unwrap(), Value::Number(500.0));

        args.insert("term", Value::Number(3.0));
        assert_eq!(def.call(&ctx, &args).unwrap(), Value::Number(1500.0));
    }

    #[test]
    fn test_is_business_uses_current_source() {
        let table = parse_table(
            "checking",
            "Balance\n2\n4\n4\n4\n5\n5\n7\n9\n",
        );
        let analytics = compute_analytics([&table], &ConvexParams::default());
        let engine = ExpressionEngine::new();
        let ctx = CallContext {
            source: "checking",
            analytics: &analytics,
            engine: &engine,
        };
        let def = ai().get("isBusiness").cloned().unwrap();

        let mut args = FunctionArgs::new();
        args.insert("balance", Value::Number(12.0));
        args.insert("consumerMaximum", Value::Number(5.0));
        args.insert("annualDeposits", Value::Number(0.0));
        assert_eq!(def.call(&ctx, &args).unwrap(), Value::Boolean(true));

        args.insert("balance", Value::Text("lots".to_string()));
        assert!(matches!(
            def.call(&ctx, &args),
            Err(PipeError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_unknown_builtin() {
        assert!(builtin("nope").is_none());
        assert!(builtin(FINANCIAL).is_some());
    }
}
