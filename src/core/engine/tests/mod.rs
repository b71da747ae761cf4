use super::*;
use chrono::TimeZone;

fn engine() -> ExpressionEngine {
    ExpressionEngine::new().with_now(Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap())
}

fn run(expression: &str) -> Evaluation {
    engine().evaluate(expression)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRUTH PROPAGATION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_one_true_block_makes_every_block_true() {
    let eval = run("{{1>2}} + {{3>2}}");
    assert_eq!(eval.result, 2.0);
    assert_eq!(eval.non_null_count, 2);
}

#[test]
fn test_all_false_blocks_stay_false() {
    let eval = run("{{1>2}} + {{1>5}}");
    assert_eq!(eval.result, 0.0);
}

#[test]
fn test_blocks_scale_values() {
    assert_eq!(run("{{ 5 > 3 }} * 100 + {{ 1 > 3 }} * 10").result, 110.0);
    assert_eq!(run("{{ 2 > 3 }} * 100 + {{ 1 > 3 }} * 10").result, 0.0);
}

#[test]
fn test_truthy_but_not_true_block_does_not_propagate() {
    // 5 is truthy, so its own block is true, but it is not strictly `true`
    let eval = run("{{ 5 }} * 10 + {{ 0 }} * 100");
    assert_eq!(eval.result, 10.0);
}

#[test]
fn test_null_led_block_is_forced_false() {
    assert_eq!(run("{{ null < 1 }} * 10").result, 0.0);
    // A later true block still propagates
    assert_eq!(run("{{ null < 1 }} * 10 + {{ 3 > 2 }}").result, 11.0);
}

#[test]
fn test_failing_block_is_false() {
    let eval = run("{{ unknown > 1 }} + 3");
    assert_eq!(eval.result, 3.0);

    let eval = run("{{ 1 > }} * 5 + 2");
    assert_eq!(eval.result, 2.0);
}

// ═══════════════════════════════════════════════════════════════════════════════
// TALLY
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_tally_skips_null_and_zero() {
    let eval = run("5 + null + 3");
    assert_eq!(eval.result, 8.0);
    assert_eq!(eval.non_null_count, 2);
}

#[test]
fn test_tally_counts_grouped_row_fragments() {
    let eval = run("( 120 ) + ( 0 ) + ( 35.5 ) + ( null )");
    assert_eq!(eval.result, 155.5);
    assert_eq!(eval.non_null_count, 2);
}

#[test]
fn test_tally_inside_groups_is_not_split() {
    let eval = run("( 1 + 0 + 2 )");
    assert_eq!(eval.non_null_count, 1);
}

#[test]
fn test_tally_bound_in_final_expression() {
    let eval = run("( 5 ) + ( 0 ) + ( tally > 1 ) * 3");
    assert_eq!(eval.non_null_count, 2);
    assert_eq!(eval.result, 8.0);
}

#[test]
fn test_units_scalar() {
    let eval = engine()
        .with_scalar(UNITS, Value::Number(4.0))
        .evaluate("( 10 ) + ( 20 ) + units");
    assert_eq!(eval.result, 34.0);
    assert_eq!(eval.non_null_count, 3);
}

// ═══════════════════════════════════════════════════════════════════════════════
// MEMBERSHIP, DATES, SANITATION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_membership() {
    assert_eq!(run("(\"B\" in [A, B, C]) * 7").result, 7.0);
    assert_eq!(run("(\"D\" in [A, B, C]) * 7").result, 0.0);
    assert_eq!(run("{{ \"B\" in [A, B, C] }} * 7").result, 7.0);
}

#[test]
fn test_date_literals_become_day_offsets() {
    assert_eq!(run("'2024-03-15'").result, 4.0);
    assert_eq!(run("{{ '03/20/2024' > 7 }} * 2").result, 2.0);
    assert_eq!(run("{{ 2024-03-05 < 0 }} * 2").result, 2.0);
}

#[test]
fn test_unknown_characters_are_ignored() {
    assert_eq!(run("$100 + 50").result, 150.0);
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEGRADATION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_empty_expression() {
    assert_eq!(run(""), Evaluation::zero());
    assert_eq!(run("   "), Evaluation::zero());
}

#[test]
fn test_parse_failure_is_zero() {
    assert_eq!(run("5 +"), Evaluation::zero());
    assert_eq!(run("a = 1"), Evaluation::zero());
}

#[test]
fn test_final_failure_keeps_partial_tally() {
    let eval = run("5 + nope(1)");
    assert_eq!(eval.result, 0.0);
    assert_eq!(eval.non_null_count, 1);
}

#[test]
fn test_result_coercion() {
    assert_eq!(run("'12'").result, 12.0);
    assert_eq!(run("'abc'").result, 0.0);
    assert_eq!(run("3 > 2").result, 1.0);
    assert_eq!(run("1 / 0").result, 0.0);
}

#[test]
fn test_evaluate_value_binds_scalars() {
    let value = engine()
        .evaluate_value(
            "balance * rate * term",
            vec![
                ("balance".to_string(), Value::Number(1000.0)),
                ("rate".to_string(), Value::Number(0.5)),
                ("term".to_string(), Value::Number(2.0)),
            ],
        )
        .unwrap();
    assert_eq!(value, Value::Number(1000.0));
}

#[test]
fn test_evaluate_value_reports_errors() {
    let result = engine().evaluate_value("missing + 1", Vec::new());
    assert!(matches!(result, Err(PipeError::Eval(_))));

    let result = engine().evaluate_value("1 +", Vec::new());
    assert!(matches!(result, Err(PipeError::Parse(_))));
}
