//! Threshold-based business classification
//!
//! An account is flagged as a business account when its balance sits well
//! above both the source's balance distribution and the consumer maximum.

use crate::core::analytics::{FieldAnalytics, SourceAnalytics};
use crate::error::{PipeError, PipeResult};
use crate::resolver::resolve_header;
use serde::{Deserialize, Serialize};

/// Deposits per year above which the lower threshold applies
pub const FREQUENT_DEPOSITS: f64 = 72.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// max(3σ upper, 1.2 × consumer maximum)
    pub high: f64,
    /// max(2σ upper, 0.8 × consumer maximum)
    pub low: f64,
}

impl Thresholds {
    pub fn from_balance(balance: &FieldAnalytics, consumer_maximum: f64) -> Self {
        Self {
            high: balance
                .three_std_deviations
                .upper
                .max(consumer_maximum * 1.2),
            low: balance.two_std_deviations.upper.max(consumer_maximum * 0.8),
        }
    }
}

/// Analytics of the field resolving to `balance`
pub fn balance_field<'a>(analytics: &'a SourceAnalytics, source: &str) -> PipeResult<&'a FieldAnalytics> {
    let fields: Vec<&str> = analytics.keys().map(String::as_str).collect();
    resolve_header(&fields, "balance")
        .and_then(|field| analytics.get(&field))
        .ok_or_else(|| {
            PipeError::InvalidParameter(format!(
                "source '{}' has no numeric field resolving to 'balance'",
                source
            ))
        })
}

fn require_finite(name: &str, value: f64) -> PipeResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(PipeError::InvalidParameter(format!(
            "'{}' must be a number, got {}",
            name, value
        )))
    }
}

/// Classify one account against a source's balance analytics
pub fn is_business(
    analytics: &SourceAnalytics,
    source: &str,
    balance: f64,
    consumer_maximum: f64,
    annual_deposits: f64,
) -> PipeResult<bool> {
    let balance = require_finite("balance", balance)?;
    let consumer_maximum = require_finite("consumerMaximum", consumer_maximum)?;
    let annual_deposits = require_finite("annualDeposits", annual_deposits)?;

    let thresholds = Thresholds::from_balance(balance_field(analytics, source)?, consumer_maximum);
    let business = balance > thresholds.high
        || (annual_deposits > FREQUENT_DEPOSITS && balance > thresholds.low);

    tracing::debug!(
        source,
        balance,
        high = thresholds.high,
        low = thresholds.low,
        business,
        "classified account"
    );
    Ok(business)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::analytics::{analyze_values, ConvexParams};

    fn analytics() -> SourceAnalytics {
        let mut analytics = SourceAnalytics::new();
        // mean 5, σ 2: 2σ upper 9, 3σ upper 11
        let field = analyze_values(
            "Avg_Balance",
            &[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0],
            &ConvexParams::default(),
        )
        .unwrap();
        analytics.insert("Avg_Balance".to_string(), field);
        analytics
    }

    #[test]
    fn test_high_threshold_is_exclusive() {
        let a = analytics();
        // consumer maximum 5 -> high = max(11, 6) = 11
        assert!(!is_business(&a, "checking", 11.0, 5.0, 0.0).unwrap());
        assert!(is_business(&a, "checking", 12.0, 5.0, 0.0).unwrap());
    }

    #[test]
    fn test_consumer_maximum_can_dominate() {
        let a = analytics();
        // high = max(11, 120) = 120
        assert!(!is_business(&a, "checking", 100.0, 100.0, 0.0).unwrap());
        assert!(is_business(&a, "checking", 121.0, 100.0, 0.0).unwrap());
    }

    #[test]
    fn test_frequent_deposits_use_low_threshold() {
        let a = analytics();
        // low = max(9, 4) = 9
        assert!(is_business(&a, "checking", 10.0, 5.0, 73.0).unwrap());
        assert!(!is_business(&a, "checking", 10.0, 5.0, 72.0).unwrap());
        assert!(!is_business(&a, "checking", 9.0, 5.0, 100.0).unwrap());
    }

    #[test]
    fn test_non_numeric_parameters_rejected() {
        let a = analytics();
        let result = is_business(&a, "checking", f64::NAN, 5.0, 0.0);
        assert!(matches!(result, Err(PipeError::InvalidParameter(_))));
    }

    #[test]
    fn test_missing_balance_field() {
        let result = is_business(&SourceAnalytics::new(), "loans", 1.0, 1.0, 1.0);
        assert!(matches!(result, Err(PipeError::InvalidParameter(_))));
    }
}
