//! Date literal handling
//!
//! Date-like literals (`YYYY-MM-DD`, `MM-DD-YYYY`, `MM-DD-YY`, `YY-MM-DD`,
//! separators `-`, `/`, `.`, optionally quoted) become a signed whole-day
//! offset from a reference instant, floored.

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use std::sync::OnceLock;

const MS_PER_DAY: f64 = 86_400_000.0;

fn literal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b\d{4}[-/.]\d{2}[-/.]\d{2}\b|\b\d{2}[-/.]\d{2}[-/.]\d{4}\b|\b\d{2}[-/.]\d{2}[-/.]\d{2}\b",
        )
        .expect("valid date literal regex")
    })
}

fn field_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{4}[-/.]\d{2}[-/.]\d{2}|\d{2}[-/.]\d{2}[-/.]\d{4}|\d{2}[-/.]\d{2}[-/.]\d{2})$")
            .expect("valid date field regex")
    })
}

fn strip_quotes(text: &str) -> &str {
    text.trim_matches(|c| c == '"' || c == '\'')
}

/// Parse a date literal in one of the supported layouts
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let stripped = strip_quotes(text.trim());
    // Datetime stamps keep their calendar day
    let stripped = stripped
        .split_once(['T', ' '])
        .map(|(day, _)| day)
        .unwrap_or(stripped);
    if !field_regex().is_match(stripped) {
        return None;
    }
    let normalized = stripped.replace(['/', '.'], "-");
    let formats: &[&str] = if normalized.len() == 10 && normalized.as_bytes()[4] == b'-' {
        &["%Y-%m-%d"]
    } else if normalized.len() == 10 {
        &["%m-%d-%Y"]
    } else {
        &["%m-%d-%y", "%y-%m-%d"]
    };
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&normalized, fmt).ok())
}

/// True when a text value reads as a calendar date rather than a number
pub fn is_date_like(text: &str) -> bool {
    parse_date(text).is_some()
}

/// Signed whole days from `now` to midnight UTC of `date`, floored
pub fn day_offset(date: NaiveDate, now: DateTime<Utc>) -> i64 {
    let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
    let millis = (midnight - now).num_milliseconds() as f64;
    (millis / MS_PER_DAY).floor() as i64
}

/// Day offset of a date-like text, if it is one
pub fn text_to_days(text: &str, now: DateTime<Utc>) -> Option<i64> {
    parse_date(text).map(|date| day_offset(date, now))
}

/// Replace every valid date literal in formula text with its day offset.
///
/// Bare dates are replaced wherever they appear outside string literals. A
/// quoted literal is replaced only when its whole content is a date; any
/// other string is left as written. Invalid calendar dates are left untouched.
pub fn normalize_dates(text: &str, now: DateTime<Utc>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find(['"', '\'']) {
        out.push_str(&normalize_bare(&rest[..open], now));
        let literal = &rest[open..quoted_end(rest, open)];
        match quoted_content(literal).and_then(|content| text_to_days(content, now)) {
            Some(days) => {
                tracing::debug!(literal, days, "date literal normalized");
                out.push_str(&days.to_string());
            }
            None => out.push_str(literal),
        }
        rest = &rest[open + literal.len()..];
    }
    out.push_str(&normalize_bare(rest, now));
    out
}

fn normalize_bare(text: &str, now: DateTime<Utc>) -> String {
    literal_regex()
        .replace_all(text, |caps: &regex::Captures| {
            let literal = &caps[0];
            match text_to_days(literal, now) {
                Some(days) => {
                    tracing::debug!(literal, days, "date literal normalized");
                    days.to_string()
                }
                None => literal.to_string(),
            }
        })
        .into_owned()
}

/// End (exclusive) of the string literal opening at `open`; a doubled quote
/// stays inside the literal
fn quoted_end(text: &str, open: usize) -> usize {
    let bytes = text.as_bytes();
    let quote = bytes[open];
    let mut i = open + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// Content of a closed string literal
fn quoted_content(literal: &str) -> Option<&str> {
    let quote = literal.chars().next()?;
    literal
        .strip_prefix(quote)?
        .strip_suffix(quote)
        .filter(|content| !content.contains(quote))
}
