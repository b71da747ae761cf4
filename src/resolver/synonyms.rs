//! Static synonym library
//!
//! Canonical key -> synonyms commonly found in banking exports. Keys are
//! matched in declaration order.

pub const SYNONYM_LIBRARY: &[(&str, &[&str])] = &[
    ("fee", &["charge", "cost", "duty", "collection", "levy"]),
    ("open", &["origination", "start", "create", "establish", "setup"]),
    ("checking", &["dda", "demand deposit"]),
    ("withdrawal", &["check", "draft", "debit"]),
    ("deposit", &["credit"]),
    ("certificate", &["cd", "cod", "certificate of deposit"]),
    ("own", &["responsibility"]),
    ("typ", &["classification", "class"]),
    ("class", &["type"]),
];

/// Synonyms of a canonical key
pub fn synonyms_of(key: &str) -> Option<&'static [&'static str]> {
    SYNONYM_LIBRARY
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, synonyms)| *synonyms)
}
