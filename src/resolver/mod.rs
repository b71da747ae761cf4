//! Lexical resolver: maps a formula field token onto one of a source's headers
//!
//! Matching is done on stems, by containment: a header matches when its stem
//! contains the token's stem, so `Late_Charges` (stem `late_charg`) matches
//! `charge` (stem `charg`). When no header matches directly, the synonym
//! library is consulted.

pub mod stemmer;
pub mod synonyms;

pub use stemmer::stem;
pub use synonyms::SYNONYM_LIBRARY;

/// Strip a `source.` prefix and every non-alphanumeric character
pub fn clean_field(field: &str) -> String {
    let field = match field.split_once('.') {
        Some((_, rest)) => rest,
        None => field,
    };
    field.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// Stem used when comparing multi-word synonyms against cleaned tokens
fn stem_cleaned(word: &str) -> String {
    let cleaned: String = word.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    stem(&cleaned)
}

/// Every canonical key the word belongs to, in library order.
///
/// A word belongs to a key when its stem equals the key's stem or the stem of
/// one of the key's synonyms.
pub fn synonym_keys(word: &str) -> Vec<&'static str> {
    let stemmed = stem_cleaned(word);
    // Irregular plurals ("fees" -> "fee") stem once more to meet their key
    let restemmed = stem(&stemmed);
    let is_match = |candidate: String| candidate == stemmed || candidate == restemmed;
    SYNONYM_LIBRARY
        .iter()
        .filter(|(key, synonyms)| {
            is_match(stem(key)) || synonyms.iter().any(|s| is_match(stem_cleaned(s)))
        })
        .map(|(key, _)| *key)
        .collect()
}

/// First canonical key the word belongs to, or the word itself
pub fn synonym_key(word: &str) -> String {
    synonym_keys(word)
        .first()
        .map(|k| (*k).to_string())
        .unwrap_or_else(|| word.to_string())
}

/// Resolve a formula token against a header set.
///
/// Returns the original header text, or `None` when neither a direct stem
/// match nor a synonym match exists.
pub fn resolve_header<S: AsRef<str>>(headers: &[S], token: &str) -> Option<String> {
    let cleaned = clean_field(token);
    if cleaned.is_empty() {
        return None;
    }
    let token_stem = stem(&cleaned);
    let header_stems: Vec<String> = headers
        .iter()
        .map(|h| stem(&h.as_ref().to_lowercase()))
        .collect();

    if let Some(idx) = header_stems.iter().position(|h| h.contains(&token_stem)) {
        return Some(headers[idx].as_ref().to_string());
    }

    for key in synonym_keys(&cleaned) {
        let mut candidates = vec![stem(key)];
        if let Some(synonyms) = synonyms::synonyms_of(key) {
            candidates.extend(synonyms.iter().map(|s| stem(s)));
        }
        if let Some(idx) = header_stems
            .iter()
            .position(|h| candidates.iter().any(|c| h.contains(c.as_str())))
        {
            tracing::debug!(
                token,
                key,
                header = headers[idx].as_ref(),
                "resolved through synonym"
            );
            return Some(headers[idx].as_ref().to_string());
        }
    }

    None
}
