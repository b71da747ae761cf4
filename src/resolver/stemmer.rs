//! Suffix-stripping stemmer
//!
//! A reduced Porter-style stemmer tuned for column headers. It is conservative
//! on short words: a suffix is only removed when the remaining stem still has
//! a consonant-vowel structure (positive measure).

/// Irregular forms that bypass the suffix rules
const IRREGULARS: &[(&str, &str)] = &[
    ("running", "run"),
    ("ran", "run"),
    ("swimming", "swim"),
    ("swam", "swim"),
    ("taking", "take"),
    ("took", "take"),
    ("gone", "go"),
    ("went", "go"),
    ("being", "be"),
    ("was", "be"),
    ("were", "be"),
    ("having", "have"),
    ("had", "have"),
    ("fees", "fee"),
    ("responsibility", "resp"),
];

/// Suffixes checked in order; only the first one the word ends with is tried
const SUFFIXES: &[&str] = &[
    "ational", "tional", "enci", "anci", "izer", "bli", "alli", "entli", "eli", "ousli",
    "ization", "ation", "ator", "alism", "iveness", "fulness", "ousness", "aliti", "iviti",
    "biliti", "logi", "ing", "ed", "ly", "es", "er", "est", "ment", "ness",
];

fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y')
}

/// Count of `VC` pairs in the collapsed consonant/vowel signature of a word.
///
/// "tree" collapses to `CV` (0), "trouble" to `CVCV` (1), "oaten" to `VCVC` (2).
pub fn measure(word: &str) -> usize {
    let mut signature: Vec<bool> = Vec::new();
    for c in word.chars() {
        let vowel = is_vowel(c);
        if signature.last() != Some(&vowel) {
            signature.push(vowel);
        }
    }
    signature
        .windows(2)
        .filter(|pair| pair[0] && !pair[1])
        .count()
}

fn without_last(word: &str) -> &str {
    match word.char_indices().last() {
        Some((idx, _)) => &word[..idx],
        None => word,
    }
}

/// Reduce a word to its stem
pub fn stem(word: &str) -> String {
    let lower = word.to_lowercase();

    if let Some((_, irregular)) = IRREGULARS.iter().find(|(form, _)| *form == lower) {
        return (*irregular).to_string();
    }

    let mut word = lower;

    if let Some(suffix) = SUFFIXES.iter().find(|suffix| word.ends_with(*suffix)) {
        let candidate = &word[..word.len() - suffix.len()];
        if measure(candidate) > 0 {
            word = candidate.to_string();
        }
    }

    // Silent trailing e
    if word.ends_with('e') && word.chars().count() > 4 && measure(without_last(&word)) > 0 {
        word = without_last(&word).to_string();
    }

    let residual = without_last(&word);
    if word.ends_with('s')
        && !word.ends_with("ss")
        && measure(residual) > 0
        && residual.chars().count() >= 3
    {
        word = residual.to_string();
    } else if ends_with_double(&word) && !word.ends_with("ss") {
        word = without_last(&word).to_string();
    }

    word
}

fn ends_with_double(word: &str) -> bool {
    let mut rev = word.chars().rev();
    match (rev.next(), rev.next()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure() {
        assert_eq!(measure("tr"), 0);
        assert_eq!(measure("tree"), 0);
        assert_eq!(measure("trouble"), 1);
        assert_eq!(measure("oaten"), 2);
        assert_eq!(measure(""), 0);
    }

    #[test]
    fn test_irregulars() {
        assert_eq!(stem("Running"), "run");
        assert_eq!(stem("went"), "go");
        assert_eq!(stem("fees"), "fee");
        assert_eq!(stem("responsibility"), "resp");
    }

    #[test]
    fn test_suffix_stripping() {
        assert_eq!(stem("charges"), "charg");
        assert_eq!(stem("opened"), "open");
        assert_eq!(stem("happiness"), "happi");
        assert_eq!(stem("checking"), "check");
        assert_eq!(stem("classification"), "classific");
    }

    #[test]
    fn test_short_words_are_not_overstemmed() {
        // "b" + "ed" would leave a stem with no measure
        assert_eq!(stem("bed"), "bed");
        assert_eq!(stem("sing"), "sing");
    }

    #[test]
    fn test_silent_e() {
        assert_eq!(stem("charge"), "charg");
        assert_eq!(stem("balance"), "balanc");
        assert_eq!(stem("type"), "type");
    }

    #[test]
    fn test_plural_s() {
        assert_eq!(stem("deposits"), "deposit");
        assert_eq!(stem("withdrawals"), "withdrawal");
        assert_eq!(stem("class"), "class");
        assert_eq!(stem("bus"), "bus");
    }

    #[test]
    fn test_double_consonant_collapses() {
        assert_eq!(stem("fee"), "fe");
        assert_eq!(stem("falling"), "fal");
        assert_eq!(stem("miss"), "miss");
    }

    #[test]
    fn test_stem_is_idempotent_on_sample() {
        for word in [
            "running", "balance", "deposits", "charges", "opened", "withdrawals", "classes",
            "happiness", "falling", "checking", "origination", "maturity", "branch",
        ] {
            let once = stem(word);
            assert_eq!(stem(&once), once, "stem not idempotent for {}", word);
        }
    }
}
