// src/standardization/text.rs
// Lexical normalisation primitives applied to text columns before comparison.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::utils::abbreviations::AbbreviationMap;

// Anything that is neither a word character nor whitespace
static PUNCTUATION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());
// Everything except digits and the decimal point
static NON_AMOUNT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\d.]").unwrap());

pub fn to_lowercase(text: &str) -> String {
    text.to_lowercase()
}

pub fn remove_punctuation(text: &str) -> String {
    PUNCTUATION_RE.replace_all(text, "").into_owned()
}

/// Reduces an amount-like string to its digits and decimal point, so "$1,200.50"
/// and "1200.50 USD" both become "1200.50".
pub fn strip_currency_symbols(text: &str) -> String {
    NON_AMOUNT_RE.replace_all(text, "").into_owned()
}

pub fn expand_abbreviations(text: &str, abbreviations: &AbbreviationMap) -> String {
    abbreviations.expand(text)
}

/// True when the string has at least one cased character and none of its cased
/// characters are uppercase. "123" is not lowercase.
pub fn is_lowercase(text: &str) -> bool {
    let mut has_cased = false;
    for c in text.chars() {
        if c.is_uppercase() {
            return false;
        }
        if c.is_lowercase() {
            has_cased = true;
        }
    }
    has_cased
}

pub fn has_punctuation(text: &str) -> bool {
    PUNCTUATION_RE.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_punctuation() {
        assert_eq!(remove_punctuation("ACME CORP."), "ACME CORP");
        assert_eq!(remove_punctuation("o'brien & sons, inc"), "obrien  sons inc");
        assert_eq!(remove_punctuation("café_1"), "café_1");
    }

    #[test]
    fn test_strip_currency_symbols() {
        assert_eq!(strip_currency_symbols("$1,200.50"), "1200.50");
        assert_eq!(strip_currency_symbols("€ 99"), "99");
    }

    #[test]
    fn test_is_lowercase() {
        assert!(is_lowercase("acme corp"));
        assert!(is_lowercase("acme 123"));
        assert!(!is_lowercase("Acme"));
        assert!(!is_lowercase("123"));
        assert!(!is_lowercase(""));
    }

    #[test]
    fn test_has_punctuation() {
        assert!(has_punctuation("acme, inc"));
        assert!(!has_punctuation("acme inc"));
    }
}
