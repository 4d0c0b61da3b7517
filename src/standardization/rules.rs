// src/standardization/rules.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::models::dataset::Value;
use crate::standardization::text::{
    expand_abbreviations, has_punctuation, is_lowercase, remove_punctuation,
    strip_currency_symbols, to_lowercase,
};
use crate::utils::abbreviations::AbbreviationMap;

/// How many non-null values of a reference column are inspected.
pub const REFERENCE_SAMPLE_SIZE: usize = 20;
/// Lowercase share above which a column is lowercased.
pub const MAJORITY_LOWERCASE_THRESHOLD: f64 = 0.6;
/// Punctuated share below which punctuation is stripped.
pub const MAJORITY_PUNCTUATION_THRESHOLD: f64 = 0.4;

/// Per-column formatting rules. A missing flag means "leave as is".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub lowercase: bool,
    #[serde(default)]
    pub remove_punctuation: bool,
    #[serde(default)]
    pub strip_currency: bool,
}

impl RuleSet {
    /// Applies the rules in their fixed order: lowercase, punctuation, currency,
    /// then abbreviation expansion.
    pub fn apply(&self, text: &str, abbreviations: Option<&AbbreviationMap>) -> String {
        let mut out = if self.lowercase {
            to_lowercase(text)
        } else {
            text.to_string()
        };
        if self.remove_punctuation {
            out = remove_punctuation(&out);
        }
        if self.strip_currency {
            out = strip_currency_symbols(&out);
        }
        if let Some(abbr) = abbreviations.filter(|a| !a.is_empty()) {
            out = expand_abbreviations(&out, abbr);
        }
        out
    }
}

/// Copies the conventions of a reference column: lowercase iff every sampled value
/// is already lowercase, strip punctuation iff none of them carries any.
/// An empty sample satisfies both conditions.
pub fn infer_from_reference<'a>(values: impl Iterator<Item = &'a Value>) -> RuleSet {
    let sample: Vec<String> = values
        .filter(|v| !v.is_null())
        .take(REFERENCE_SAMPLE_SIZE)
        .map(|v| v.to_string())
        .collect();
    RuleSet {
        lowercase: sample.iter().all(|s| is_lowercase(s)),
        remove_punctuation: sample.iter().all(|s| !has_punctuation(s)),
        strip_currency: false,
    }
}

/// Majority vote over the column's own non-null values.
pub fn infer_majority_format<'a>(values: impl Iterator<Item = &'a Value>) -> RuleSet {
    let mut total = 0usize;
    let mut lowercase = 0usize;
    let mut punctuated = 0usize;
    for v in values.filter(|v| !v.is_null()) {
        let s = v.to_string();
        total += 1;
        if is_lowercase(&s) {
            lowercase += 1;
        }
        if has_punctuation(&s) {
            punctuated += 1;
        }
    }

    if total == 0 {
        return RuleSet::default();
    }

    let lowercase_ratio = lowercase as f64 / total as f64;
    let punct_ratio = punctuated as f64 / total as f64;
    RuleSet {
        lowercase: lowercase_ratio > MAJORITY_LOWERCASE_THRESHOLD,
        remove_punctuation: punct_ratio < MAJORITY_PUNCTUATION_THRESHOLD,
        strip_currency: false,
    }
}

/// Manual rules keyed by column, e.g.
///
/// ```yaml
/// name: { lowercase: true, remove_punctuation: true }
/// price: { strip_currency: true }
/// ```
pub fn manual_rules_from_yaml_str(yaml: &str) -> Result<HashMap<String, RuleSet>> {
    if yaml.trim().is_empty() {
        return Ok(HashMap::new());
    }
    let rules: HashMap<String, RuleSet> =
        serde_yaml::from_str(yaml).context("Failed to parse manual standardization rules")?;
    Ok(rules
        .into_iter()
        .map(|(col, r)| (col.trim().to_lowercase(), r))
        .collect())
}

pub fn manual_rules_from_yaml_file(path: &Path) -> Result<HashMap<String, RuleSet>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read rules file {}", path.display()))?;
    manual_rules_from_yaml_str(&text).with_context(|| format!("Invalid rules file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(values: &[&str]) -> Vec<Value> {
        values.iter().map(|s| Value::text(*s)).collect()
    }

    #[test]
    fn test_majority_vote_inference() {
        // 8/10 lowercase, 1/10 punctuated
        let values = texts(&[
            "acme", "globex", "initech", "umbrella", "hooli", "stark", "wayne", "wonka",
            "Tyrell", "Cyberdyne!",
        ]);
        let rules = infer_majority_format(values.iter());
        assert_eq!(
            rules,
            RuleSet {
                lowercase: true,
                remove_punctuation: true,
                strip_currency: false
            }
        );
    }

    #[test]
    fn test_majority_vote_ignores_nulls_and_handles_empty() {
        let values = vec![Value::Null, Value::Null];
        assert_eq!(infer_majority_format(values.iter()), RuleSet::default());

        let values = vec![Value::text("A.B."), Value::text("C.D."), Value::Null];
        let rules = infer_majority_format(values.iter());
        assert!(!rules.lowercase);
        assert!(!rules.remove_punctuation);
    }

    #[test]
    fn test_reference_inference_uses_first_twenty() {
        let mut values = texts(&["acme corp"; 20]);
        values.push(Value::text("ACME, INC."));
        let rules = infer_from_reference(values.iter());
        assert!(rules.lowercase);
        assert!(rules.remove_punctuation);

        let values = texts(&["acme corp", "Globex"]);
        let rules = infer_from_reference(values.iter());
        assert!(!rules.lowercase);
        assert!(rules.remove_punctuation);
    }

    #[test]
    fn test_apply_order_and_idempotence() {
        let abbr = AbbreviationMap::new(vec![("corp", "corporation")]).unwrap();
        let rules = RuleSet {
            lowercase: true,
            remove_punctuation: true,
            strip_currency: false,
        };
        let once = rules.apply("ACME CORP.", Some(&abbr));
        assert_eq!(once, "acme corporation");
        assert_eq!(rules.apply(&once, Some(&abbr)), once);
    }

    #[test]
    fn test_noop_rules_leave_text_untouched() {
        assert_eq!(RuleSet::default().apply("Acme, Inc.", None), "Acme, Inc.");
    }

    #[test]
    fn test_manual_rules_yaml() {
        let yaml = "Name:\n  lowercase: true\nprice:\n  strip_currency: true\n";
        let rules = manual_rules_from_yaml_str(yaml).unwrap();
        assert!(rules["name"].lowercase);
        assert!(!rules["name"].remove_punctuation);
        assert!(rules["price"].strip_currency);
    }
}
