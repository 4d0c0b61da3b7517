// src/standardization/standardizer.rs
// Brings the shared text columns of every dataset onto a common lexical convention.

use anyhow::{bail, Result};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::ResolutionError;
use crate::models::dataset::{ColumnRole, Dataset, Value};
use crate::standardization::rules::{infer_from_reference, infer_majority_format, RuleSet};
use crate::utils::abbreviations::AbbreviationMap;

/// Number of leading values kept per column for the before/after preview.
pub const PREVIEW_SAMPLE_SIZE: usize = 5;

#[derive(Debug, Clone)]
pub enum StandardizationMode {
    /// Copy the conventions observed in one reference dataset.
    ReferenceDataset { dataset: String },
    /// Rules given verbatim per column; columns without rules are left alone.
    Manual { rules: HashMap<String, RuleSet> },
    /// Like `ReferenceDataset`, but the reference is chosen per column.
    PerColumnSource { sources: HashMap<String, String> },
    /// Infer rules from each column's own value distribution.
    MajorityVote,
}

impl fmt::Display for StandardizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StandardizationMode::ReferenceDataset { dataset } => write!(f, "reference dataset '{}'", dataset),
            StandardizationMode::Manual { rules } => write!(f, "manual ({} column rules)", rules.len()),
            StandardizationMode::PerColumnSource { sources } => {
                write!(f, "per-column source ({} columns)", sources.len())
            }
            StandardizationMode::MajorityVote => write!(f, "majority vote"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StandardizationOptions {
    pub mode: StandardizationMode,
    pub abbreviations: Option<AbbreviationMap>,
}

impl StandardizationOptions {
    pub fn new(mode: StandardizationMode) -> Self {
        Self {
            mode,
            abbreviations: None,
        }
    }

    pub fn with_abbreviations(mut self, abbreviations: AbbreviationMap) -> Self {
        self.abbreviations = Some(abbreviations);
        self
    }
}

/// Before/after sample of one text column in one dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewSample {
    pub dataset: String,
    pub rules: RuleSet,
    pub original: Vec<Value>,
    pub standardized: Vec<Value>,
}

pub type PreviewSamples = BTreeMap<String, Vec<PreviewSample>>;

/// Returns cleaned copies of `datasets` plus a preview for every standardized
/// column. Numeric columns are passed through untouched; the inputs are never
/// modified.
pub fn standardize(
    datasets: &[Dataset],
    common_columns: &[String],
    options: &StandardizationOptions,
) -> Result<(Vec<Dataset>, PreviewSamples)> {
    ensure_common_columns(datasets, common_columns)?;
    validate_mode(datasets, common_columns, &options.mode)?;
    info!(
        "🧹 Standardizing {} datasets over {} common columns (mode: {})",
        datasets.len(),
        common_columns.len(),
        options.mode
    );

    let abbreviations = options.abbreviations.as_ref();
    let mut cleaned_datasets = Vec::with_capacity(datasets.len());
    let mut previews: PreviewSamples = BTreeMap::new();

    for dataset in datasets {
        let mut cleaned = dataset.clone();

        for col in common_columns {
            match dataset.role(col) {
                None => continue,
                Some(ColumnRole::Numeric) => {
                    report_unparseable_numbers(dataset, col);
                    continue;
                }
                Some(ColumnRole::Text) => {}
            }

            let rules = derive_rules(&options.mode, datasets, dataset, col)?;
            debug!(
                "Rules for '{}' in '{}': lowercase={}, remove_punctuation={}, strip_currency={}",
                col, dataset.name(), rules.lowercase, rules.remove_punctuation, rules.strip_currency
            );

            for row_idx in 0..dataset.len() {
                let standardized = match dataset.value(row_idx, col) {
                    Value::Null => Value::Null,
                    other => Value::Text(rules.apply(&other.to_string(), abbreviations)),
                };
                cleaned.set_value(row_idx, col, standardized);
            }

            previews.entry(col.clone()).or_default().push(PreviewSample {
                dataset: dataset.name().to_string(),
                rules,
                original: dataset.column_values(col).take(PREVIEW_SAMPLE_SIZE).cloned().collect(),
                standardized: cleaned.column_values(col).take(PREVIEW_SAMPLE_SIZE).cloned().collect(),
            });
        }

        cleaned_datasets.push(cleaned);
    }

    Ok((cleaned_datasets, previews))
}

fn find_dataset<'a>(datasets: &'a [Dataset], name: &str) -> Result<&'a Dataset> {
    match datasets.iter().find(|d| d.name() == name) {
        Some(d) => Ok(d),
        None => bail!(ResolutionError::UnknownDataset {
            name: name.to_string(),
            stage: "standardization",
        }),
    }
}

fn ensure_common_columns(datasets: &[Dataset], common_columns: &[String]) -> Result<()> {
    let carried = datasets
        .iter()
        .any(|d| common_columns.iter().any(|col| d.has_column(col)));
    if carried {
        return Ok(());
    }
    let (left, right) = match datasets.split_first() {
        Some((first, rest)) => (
            first.name().to_string(),
            rest.iter().map(|d| d.name()).collect::<Vec<_>>().join(", "),
        ),
        None => (String::new(), String::new()),
    };
    bail!(ResolutionError::NoCommonColumns { left, right })
}

fn validate_mode(datasets: &[Dataset], common_columns: &[String], mode: &StandardizationMode) -> Result<()> {
    match mode {
        StandardizationMode::ReferenceDataset { dataset } => {
            find_dataset(datasets, dataset)?;
        }
        StandardizationMode::PerColumnSource { sources } => {
            for col in common_columns {
                let is_text = datasets.iter().any(|d| d.role(col) == Some(ColumnRole::Text));
                if !is_text {
                    continue;
                }
                match sources.get(col) {
                    Some(name) => {
                        find_dataset(datasets, name)?;
                    }
                    None => bail!(ResolutionError::MissingColumnSource { column: col.clone() }),
                }
            }
        }
        StandardizationMode::Manual { .. } | StandardizationMode::MajorityVote => {}
    }
    Ok(())
}

fn derive_rules(
    mode: &StandardizationMode,
    datasets: &[Dataset],
    current: &Dataset,
    col: &str,
) -> Result<RuleSet> {
    let rules = match mode {
        StandardizationMode::ReferenceDataset { dataset } => {
            let reference = find_dataset(datasets, dataset)?;
            infer_from_reference(reference.column_values(col))
        }
        StandardizationMode::Manual { rules } => rules.get(col).copied().unwrap_or_default(),
        StandardizationMode::PerColumnSource { sources } => {
            let Some(source) = sources.get(col) else {
                bail!(ResolutionError::MissingColumnSource { column: col.to_string() });
            };
            let reference = find_dataset(datasets, source)?;
            infer_from_reference(reference.column_values(col))
        }
        StandardizationMode::MajorityVote => infer_majority_format(current.column_values(col)),
    };
    Ok(rules)
}

/// Text cells in a numeric column cannot be scaled; they are treated as missing
/// downstream, so surface them here where the schema is checked.
fn report_unparseable_numbers(dataset: &Dataset, col: &str) {
    let bad = dataset
        .column_values(col)
        .filter(|v| !v.is_blank() && v.as_number().is_none())
        .count();
    if bad > 0 {
        warn!(
            "⚠️ Numeric column '{}' in '{}' has {} unparseable values; they will be treated as missing",
            col,
            dataset.name(),
            bad
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::dataset::Row;

    fn dataset(name: &str, rows: &[(&str, f64)]) -> Dataset {
        let rows: Vec<Row> = rows
            .iter()
            .map(|(n, a)| {
                let mut r = Row::new();
                r.insert("name".into(), Value::text(*n));
                r.insert("amount".into(), Value::Number(*a));
                r
            })
            .collect();
        Dataset::from_rows(name, vec!["name".into(), "amount".into()], rows)
    }

    fn common() -> Vec<String> {
        vec!["amount".into(), "name".into()]
    }

    #[test]
    fn test_manual_rules_and_numeric_passthrough() {
        let a = dataset("A", &[("Acme Corp", 100.0)]);
        let b = dataset("B", &[("ACME CORP.", 100.0)]);
        let mut rules = HashMap::new();
        rules.insert(
            "name".to_string(),
            RuleSet {
                lowercase: true,
                remove_punctuation: true,
                strip_currency: false,
            },
        );
        let options = StandardizationOptions::new(StandardizationMode::Manual { rules });

        let (cleaned, previews) = standardize(&[a.clone(), b.clone()], &common(), &options).unwrap();
        assert_eq!(cleaned[0].value(0, "name"), &Value::text("acme corp"));
        assert_eq!(cleaned[1].value(0, "name"), &Value::text("acme corp"));
        assert_eq!(cleaned[1].value(0, "amount"), &Value::Number(100.0));

        // Originals untouched
        assert_eq!(b.value(0, "name"), &Value::text("ACME CORP."));

        let name_previews = &previews["name"];
        assert_eq!(name_previews.len(), 2);
        assert_eq!(name_previews[1].original, vec![Value::text("ACME CORP.")]);
        assert_eq!(name_previews[1].standardized, vec![Value::text("acme corp")]);
        assert!(!previews.contains_key("amount"));
    }

    #[test]
    fn test_preview_kept_when_no_rule_fires() {
        let a = dataset("A", &[("x", 1.0), ("y", 2.0), ("z", 3.0), ("w", 4.0), ("v", 5.0), ("u", 6.0)]);
        let options = StandardizationOptions::new(StandardizationMode::Manual {
            rules: HashMap::new(),
        });
        let (_, previews) = standardize(&[a], &common(), &options).unwrap();
        let sample = &previews["name"][0];
        assert_eq!(sample.original.len(), PREVIEW_SAMPLE_SIZE);
        assert_eq!(sample.original, sample.standardized);
    }

    #[test]
    fn test_reference_mode_copies_reference_conventions() {
        let reference = dataset("ref", &[("acme corp", 1.0), ("globex", 2.0)]);
        let other = dataset("other", &[("Globex, Inc.", 2.0)]);
        let options = StandardizationOptions::new(StandardizationMode::ReferenceDataset {
            dataset: "ref".into(),
        });
        let (cleaned, _) = standardize(&[reference, other], &common(), &options).unwrap();
        assert_eq!(cleaned[1].value(0, "name"), &Value::text("globex inc"));
    }

    #[test]
    fn test_per_column_source_requires_known_dataset() {
        let a = dataset("A", &[("Acme", 1.0)]);
        let mut sources = HashMap::new();
        sources.insert("name".to_string(), "missing.csv".to_string());
        let options = StandardizationOptions::new(StandardizationMode::PerColumnSource { sources });
        let err = standardize(&[a.clone()], &common(), &options).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResolutionError>(),
            Some(ResolutionError::UnknownDataset { .. })
        ));

        let options = StandardizationOptions::new(StandardizationMode::PerColumnSource {
            sources: HashMap::new(),
        });
        let err = standardize(&[a], &common(), &options).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResolutionError>(),
            Some(ResolutionError::MissingColumnSource { .. })
        ));
    }

    #[test]
    fn test_majority_vote_with_abbreviations() {
        let a = dataset(
            "A",
            &[("acme st", 1.0), ("globex st", 2.0), ("initech ave", 3.0), ("Hooli St.", 4.0)],
        );
        let abbr = AbbreviationMap::new(vec![("st", "street"), ("ave", "avenue")]).unwrap();
        let options = StandardizationOptions::new(StandardizationMode::MajorityVote).with_abbreviations(abbr);
        let (cleaned, _) = standardize(&[a], &common(), &options).unwrap();
        assert_eq!(cleaned[0].value(0, "name"), &Value::text("acme street"));
        assert_eq!(cleaned[0].value(2, "name"), &Value::text("initech avenue"));
        assert_eq!(cleaned[0].value(3, "name"), &Value::text("hooli street"));
    }

    #[test]
    fn test_no_common_columns_is_fatal() {
        let a = dataset("A", &[("acme", 1.0)]);
        let b = dataset("B", &[("globex", 2.0)]);
        let options = StandardizationOptions::new(StandardizationMode::MajorityVote);

        let err = standardize(&[a.clone(), b.clone()], &[], &options).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ResolutionError>(),
            Some(&ResolutionError::NoCommonColumns {
                left: "A".to_string(),
                right: "B".to_string()
            })
        );

        let err = standardize(&[a, b], &["phone".to_string()], &options).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResolutionError>(),
            Some(ResolutionError::NoCommonColumns { .. })
        ));
    }
}
