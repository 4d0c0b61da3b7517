// src/aggregation/aggregate.rs
//! Folds one `base ⨝ incoming` step into a single resolved table.
//!
//! Output row groups, in order: one row per match, then the unmatched base rows,
//! then the unmatched incoming rows. Every row gets the same column set; cells a
//! group has no value for read as null.

use anyhow::{bail, Result};
use log::info;
use std::collections::{BTreeSet, HashMap};

use crate::aggregation::conflict::{resolve_conflict, strategy_for};
use crate::error::ResolutionError;
use crate::matching::engine::shared_columns;
use crate::models::dataset::{format_number, ColumnRole, Dataset, Row, Value};
use crate::models::matching::{
    is_bookkeeping_column, provenance_column, ConflictStrategy, MatchCandidate, FINAL_SIMILARITY,
    ROW_DATASET_1, ROW_DATASET_2, SOURCE_CHAIN, SOURCE_CHAIN_SEPARATOR,
};

/// Name given to the table produced by folding `incoming` into `base`.
pub fn resolved_name(base: &Dataset, incoming: &Dataset) -> String {
    format!("resolved_{}_{}", base.name(), incoming.name())
}

/// Row indices of each side that no match consumed, in index order.
pub fn unmatched_rows(matches: &[MatchCandidate], base_len: usize, incoming_len: usize) -> (Vec<usize>, Vec<usize>) {
    let matched_base: BTreeSet<usize> = matches.iter().map(|m| m.base_row).collect();
    let matched_incoming: BTreeSet<usize> = matches.iter().map(|m| m.incoming_row).collect();
    (
        (0..base_len).filter(|i| !matched_base.contains(i)).collect(),
        (0..incoming_len).filter(|j| !matched_incoming.contains(j)).collect(),
    )
}

/// Lineage of a row: its carried `Source_Chain`, or the dataset name on a first fold.
fn source_chain(dataset: &Dataset, row: usize) -> String {
    match dataset.value(row, SOURCE_CHAIN) {
        Value::Text(chain) if !chain.is_empty() => chain.clone(),
        _ => dataset.name().to_string(),
    }
}

fn conform(value: Value, role: Option<ColumnRole>) -> Value {
    match (role, value) {
        (Some(ColumnRole::Text), Value::Number(n)) => Value::Text(format_number(n)),
        (Some(ColumnRole::Numeric), Value::Text(s)) => {
            Value::Text(s).as_number().map_or(Value::Null, Value::Number)
        }
        (_, v) => v,
    }
}

fn push_conformed(out: &mut Dataset, row: Row) {
    let row = row
        .into_iter()
        .map(|(col, v)| {
            let role = out.role(&col);
            (col, conform(v, role))
        })
        .collect();
    out.push_row(row);
}

fn own_columns<'a>(dataset: &'a Dataset, common: &'a [String]) -> impl Iterator<Item = &'a String> + 'a {
    dataset
        .columns()
        .iter()
        .filter(move |c| !is_bookkeeping_column(c) && !common.contains(c))
}

fn output_schema(base: &Dataset, incoming: &Dataset, common: &[String], name: String) -> Dataset {
    let mut out = Dataset::new(name, Vec::new());

    for col in common {
        let role = match (base.role(col), incoming.role(col)) {
            (Some(a), Some(b)) if a == b => a,
            _ => ColumnRole::Text,
        };
        out.add_column(col, role);
    }
    for col in common {
        for side in [base, incoming] {
            let role = side.role(col).unwrap_or(ColumnRole::Text);
            out.add_column(&provenance_column(col, side.name()), role);
        }
    }
    for side in [base, incoming] {
        for col in own_columns(side, common) {
            out.add_column(col, side.role(col).unwrap_or(ColumnRole::Text));
        }
    }

    out.add_column(ROW_DATASET_1, ColumnRole::Numeric);
    out.add_column(ROW_DATASET_2, ColumnRole::Numeric);
    out.add_column(FINAL_SIMILARITY, ColumnRole::Numeric);
    out.add_column(SOURCE_CHAIN, ColumnRole::Text);
    out
}

fn index_value(idx: Option<usize>) -> Value {
    idx.map_or(Value::Null, |i| Value::Number(i as f64))
}

fn unmatched_row(side: &Dataset, idx: usize, is_base: bool) -> Row {
    let mut row = Row::new();
    for col in side.columns().iter().filter(|c| !is_bookkeeping_column(c)) {
        row.insert(col.clone(), side.value(idx, col).clone());
    }
    let (r1, r2) = if is_base { (Some(idx), None) } else { (None, Some(idx)) };
    row.insert(ROW_DATASET_1.to_string(), index_value(r1));
    row.insert(ROW_DATASET_2.to_string(), index_value(r2));
    row.insert(FINAL_SIMILARITY.to_string(), Value::Null);
    row.insert(SOURCE_CHAIN.to_string(), Value::Text(source_chain(side, idx)));
    row
}

/// Merges matched pairs under the per-column conflict strategies and appends
/// every unmatched row of both sides.
pub fn aggregate(
    matches: &[MatchCandidate],
    base: &Dataset,
    incoming: &Dataset,
    conflict_strategies: &HashMap<String, ConflictStrategy>,
) -> Result<Dataset> {
    if base.name() == incoming.name() {
        bail!(ResolutionError::DuplicateDatasetName {
            name: base.name().to_string(),
        });
    }
    for m in matches {
        if m.base_row >= base.len() || m.incoming_row >= incoming.len() {
            bail!(
                "Match ({}, {}) is out of range for '{}' ({} rows) and '{}' ({} rows)",
                m.base_row,
                m.incoming_row,
                base.name(),
                base.len(),
                incoming.name(),
                incoming.len()
            );
        }
    }

    let common = shared_columns(base, incoming);
    let mut out = output_schema(base, incoming, &common, resolved_name(base, incoming));

    for m in matches {
        let (i, j) = (m.base_row, m.incoming_row);
        let mut row = Row::new();

        for col in &common {
            let base_value = base.value(i, col);
            let incoming_value = incoming.value(j, col);
            let strategy = strategy_for(col, conflict_strategies);
            row.insert(col.clone(), resolve_conflict(base_value, incoming_value, strategy));
            row.insert(provenance_column(col, base.name()), base_value.clone());
            row.insert(provenance_column(col, incoming.name()), incoming_value.clone());
        }
        for col in own_columns(base, &common) {
            row.insert(col.clone(), base.value(i, col).clone());
        }
        for col in own_columns(incoming, &common) {
            row.entry(col.clone()).or_insert_with(|| incoming.value(j, col).clone());
        }

        row.insert(ROW_DATASET_1.to_string(), index_value(Some(i)));
        row.insert(ROW_DATASET_2.to_string(), index_value(Some(j)));
        row.insert(FINAL_SIMILARITY.to_string(), Value::Number(m.final_similarity));
        row.insert(
            SOURCE_CHAIN.to_string(),
            Value::Text(format!(
                "{}{}{}",
                source_chain(base, i),
                SOURCE_CHAIN_SEPARATOR,
                source_chain(incoming, j)
            )),
        );
        push_conformed(&mut out, row);
    }

    let (unmatched_base, unmatched_incoming) = unmatched_rows(matches, base.len(), incoming.len());
    for &i in &unmatched_base {
        push_conformed(&mut out, unmatched_row(base, i, true));
    }
    for &j in &unmatched_incoming {
        push_conformed(&mut out, unmatched_row(incoming, j, false));
    }

    info!(
        "🧩 Aggregated '{}': {} matched, {} unmatched from '{}', {} unmatched from '{}' ({} rows, {} columns)",
        out.name(),
        matches.len(),
        unmatched_base.len(),
        base.name(),
        unmatched_incoming.len(),
        incoming.name(),
        out.len(),
        out.columns().len()
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cities(name: &str, values: &[&str]) -> Dataset {
        let rows = values
            .iter()
            .map(|v| {
                let mut r = Row::new();
                r.insert("city".into(), Value::text(*v));
                r
            })
            .collect();
        Dataset::from_rows(name, vec!["city".into()], rows)
    }

    fn candidate(i: usize, j: usize, s: f64) -> MatchCandidate {
        MatchCandidate {
            base_row: i,
            incoming_row: j,
            text_similarity: s,
            reconstruction_score: 1.0,
            final_similarity: s,
        }
    }

    #[test]
    fn test_conflict_strategy_and_provenance() {
        let a = cities("A", &["NYC"]);
        let b = cities("B", &["New York"]);
        let mut strategies = HashMap::new();
        strategies.insert("city".to_string(), ConflictStrategy::PreferDataset2);

        let out = aggregate(&[candidate(0, 0, 0.8)], &a, &b, &strategies).unwrap();
        assert_eq!(out.name(), "resolved_A_B");
        assert_eq!(out.len(), 1);
        assert_eq!(out.value(0, "city"), &Value::text("New York"));
        assert_eq!(out.value(0, "original_city_from_A"), &Value::text("NYC"));
        assert_eq!(out.value(0, "original_city_from_B"), &Value::text("New York"));
        assert_eq!(out.value(0, SOURCE_CHAIN), &Value::text("A + B"));
        assert_eq!(out.value(0, FINAL_SIMILARITY), &Value::Number(0.8));
    }

    #[test]
    fn test_prefer_non_null_takes_incoming_when_base_blank() {
        let a = cities("A", &[""]);
        let b = cities("B", &["Boston"]);
        let mut strategies = HashMap::new();
        strategies.insert("city".to_string(), ConflictStrategy::PreferNonNull);
        let out = aggregate(&[candidate(0, 0, 0.5)], &a, &b, &strategies).unwrap();
        assert_eq!(out.value(0, "city"), &Value::text("Boston"));
    }

    #[test]
    fn test_row_conservation_with_reused_incoming_row() {
        let a = cities("A", &["boston", "boston ma", "chicago", "denver"]);
        let b = cities("B", &["boston", "austin", "miami"]);
        let matches = vec![candidate(0, 0, 1.0), candidate(1, 0, 0.7)];
        let out = aggregate(&matches, &a, &b, &HashMap::new()).unwrap();

        // 2 matches + 2 unmatched base + 2 unmatched incoming
        assert_eq!(out.len(), 6);

        let mut base_indices = Vec::new();
        let mut incoming_only = Vec::new();
        for (r, row) in out.rows().iter().enumerate() {
            let r1 = out.value(r, ROW_DATASET_1).as_number();
            let r2 = out.value(r, ROW_DATASET_2).as_number();
            let sim = row.get(FINAL_SIMILARITY).and_then(Value::as_number);
            match (r1, r2) {
                (Some(i), Some(_)) => {
                    assert!(sim.is_some());
                    base_indices.push(i as usize);
                }
                (Some(i), None) => {
                    assert!(sim.is_none());
                    base_indices.push(i as usize);
                }
                (None, Some(j)) => {
                    assert!(sim.is_none());
                    incoming_only.push(j as usize);
                }
                (None, None) => panic!("row {} has no provenance", r),
            }
        }
        base_indices.sort();
        assert_eq!(base_indices, vec![0, 1, 2, 3]);
        assert_eq!(incoming_only, vec![1, 2]);

        // Unmatched rows keep their values and get a single-dataset chain
        assert_eq!(out.value(2, "city"), &Value::text("chicago"));
        assert!(out.value(2, "original_city_from_A").is_null());
        assert_eq!(out.value(5, SOURCE_CHAIN), &Value::text("B"));
    }

    #[test]
    fn test_source_chain_and_extra_columns_survive_folds() {
        let a = cities("A", &["boston"]);
        let b = cities("B", &["boston"]);
        let first = aggregate(&[candidate(0, 0, 1.0)], &a, &b, &HashMap::new()).unwrap();

        let mut c = cities("C", &["boston", "tulsa"]);
        c.add_column("zip", ColumnRole::Text);
        c.set_value(0, "zip", Value::text("02101"));

        let second = aggregate(&[candidate(0, 0, 0.9)], &first, &c, &HashMap::new()).unwrap();
        assert_eq!(second.name(), "resolved_resolved_A_B_C");
        assert_eq!(second.value(0, SOURCE_CHAIN), &Value::text("A + B + C"));
        assert_eq!(second.value(0, "original_city_from_A"), &Value::text("boston"));
        assert_eq!(second.value(0, "original_city_from_resolved_A_B"), &Value::text("boston"));
        assert_eq!(second.value(0, "zip"), &Value::text("02101"));
        assert_eq!(second.value(1, SOURCE_CHAIN), &Value::text("C"));
        assert!(second.value(1, ROW_DATASET_1).is_null());
    }

    #[test]
    fn test_out_of_range_match_is_rejected() {
        let a = cities("A", &["x"]);
        let b = cities("B", &["y"]);
        assert!(aggregate(&[candidate(0, 3, 0.1)], &a, &b, &HashMap::new()).is_err());
    }

    #[test]
    fn test_same_named_sides_are_rejected() {
        let a = cities("data.csv", &["NYC"]);
        let b = cities("data.csv", &["New York"]);
        let err = aggregate(&[candidate(0, 0, 0.9)], &a, &b, &HashMap::new()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ResolutionError>(),
            Some(&ResolutionError::DuplicateDatasetName {
                name: "data.csv".to_string()
            })
        );
    }
}
