// src/models/matching.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ResolutionError;

// Bookkeeping columns written by the aggregator
pub const ROW_DATASET_1: &str = "Row_Dataset1";
pub const ROW_DATASET_2: &str = "Row_Dataset2";
pub const FINAL_SIMILARITY: &str = "Final_Similarity";
pub const SOURCE_CHAIN: &str = "Source_Chain";

pub const BOOKKEEPING_COLUMNS: [&str; 4] =
    [ROW_DATASET_1, ROW_DATASET_2, FINAL_SIMILARITY, SOURCE_CHAIN];

pub const SOURCE_CHAIN_SEPARATOR: &str = " + ";

pub fn is_bookkeeping_column(col: &str) -> bool {
    BOOKKEEPING_COLUMNS.contains(&col)
}

/// Key under which the original value of `col` from dataset `source` is kept.
pub fn provenance_column(col: &str, source: &str) -> String {
    format!("original_{}_from_{}", col, source)
}

/// One proposed pairing between a base row and an incoming row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchCandidate {
    pub base_row: usize,
    pub incoming_row: usize,
    pub text_similarity: f64,
    pub reconstruction_score: f64,
    pub final_similarity: f64,
}

/// Which side's value survives when two matched rows disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConflictStrategy {
    #[default]
    #[serde(rename = "prefer_dataset_1")]
    PreferDataset1,
    #[serde(rename = "prefer_dataset_2")]
    PreferDataset2,
    #[serde(rename = "prefer_non_null")]
    PreferNonNull,
}

impl ConflictStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::PreferDataset1 => "prefer_dataset_1",
            ConflictStrategy::PreferDataset2 => "prefer_dataset_2",
            ConflictStrategy::PreferNonNull => "prefer_non_null",
        }
    }

    /// Unknown names fall back to `prefer_dataset_1`.
    pub fn from_name_or_default(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            log::warn!(
                "Unknown conflict strategy '{}', falling back to {}",
                name,
                ConflictStrategy::default()
            );
            ConflictStrategy::default()
        })
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "prefer_dataset_1" => Ok(ConflictStrategy::PreferDataset1),
            "prefer_dataset_2" => Ok(ConflictStrategy::PreferDataset2),
            "prefer_non_null" => Ok(ConflictStrategy::PreferNonNull),
            other => Err(ResolutionError::InvalidConfig(format!(
                "unknown conflict strategy '{}' (expected prefer_dataset_1, prefer_dataset_2 or prefer_non_null)",
                other
            ))),
        }
    }
}

/// How incoming rows are assigned to candidate base rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Each base row takes its best incoming row; incoming rows may be reused.
    #[default]
    Greedy,
    /// One-to-one assignment maximising total text similarity.
    Optimal,
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStrategy::Greedy => write!(f, "greedy"),
            MatchStrategy::Optimal => write!(f, "optimal"),
        }
    }
}

impl FromStr for MatchStrategy {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "greedy" => Ok(MatchStrategy::Greedy),
            "optimal" | "hungarian" => Ok(MatchStrategy::Optimal),
            other => Err(ResolutionError::InvalidConfig(format!(
                "unknown match strategy '{}' (expected greedy or optimal)",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_strategy_parsing() {
        assert_eq!(
            "prefer_dataset_2".parse::<ConflictStrategy>().unwrap(),
            ConflictStrategy::PreferDataset2
        );
        assert!("prefer_longest".parse::<ConflictStrategy>().is_err());
        assert_eq!(
            ConflictStrategy::from_name_or_default("prefer_longest"),
            ConflictStrategy::PreferDataset1
        );
    }

    #[test]
    fn test_conflict_strategy_serde_names() {
        let json = serde_json::to_string(&ConflictStrategy::PreferNonNull).unwrap();
        assert_eq!(json, "\"prefer_non_null\"");
        let parsed: ConflictStrategy = serde_json::from_str("\"prefer_dataset_1\"").unwrap();
        assert_eq!(parsed, ConflictStrategy::PreferDataset1);
    }

    #[test]
    fn test_provenance_column_name() {
        assert_eq!(provenance_column("city", "a.csv"), "original_city_from_a.csv");
        assert!(is_bookkeeping_column(SOURCE_CHAIN));
        assert!(!is_bookkeeping_column("city"));
    }
}
