// src/io/csv_writer.rs
use anyhow::{Context, Result};
use log::info;
use std::path::Path;

use crate::models::dataset::{format_number, Dataset};
use crate::models::matching::{MatchCandidate, FINAL_SIMILARITY, ROW_DATASET_1, ROW_DATASET_2};

pub const MATCH_TABLE_HEADERS: [&str; 5] = [
    ROW_DATASET_1,
    ROW_DATASET_2,
    "Text_Similarity",
    "MSE_Score",
    FINAL_SIMILARITY,
];

/// Writes the table in its column order. Nulls are empty cells.
pub fn write_csv(dataset: &Dataset, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(dataset.columns())?;
    for row in 0..dataset.len() {
        let record: Vec<String> = dataset
            .columns()
            .iter()
            .map(|col| dataset.value(row, col).to_string())
            .collect();
        writer
            .write_record(&record)
            .with_context(|| format!("Failed to write row {} to {}", row, path.display()))?;
    }
    writer.flush()?;
    info!("💾 Wrote {} rows to {}", dataset.len(), path.display());
    Ok(())
}

/// Per-fold match report.
pub fn write_matches_csv(matches: &[MatchCandidate], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(MATCH_TABLE_HEADERS)?;
    for m in matches {
        writer.write_record([
            m.base_row.to_string(),
            m.incoming_row.to_string(),
            format_number(m.text_similarity),
            format_number(m.reconstruction_score),
            format_number(m.final_similarity),
        ])?;
    }
    writer.flush()?;
    info!("💾 Wrote {} matches to {}", matches.len(), path.display());
    Ok(())
}
