// src/models/stats_models.rs
use chrono::NaiveDateTime;
use log::info;
use serde::Serialize;

use crate::models::dataset::{Dataset, Value};
use crate::models::matching::FINAL_SIMILARITY;

/// Outcome of folding one incoming dataset into the running base.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FoldStats {
    pub base_name: String,
    pub incoming_name: String,
    pub base_rows: usize,
    pub incoming_rows: usize,
    pub matches: usize,
    pub unmatched_base: usize,
    pub unmatched_incoming: usize,
    pub output_rows: usize,
    pub mean_similarity: Option<f64>,
    pub duration_secs: f64,
}

impl FoldStats {
    pub fn log_summary(&self) {
        info!(
            "📊 Fold '{}' ⨝ '{}': {} matches, {} unmatched base rows, {} unmatched incoming rows -> {} rows in {:.2}s",
            self.base_name,
            self.incoming_name,
            self.matches,
            self.unmatched_base,
            self.unmatched_incoming,
            self.output_rows,
            self.duration_secs
        );
        if let Some(mean) = self.mean_similarity {
            info!("   Mean final similarity: {:.4}", mean);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolutionStats {
    pub run_id: String,
    pub started_at: NaiveDateTime,
    pub folds: Vec<FoldStats>,
    pub total_processing_time: f64,
}

impl ResolutionStats {
    pub fn total_matches(&self) -> usize {
        self.folds.iter().map(|f| f.matches).sum()
    }

    pub fn final_rows(&self) -> usize {
        self.folds.last().map_or(0, |f| f.output_rows)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// Buckets the non-null `Final_Similarity` values of a resolved table over [0, 1].
/// The last bin is closed on the right so a perfect 1.0 is counted.
pub fn similarity_histogram(dataset: &Dataset, bins: usize) -> Vec<HistogramBin> {
    let bins = bins.max(1);
    let width = 1.0 / bins as f64;
    let mut counts = vec![0usize; bins];

    for value in dataset.column_values(FINAL_SIMILARITY) {
        if let Value::Number(s) = value {
            if !s.is_finite() {
                continue;
            }
            let idx = ((s.clamp(0.0, 1.0) / width) as usize).min(bins - 1);
            counts[idx] += 1;
        }
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: i as f64 * width,
            upper: (i + 1) as f64 * width,
            count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::dataset::ColumnRole;
    use std::collections::HashMap;

    #[test]
    fn test_histogram_counts_matched_rows_only() {
        let mut ds = Dataset::new(
            "resolved",
            vec![(FINAL_SIMILARITY.to_string(), ColumnRole::Numeric)],
        );
        for v in [Value::Number(0.02), Value::Number(1.0), Value::Number(0.55), Value::Null] {
            let mut row = HashMap::new();
            row.insert(FINAL_SIMILARITY.to_string(), v);
            ds.push_row(row);
        }

        let hist = similarity_histogram(&ds, 20);
        assert_eq!(hist.len(), 20);
        assert_eq!(hist.iter().map(|b| b.count).sum::<usize>(), 3);
        assert_eq!(hist[0].count, 1);
        assert_eq!(hist[11].count, 1);
        assert_eq!(hist[19].count, 1);
    }
}
