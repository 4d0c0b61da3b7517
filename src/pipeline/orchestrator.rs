// src/pipeline/orchestrator.rs
//! Left-to-right fold over N datasets.
//!
//! `base ← datasets[0]`, then for every following dataset
//! `base ← aggregate(resolve_pair(base, next), base, next)`. Each fold consumes
//! the previous fold's output, so folds run strictly one after another.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use indicatif::{MultiProgress, ProgressBar};
use log::info;
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use uuid::Uuid;

use crate::aggregation::aggregate::{aggregate, unmatched_rows};
use crate::error::ResolutionError;
use crate::matching::engine::resolve_pair;
use crate::models::dataset::Dataset;
use crate::models::matching::{ConflictStrategy, MatchCandidate};
use crate::models::stats_models::{FoldStats, ResolutionStats};
use crate::utils::get_memory_usage;
use crate::utils::progress_config::{fold_progress_bar, stage_spinner, ProgressConfig};
use crate::utils::resolution_config::ResolutionConfig;

/// Candidates selected in one fold, kept for the optional match report.
#[derive(Debug, Clone)]
pub struct FoldMatches {
    pub base_name: String,
    pub incoming_name: String,
    pub matches: Vec<MatchCandidate>,
}

#[derive(Debug, Clone)]
pub struct ResolutionOutcome {
    pub resolved: Dataset,
    pub stats: ResolutionStats,
    pub fold_matches: Vec<FoldMatches>,
}

fn mean_similarity(matches: &[MatchCandidate]) -> Option<f64> {
    if matches.is_empty() {
        None
    } else {
        Some(matches.iter().map(|m| m.final_similarity).sum::<f64>() / matches.len() as f64)
    }
}

async fn update_fold_message(pb: &ProgressBar, progress: &ProgressConfig, fold: usize, base: &str, incoming: &str) {
    if progress.should_show_memory() {
        let memory_mb = get_memory_usage().await;
        pb.set_message(format!("Fold {}: {} ⨝ {} (Memory: {} MB)", fold, base, incoming, memory_mb));
    } else {
        pb.set_message(format!("Fold {}: {} ⨝ {}", fold, base, incoming));
    }
}

/// Dataset names key the provenance columns, so they must be distinct.
pub fn ensure_distinct_names(datasets: &[Dataset]) -> Result<()> {
    let mut seen = HashSet::new();
    for dataset in datasets {
        if !seen.insert(dataset.name()) {
            bail!(ResolutionError::DuplicateDatasetName {
                name: dataset.name().to_string(),
            });
        }
    }
    Ok(())
}

/// Resolves all datasets into one table, in input order.
pub async fn resolve_all(
    datasets: &[Dataset],
    conflict_strategies: &HashMap<String, ConflictStrategy>,
    config: &ResolutionConfig,
    progress: &ProgressConfig,
    multi_progress: Option<&MultiProgress>,
) -> Result<ResolutionOutcome> {
    if datasets.len() < 2 {
        bail!(ResolutionError::NotEnoughDatasets(datasets.len()));
    }
    ensure_distinct_names(datasets)?;

    let run_id = Uuid::new_v4().to_string();
    let started_at = Utc::now().naive_utc();
    let run_start = Instant::now();
    info!(
        "🚀 Starting entity resolution run {} over {} datasets",
        run_id,
        datasets.len()
    );

    let main_pb = multi_progress.map(|mp| fold_progress_bar(mp, (datasets.len() - 1) as u64));

    let mut base = datasets[0].clone();
    let mut folds = Vec::with_capacity(datasets.len() - 1);
    let mut fold_matches = Vec::with_capacity(datasets.len() - 1);

    for (fold_idx, incoming) in datasets[1..].iter().enumerate() {
        let fold_start = Instant::now();
        let fold_no = fold_idx + 1;
        if let Some(pb) = &main_pb {
            update_fold_message(pb, progress, fold_no, base.name(), incoming.name()).await;
        }
        let spinner = match multi_progress {
            Some(mp) if progress.should_show_detailed() => Some(stage_spinner(
                mp,
                format!("Scoring {} against {}", base.name(), incoming.name()),
            )),
            _ => None,
        };

        let matches = resolve_pair(&base, incoming, config)
            .await
            .with_context(|| format!("Fold {} ('{}' ⨝ '{}') failed", fold_no, base.name(), incoming.name()))?;

        if let Some(sp) = &spinner {
            sp.set_message(format!("Aggregating {} matches", matches.len()));
        }
        let resolved = aggregate(&matches, &base, incoming, conflict_strategies)
            .with_context(|| format!("Aggregation failed in fold {}", fold_no))?;

        let (unmatched_base, unmatched_incoming) = unmatched_rows(&matches, base.len(), incoming.len());
        let stats = FoldStats {
            base_name: base.name().to_string(),
            incoming_name: incoming.name().to_string(),
            base_rows: base.len(),
            incoming_rows: incoming.len(),
            matches: matches.len(),
            unmatched_base: unmatched_base.len(),
            unmatched_incoming: unmatched_incoming.len(),
            output_rows: resolved.len(),
            mean_similarity: mean_similarity(&matches),
            duration_secs: fold_start.elapsed().as_secs_f64(),
        };
        stats.log_summary();

        if let Some(sp) = spinner {
            sp.finish_and_clear();
        }
        if let Some(pb) = &main_pb {
            pb.inc(1);
        }

        fold_matches.push(FoldMatches {
            base_name: stats.base_name.clone(),
            incoming_name: stats.incoming_name.clone(),
            matches,
        });
        folds.push(stats);
        base = resolved;
    }

    if let Some(pb) = &main_pb {
        pb.finish_with_message(format!("Resolved into {} rows", base.len()));
    }

    let stats = ResolutionStats {
        run_id,
        started_at,
        folds,
        total_processing_time: run_start.elapsed().as_secs_f64(),
    };
    info!(
        "✅ Resolution run {} finished: {} folds, {} matches, {} rows in {:.2}s",
        stats.run_id,
        stats.folds.len(),
        stats.total_matches(),
        stats.final_rows(),
        stats.total_processing_time
    );

    Ok(ResolutionOutcome {
        resolved: base,
        stats,
        fold_matches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::dataset::{common_columns, Row, Value};
    use crate::models::matching::{FINAL_SIMILARITY, SOURCE_CHAIN};
    use crate::standardization::rules::RuleSet;
    use crate::standardization::standardizer::{standardize, StandardizationMode, StandardizationOptions};

    fn company(name: &str, company: &str, amount: f64) -> Dataset {
        let mut r = Row::new();
        r.insert("name".into(), Value::text(company));
        r.insert("amount".into(), Value::Number(amount));
        Dataset::from_rows(name, vec!["name".into(), "amount".into()], vec![r])
    }

    fn quiet() -> ProgressConfig {
        ProgressConfig {
            enabled: false,
            detailed: false,
            show_memory: false,
        }
    }

    #[tokio::test]
    async fn test_end_to_end_single_entity() {
        let a = company("A", "Acme Corp", 100.0);
        let b = company("B", "ACME CORP.", 100.0);
        let datasets = vec![a, b];

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
        let (cleaned, _) = standardize(&datasets, &common_columns(&datasets), &options).unwrap();

        let outcome = resolve_all(&cleaned, &HashMap::new(), &ResolutionConfig::default(), &quiet(), None)
            .await
            .unwrap();

        let resolved = &outcome.resolved;
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved.value(0, "name"), &Value::text("acme corp"));
        assert_eq!(resolved.value(0, SOURCE_CHAIN), &Value::text("A + B"));
        let sim = resolved.value(0, FINAL_SIMILARITY).as_number().unwrap();
        assert!((sim - 1.0).abs() < 1e-9);

        assert_eq!(outcome.stats.folds.len(), 1);
        assert_eq!(outcome.stats.total_matches(), 1);
        assert_eq!(outcome.stats.folds[0].unmatched_base, 0);
        assert_eq!(outcome.stats.folds[0].unmatched_incoming, 0);
    }

    #[tokio::test]
    async fn test_three_way_fold_chains_sources() {
        let datasets = vec![
            company("A", "acme corp", 100.0),
            company("B", "acme corp", 100.0),
            company("C", "acme corp", 100.0),
        ];
        let outcome = resolve_all(&datasets, &HashMap::new(), &ResolutionConfig::default(), &quiet(), None)
            .await
            .unwrap();

        assert_eq!(outcome.resolved.name(), "resolved_resolved_A_B_C");
        assert_eq!(outcome.resolved.value(0, SOURCE_CHAIN), &Value::text("A + B + C"));
        assert_eq!(outcome.fold_matches.len(), 2);
        assert_eq!(outcome.stats.final_rows(), 1);
    }

    #[tokio::test]
    async fn test_single_dataset_is_rejected() {
        let err = resolve_all(
            &[company("A", "acme", 1.0)],
            &HashMap::new(),
            &ResolutionConfig::default(),
            &quiet(),
            None,
        )
        .await
        .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ResolutionError>(),
            Some(&ResolutionError::NotEnoughDatasets(1))
        );
    }

    #[tokio::test]
    async fn test_duplicate_dataset_names_are_rejected() {
        let datasets = vec![
            company("data.csv", "nyc", 1.0),
            company("data.csv", "new york", 1.0),
        ];
        let err = resolve_all(&datasets, &HashMap::new(), &ResolutionConfig::default(), &quiet(), None)
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ResolutionError>(),
            Some(&ResolutionError::DuplicateDatasetName {
                name: "data.csv".to_string()
            })
        );
    }

    #[test]
    fn test_ensure_distinct_names() {
        let a = company("a/data.csv", "nyc", 1.0);
        let b = company("b/data.csv", "nyc", 1.0);
        assert!(ensure_distinct_names(&[a.clone(), b]).is_ok());
        assert!(ensure_distinct_names(&[a.clone(), company("x", "y", 2.0), a]).is_err());
    }
}
