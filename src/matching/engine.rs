// src/matching/engine.rs
//! Pairwise similarity engine: text signal, numeric reconstruction signal and
//! candidate selection for one `base ⨝ incoming` step.

use anyhow::{bail, Context, Result};
use log::{debug, info};
use std::time::Instant;

use crate::candidate_generation::selector::{candidate_limit, select_matches};
use crate::error::ResolutionError;
use crate::matching::reconstruction::reconstruction_signal;
use crate::matching::tfidf::{cosine_similarity_matrix, TfidfVectorizer};
use crate::models::dataset::{ColumnRole, Dataset, Value};
use crate::models::matching::{is_bookkeeping_column, MatchCandidate};
use crate::utils::resolution_config::ResolutionConfig;

/// Shared columns of a pair, split by role. Columns typed differently on the
/// two sides take part in neither signal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairColumns {
    pub text: Vec<String>,
    pub numeric: Vec<String>,
}

/// Columns both datasets carry, in base column order, without bookkeeping columns.
pub fn shared_columns(base: &Dataset, incoming: &Dataset) -> Vec<String> {
    base.columns()
        .iter()
        .filter(|c| !is_bookkeeping_column(c) && incoming.has_column(c))
        .cloned()
        .collect()
}

pub fn pair_columns(base: &Dataset, incoming: &Dataset) -> PairColumns {
    let mut columns = PairColumns::default();
    for col in shared_columns(base, incoming) {
        match (base.role(&col), incoming.role(&col)) {
            (Some(ColumnRole::Text), Some(ColumnRole::Text)) => columns.text.push(col),
            (Some(ColumnRole::Numeric), Some(ColumnRole::Numeric)) => columns.numeric.push(col),
            (b, i) => debug!("Column '{}' has mismatched roles ({:?} vs {:?}); skipping", col, b, i),
        }
    }
    columns
}

/// Space-joined text columns of every row; nulls contribute an empty string.
pub fn concatenated_text(dataset: &Dataset, text_columns: &[String]) -> Vec<String> {
    (0..dataset.len())
        .map(|row| {
            text_columns
                .iter()
                .map(|col| match dataset.value(row, col) {
                    Value::Null => String::new(),
                    v => v.to_string(),
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

/// `base.len() × incoming.len()` cosine matrix with the vocabulary fit on `base`.
pub fn text_similarity_matrix(base: &Dataset, incoming: &Dataset, text_columns: &[String]) -> Vec<Vec<f64>> {
    let base_docs = concatenated_text(base, text_columns);
    let incoming_docs = concatenated_text(incoming, text_columns);

    let vectorizer = TfidfVectorizer::fit(&base_docs);
    if vectorizer.vocabulary_len() == 0 {
        debug!(
            "Empty vocabulary for '{}'; text similarity is 0 for every pair",
            base.name()
        );
    }
    cosine_similarity_matrix(
        &vectorizer.transform(&base_docs),
        &vectorizer.transform(&incoming_docs),
    )
}

/// Scores `base` against `incoming` and returns the selected match candidates.
///
/// The vectorizer and both reconstruction models are built for this call only.
pub async fn resolve_pair(
    base: &Dataset,
    incoming: &Dataset,
    config: &ResolutionConfig,
) -> Result<Vec<MatchCandidate>> {
    let start = Instant::now();
    let columns = pair_columns(base, incoming);
    if shared_columns(base, incoming).is_empty() {
        bail!(ResolutionError::NoCommonColumns {
            left: base.name().to_string(),
            right: incoming.name().to_string(),
        });
    }

    info!(
        "🔗 Resolving '{}' ({} rows) against '{}' ({} rows): {} text / {} numeric columns",
        base.name(),
        base.len(),
        incoming.name(),
        incoming.len(),
        columns.text.len(),
        columns.numeric.len()
    );

    let text_sim = text_similarity_matrix(base, incoming, &columns.text);

    let reconstruction = reconstruction_signal(base, incoming, &columns.numeric, config.autoencoder)
        .await
        .with_context(|| {
            format!(
                "Numeric similarity failed for '{}' vs '{}' over columns {:?}",
                base.name(),
                incoming.name(),
                columns.numeric
            )
        })?;

    let limit = candidate_limit(config.max_candidates, base.len(), incoming.len());
    let matches = select_matches(
        &text_sim,
        &reconstruction,
        config.match_strategy,
        limit,
        config.tfidf_weight,
        config.mse_weight,
    );

    info!(
        "   Selected {} candidate matches ({} strategy) in {:.2}s",
        matches.len(),
        config.match_strategy,
        start.elapsed().as_secs_f64()
    );
    Ok(matches)
}
