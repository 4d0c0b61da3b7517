// src/candidate_generation/selector.rs
// Picks which incoming row each candidate base row is paired with.
//
// Only the first `min(cap, |base|, |incoming|)` base rows, in index order, are
// considered. Selection looks at text similarity only; the reconstruction score
// is attached afterwards and never changes which pairs are chosen.

use log::debug;
use pathfinding::kuhn_munkres::{kuhn_munkres, Weights};

use crate::models::matching::{MatchCandidate, MatchStrategy};

// Text similarities are scaled to integers for the assignment solver
const ASSIGNMENT_SCALE: f64 = 1_000_000.0;

pub fn candidate_limit(max_candidates: usize, base_rows: usize, incoming_rows: usize) -> usize {
    max_candidates.min(base_rows).min(incoming_rows)
}

pub fn hybrid_score(text_similarity: f64, reconstruction_score: f64, tfidf_weight: f64, mse_weight: f64) -> f64 {
    tfidf_weight * text_similarity + mse_weight * reconstruction_score
}

/// Index of the first maximum in `row`.
fn first_argmax(row: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (j, &s) in row.iter().enumerate() {
        match best {
            Some((_, b)) if s <= b => {}
            _ => best = Some((j, s)),
        }
    }
    best.map(|(j, _)| j)
}

/// One-sided best match: each base row takes its most similar incoming row.
/// An incoming row may be chosen by several base rows.
pub fn select_greedy(text_sim: &[Vec<f64>], limit: usize) -> Vec<(usize, usize)> {
    text_sim
        .iter()
        .take(limit)
        .enumerate()
        .filter_map(|(i, row)| first_argmax(row).map(|j| (i, j)))
        .collect()
}

struct SimilarityWeights<'a> {
    rows: &'a [Vec<f64>],
    columns: usize,
    negated: bool,
}

impl Weights<i64> for SimilarityWeights<'_> {
    fn rows(&self) -> usize {
        self.rows.len()
    }

    fn columns(&self) -> usize {
        self.columns
    }

    fn at(&self, row: usize, col: usize) -> i64 {
        let s = self.rows.get(row).and_then(|r| r.get(col)).copied().unwrap_or(0.0);
        let w = (s * ASSIGNMENT_SCALE).round() as i64;
        if self.negated {
            -w
        } else {
            w
        }
    }

    fn neg(&self) -> Self {
        Self {
            rows: self.rows,
            columns: self.columns,
            negated: !self.negated,
        }
    }
}

/// One-to-one assignment of the candidate base rows to distinct incoming rows,
/// maximising the summed text similarity.
pub fn select_optimal(text_sim: &[Vec<f64>], limit: usize) -> Vec<(usize, usize)> {
    let columns = text_sim.first().map_or(0, Vec::len);
    let limit = limit.min(text_sim.len()).min(columns);
    if limit == 0 {
        return Vec::new();
    }

    let weights = SimilarityWeights {
        rows: &text_sim[..limit],
        columns,
        negated: false,
    };
    let (total, assignments) = kuhn_munkres(&weights);
    debug!(
        "Optimal assignment over {}x{} similarities, total weight {}",
        limit, columns, total
    );
    assignments.into_iter().enumerate().collect()
}

/// Runs the configured selection and attaches scores to every chosen pair.
/// `reconstruction_scores` is indexed by base row; rows beyond it score 1.0.
pub fn select_matches(
    text_sim: &[Vec<f64>],
    reconstruction_scores: &[f64],
    strategy: MatchStrategy,
    limit: usize,
    tfidf_weight: f64,
    mse_weight: f64,
) -> Vec<MatchCandidate> {
    let pairs = match strategy {
        MatchStrategy::Greedy => select_greedy(text_sim, limit),
        MatchStrategy::Optimal => select_optimal(text_sim, limit),
    };

    pairs
        .into_iter()
        .map(|(i, j)| {
            let text_similarity = text_sim[i][j];
            let reconstruction_score = reconstruction_scores.get(i).copied().unwrap_or(1.0);
            MatchCandidate {
                base_row: i,
                incoming_row: j,
                text_similarity,
                reconstruction_score,
                final_similarity: hybrid_score(text_similarity, reconstruction_score, tfidf_weight, mse_weight),
            }
        })
        .collect()
}
