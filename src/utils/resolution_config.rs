// src/utils/resolution_config.rs
use log::{info, warn};
use std::env;
use std::str::FromStr;

use crate::matching::reconstruction::AutoencoderConfig;
use crate::models::matching::MatchStrategy;

pub const DEFAULT_TFIDF_WEIGHT: f64 = 0.5;
pub const DEFAULT_MSE_WEIGHT: f64 = 0.5;
pub const DEFAULT_MAX_CANDIDATES: usize = 10;

/// Similarity weights, candidate cap and reconstruction-model training settings
/// for one resolution run.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionConfig {
    pub tfidf_weight: f64,
    pub mse_weight: f64,
    pub max_candidates: usize,
    pub match_strategy: MatchStrategy,
    pub autoencoder: AutoencoderConfig,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            tfidf_weight: DEFAULT_TFIDF_WEIGHT,
            mse_weight: DEFAULT_MSE_WEIGHT,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            match_strategy: MatchStrategy::default(),
            autoencoder: AutoencoderConfig::default(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring unparseable value '{}' for {}", raw, key);
            default
        }),
        Err(_) => default,
    }
}

impl ResolutionConfig {
    pub fn from_env() -> Self {
        let defaults = AutoencoderConfig::default();
        Self {
            tfidf_weight: env_or("TFIDF_WEIGHT", DEFAULT_TFIDF_WEIGHT),
            mse_weight: env_or("MSE_WEIGHT", DEFAULT_MSE_WEIGHT),
            max_candidates: env_or("MAX_CANDIDATES", DEFAULT_MAX_CANDIDATES),
            match_strategy: env_or("MATCH_STRATEGY", MatchStrategy::default()),
            autoencoder: AutoencoderConfig {
                epochs: env_or("AUTOENCODER_EPOCHS", defaults.epochs),
                batch_size: env_or("AUTOENCODER_BATCH_SIZE", defaults.batch_size),
                learning_rate: env_or("AUTOENCODER_LEARNING_RATE", defaults.learning_rate),
                shuffle_seed: env_or("AUTOENCODER_SHUFFLE_SEED", defaults.shuffle_seed),
            },
        }
    }

    pub fn log_config(&self) {
        info!("⚖️ Similarity weights: tfidf={}, mse={}", self.tfidf_weight, self.mse_weight);
        if (self.tfidf_weight + self.mse_weight - 1.0).abs() > 1e-9 {
            warn!(
                "   Weights sum to {}; Final_Similarity is not bounded to [0, 1]",
                self.tfidf_weight + self.mse_weight
            );
        }
        info!(
            "   Candidate cap: {} base rows per fold, {} selection",
            self.max_candidates, self.match_strategy
        );
        info!(
            "🧠 Reconstruction model: {} epochs, batch size {}, learning rate {}, shuffle seed {}",
            self.autoencoder.epochs,
            self.autoencoder.batch_size,
            self.autoencoder.learning_rate,
            self.autoencoder.shuffle_seed
        );
    }
}
