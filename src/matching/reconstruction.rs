// src/matching/reconstruction.rs
//! Numeric anomaly signal for a pair of datasets.
//!
//! Each side's shared numeric columns are min-max scaled on their own range and
//! fed through a small autoencoder trained on that side only. The per-row
//! reconstruction errors of the two sides are compared position by position and
//! turned into a score in [0, 1], where 1 means the two rows sit at the same
//! place in their side's error profile.
//!
//! Both models are fresh per call and dropped afterwards. The sides have no data
//! dependency, so they are trained concurrently on the blocking pool.

use anyhow::{Context, Result};
use candle_core::{DType, Tensor};
use candle_nn::{linear, AdamW, Linear, Module, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use log::{debug, warn};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::models::dataset::Dataset;
use crate::utils::candle::{device, tensor_from_rows};

// Hidden layer widths: d -> 64 -> 32 -> 16 -> 32 -> 64 -> d
const HIDDEN_LAYERS: [usize; 5] = [64, 32, 16, 32, 64];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoencoderConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub shuffle_seed: u64,
}

impl Default for AutoencoderConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 16,
            learning_rate: 0.001,
            shuffle_seed: 42,
        }
    }
}

struct Autoencoder {
    layers: Vec<Linear>,
}

impl Autoencoder {
    fn new(input_dim: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        let mut dims = vec![input_dim];
        dims.extend_from_slice(&HIDDEN_LAYERS);
        dims.push(input_dim);

        let layers = dims
            .windows(2)
            .enumerate()
            .map(|(i, w)| linear(w[0], w[1], vb.pp(format!("dense{}", i))))
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(Self { layers })
    }
}

impl Module for Autoencoder {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let last = self.layers.len() - 1;
        let mut x = xs.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(&x)?;
            x = if i == last {
                candle_nn::ops::sigmoid(&x)?
            } else {
                x.relu()?
            };
        }
        Ok(x)
    }
}

/// Row-major numeric sub-table. Missing or unparseable cells are imputed with the
/// column mean over the parsed values (0.0 when a column has none).
pub fn numeric_matrix(dataset: &Dataset, columns: &[String]) -> Vec<Vec<f64>> {
    let mut matrix = vec![Vec::with_capacity(columns.len()); dataset.len()];

    for col in columns {
        let parsed: Vec<Option<f64>> = dataset.column_values(col).map(|v| v.as_number()).collect();
        let present: Vec<f64> = parsed.iter().flatten().copied().collect();
        let mean = if present.is_empty() {
            0.0
        } else {
            present.iter().sum::<f64>() / present.len() as f64
        };

        let missing = parsed.len() - present.len();
        if missing > 0 {
            debug!(
                "Imputing {} missing values in numeric column '{}' of '{}' with {:.4}",
                missing,
                col,
                dataset.name(),
                mean
            );
        }

        for (row, value) in matrix.iter_mut().zip(parsed) {
            row.push(value.unwrap_or(mean));
        }
    }
    matrix
}

/// Min-max scales each column into [0, 1] using this table's own range.
/// Constant columns scale to 0.
pub fn min_max_scale(matrix: &[Vec<f64>]) -> Vec<Vec<f32>> {
    let n_cols = matrix.first().map_or(0, Vec::len);
    let mut mins = vec![f64::INFINITY; n_cols];
    let mut maxs = vec![f64::NEG_INFINITY; n_cols];
    for row in matrix {
        for (j, &v) in row.iter().enumerate() {
            mins[j] = mins[j].min(v);
            maxs[j] = maxs[j].max(v);
        }
    }

    matrix
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(j, &v)| {
                    let range = maxs[j] - mins[j];
                    if range > 0.0 {
                        ((v - mins[j]) / range) as f32
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect()
}

/// Trains an autoencoder on `scaled` and returns the per-row mean squared
/// reconstruction error.
pub fn reconstruction_errors(scaled: &[Vec<f32>], config: &AutoencoderConfig) -> Result<Vec<f64>> {
    let n_rows = scaled.len();
    let n_cols = scaled.first().map_or(0, Vec::len);
    if n_rows == 0 || n_cols == 0 {
        return Ok(Vec::new());
    }

    let data = tensor_from_rows(scaled)?;
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, device());
    let model = Autoencoder::new(n_cols, vb).context("Failed to build autoencoder")?;

    let params = ParamsAdamW {
        lr: config.learning_rate,
        weight_decay: 0.0,
        ..Default::default()
    };
    let mut optimizer =
        AdamW::new(varmap.all_vars(), params).context("Failed to create autoencoder optimizer")?;

    let batch_size = config.batch_size.max(1);
    let mut rng = StdRng::seed_from_u64(config.shuffle_seed);
    let mut order: Vec<u32> = (0..n_rows as u32).collect();

    for epoch in 0..config.epochs {
        order.shuffle(&mut rng);
        let mut epoch_loss = 0.0f32;
        for chunk in order.chunks(batch_size) {
            let idx = Tensor::from_slice(chunk, (chunk.len(),), device())?;
            let batch = data.index_select(&idx, 0)?;
            let reconstructed = model.forward(&batch)?;
            let loss = candle_nn::loss::mse(&reconstructed, &batch)?;
            optimizer
                .backward_step(&loss)
                .with_context(|| format!("Autoencoder optimisation step failed in epoch {}", epoch))?;
            epoch_loss += loss.to_scalar::<f32>()? * chunk.len() as f32;
        }
        debug!("Autoencoder epoch {}: loss {:.6}", epoch + 1, epoch_loss / n_rows as f32);
    }

    let reconstructed = model.forward(&data)?;
    let errors = reconstructed.sub(&data)?.sqr()?.mean(1)?.to_vec1::<f32>()?;
    Ok(errors.into_iter().map(f64::from).collect())
}

/// Compares the two error sequences over their common length:
/// `1 - minmax(|e_base - e_incoming|)`. Identical differences everywhere score 1.
pub fn reconstruction_scores(base_errors: &[f64], incoming_errors: &[f64]) -> Vec<f64> {
    let len = base_errors.len().min(incoming_errors.len());
    let diffs: Vec<f64> = base_errors[..len]
        .iter()
        .zip(&incoming_errors[..len])
        .map(|(a, b)| (a - b).abs())
        .collect();

    let min = diffs.iter().copied().fold(f64::INFINITY, f64::min);
    let max = diffs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    diffs
        .iter()
        .map(|d| {
            if range > 0.0 && range.is_finite() {
                1.0 - (d - min) / range
            } else {
                1.0
            }
        })
        .collect()
}

/// Neutral score sequence used when the datasets share no numeric columns.
pub fn neutral_scores(len: usize) -> Vec<f64> {
    vec![1.0; len]
}

/// Full numeric signal for a pair of datasets over `numeric_columns`.
pub async fn reconstruction_signal(
    base: &Dataset,
    incoming: &Dataset,
    numeric_columns: &[String],
    config: AutoencoderConfig,
) -> Result<Vec<f64>> {
    let min_len = base.len().min(incoming.len());
    if numeric_columns.is_empty() {
        return Ok(neutral_scores(min_len));
    }

    let base_scaled = min_max_scale(&numeric_matrix(base, numeric_columns));
    let incoming_scaled = min_max_scale(&numeric_matrix(incoming, numeric_columns));

    let base_name = base.name().to_string();
    let incoming_name = incoming.name().to_string();

    let base_task = tokio::task::spawn_blocking(move || {
        reconstruction_errors(&base_scaled, &config)
            .with_context(|| format!("Reconstruction model failed for '{}'", base_name))
    });
    let incoming_task = tokio::task::spawn_blocking(move || {
        reconstruction_errors(&incoming_scaled, &config)
            .with_context(|| format!("Reconstruction model failed for '{}'", incoming_name))
    });

    let (base_errors, incoming_errors) = tokio::try_join!(base_task, incoming_task)
        .context("Reconstruction training task panicked")?;
    let (base_errors, incoming_errors) = (base_errors?, incoming_errors?);

    if base_errors.len() != incoming_errors.len() {
        warn!(
            "Reconstruction error sequences differ in length ({} vs {}); comparing the first {}",
            base_errors.len(),
            incoming_errors.len(),
            min_len
        );
    }

    Ok(reconstruction_scores(&base_errors, &incoming_errors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::dataset::{Row, Value};

    #[test]
    fn test_min_max_scale_per_column() {
        let scaled = min_max_scale(&[vec![10.0, 5.0], vec![20.0, 5.0], vec![15.0, 5.0]]);
        assert_eq!(scaled, vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.5, 0.0]]);
    }

    #[test]
    fn test_numeric_matrix_imputes_unparseable_values() {
        let mut ds = Dataset::new("a", vec![("amount".into(), crate::models::dataset::ColumnRole::Numeric)]);
        for v in [Value::Number(10.0), Value::text("n/a"), Value::Number(20.0), Value::Null] {
            let mut r = Row::new();
            r.insert("amount".into(), v);
            ds.push_row(r);
        }
        let matrix = numeric_matrix(&ds, &["amount".to_string()]);
        assert_eq!(matrix, vec![vec![10.0], vec![15.0], vec![20.0], vec![15.0]]);
    }

    #[test]
    fn test_reconstruction_scores_truncate_and_invert() {
        let scores = reconstruction_scores(&[0.1, 0.2, 0.5], &[0.1, 0.4]);
        assert_eq!(scores.len(), 2);
        assert!((scores[0] - 1.0).abs() < 1e-12);
        assert!(scores[1].abs() < 1e-12);

        assert_eq!(reconstruction_scores(&[0.3], &[0.1]), vec![1.0]);
        assert!(reconstruction_scores(&[], &[0.1]).is_empty());
    }

    #[test]
    fn test_reconstruction_errors_shape_and_bounds() {
        let scaled: Vec<Vec<f32>> = (0..20)
            .map(|i| vec![i as f32 / 19.0, 1.0 - i as f32 / 19.0])
            .collect();
        let errors = reconstruction_errors(&scaled, &AutoencoderConfig::default()).unwrap();
        assert_eq!(errors.len(), 20);
        assert!(errors.iter().all(|e| e.is_finite() && *e >= 0.0 && *e <= 1.0));
    }

    #[tokio::test]
    async fn test_signal_is_neutral_without_numeric_columns() {
        let a = Dataset::new("a", vec![]);
        let scores = reconstruction_signal(&a, &a, &[], AutoencoderConfig::default())
            .await
            .unwrap();
        assert!(scores.is_empty());
    }

    #[tokio::test]
    async fn test_signal_scores_within_unit_interval() {
        let make = |name: &str, values: &[f64]| {
            let mut ds = Dataset::new(name, vec![("amount".into(), crate::models::dataset::ColumnRole::Numeric)]);
            for v in values {
                let mut r = Row::new();
                r.insert("amount".into(), Value::Number(*v));
                ds.push_row(r);
            }
            ds
        };
        let a = make("a", &[1.0, 5.0, 9.0, 3.0]);
        let b = make("b", &[2.0, 4.0, 8.0]);
        let scores = reconstruction_signal(&a, &b, &["amount".to_string()], AutoencoderConfig::default())
            .await
            .unwrap();
        assert_eq!(scores.len(), 3);
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    }
}
