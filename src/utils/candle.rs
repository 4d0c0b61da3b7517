// src/utils/candle.rs
use anyhow::{anyhow, Context, Result as AnyhowResult};
use candle_core::{Device, Tensor};
use once_cell::sync::Lazy;

static CANDLE_DEVICE: Lazy<Device> = Lazy::new(|| {
    // Device::new_metal(0) only succeeds when candle-core is built with Metal support.
    match Device::new_metal(0) {
        Ok(metal_device) if metal_device.is_metal() => {
            log::info!("Successfully initialized Candle Metal device (GPU).");
            metal_device
        }
        Ok(_) => {
            log::warn!("Device::new_metal(0) succeeded but device.is_metal() is false. Using CPU.");
            Device::Cpu
        }
        Err(err) => {
            log::debug!(
                "Candle Metal device unavailable: {:?}. Using Candle CPU device.",
                err
            );
            Device::Cpu
        }
    }
});

pub fn device() -> &'static Device {
    &CANDLE_DEVICE
}

/// Packs equally sized rows into a `(rows, cols)` f32 tensor on the shared device.
pub fn tensor_from_rows(rows: &[Vec<f32>]) -> AnyhowResult<Tensor> {
    let n_rows = rows.len();
    let n_cols = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|r| r.len() != n_cols) {
        return Err(anyhow!("Rows must all have {} columns", n_cols));
    }
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    Tensor::from_vec(flat, (n_rows, n_cols), device())
        .with_context(|| format!("Failed to create tensor of shape ({}, {})", n_rows, n_cols))
}
