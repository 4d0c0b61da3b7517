// src/error.rs
//! Precondition and configuration failures the caller may want to branch on.
//! They travel inside `anyhow::Error` and can be recovered with `downcast_ref`.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    NoCommonColumns { left: String, right: String },
    NotEnoughDatasets(usize),
    DuplicateDatasetName { name: String },
    UnknownDataset { name: String, stage: &'static str },
    MissingColumnSource { column: String },
    InvalidConfig(String),
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionError::NoCommonColumns { left, right } => write!(
                f,
                "Datasets '{}' and '{}' share no common columns; resolution cannot proceed",
                left, right
            ),
            ResolutionError::NotEnoughDatasets(n) => write!(
                f,
                "At least two datasets are required for resolution, got {}",
                n
            ),
            ResolutionError::DuplicateDatasetName { name } => write!(
                f,
                "Dataset name '{}' is used more than once; provenance columns would collide",
                name
            ),
            ResolutionError::UnknownDataset { name, stage } => {
                write!(f, "Unknown dataset '{}' referenced during {}", name, stage)
            }
            ResolutionError::MissingColumnSource { column } => write!(
                f,
                "No reference dataset selected for column '{}' in per-column source mode",
                column
            ),
            ResolutionError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ResolutionError {}
