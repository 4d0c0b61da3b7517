pub mod dataset;
pub mod matching;
pub mod stats_models;
