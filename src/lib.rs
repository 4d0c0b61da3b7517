pub mod aggregation;
pub mod candidate_generation;
pub mod error;
pub mod io;
pub mod matching;
pub mod models;
pub mod pipeline;
pub mod standardization;
pub mod utils;
