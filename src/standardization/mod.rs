pub mod rules;
pub mod standardizer;
pub mod text;
