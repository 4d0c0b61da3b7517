pub mod engine;
pub mod reconstruction;
pub mod tfidf;
