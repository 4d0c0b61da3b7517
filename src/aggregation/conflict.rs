// src/aggregation/conflict.rs
use std::collections::HashMap;

use crate::models::dataset::Value;
use crate::models::matching::ConflictStrategy;

/// Strategy configured for `col`, `prefer_dataset_1` when none is.
pub fn strategy_for(col: &str, strategies: &HashMap<String, ConflictStrategy>) -> ConflictStrategy {
    strategies.get(col).copied().unwrap_or_default()
}

/// Picks the surviving value of one shared column for a matched pair.
pub fn resolve_conflict(base: &Value, incoming: &Value, strategy: ConflictStrategy) -> Value {
    match strategy {
        ConflictStrategy::PreferDataset1 => base.clone(),
        ConflictStrategy::PreferDataset2 => incoming.clone(),
        ConflictStrategy::PreferNonNull => {
            if !base.is_blank() {
                base.clone()
            } else if !incoming.is_blank() {
                incoming.clone()
            } else {
                base.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefer_dataset_2() {
        let resolved = resolve_conflict(
            &Value::text("NYC"),
            &Value::text("New York"),
            ConflictStrategy::PreferDataset2,
        );
        assert_eq!(resolved, Value::text("New York"));
    }

    #[test]
    fn test_prefer_non_null_fallbacks() {
        let s = ConflictStrategy::PreferNonNull;
        assert_eq!(resolve_conflict(&Value::text(""), &Value::text("Boston"), s), Value::text("Boston"));
        assert_eq!(resolve_conflict(&Value::Null, &Value::Number(3.0), s), Value::Number(3.0));
        assert_eq!(resolve_conflict(&Value::text("NYC"), &Value::text("Boston"), s), Value::text("NYC"));
        // Both blank: base wins
        assert_eq!(resolve_conflict(&Value::text(""), &Value::Null, s), Value::text(""));
    }

    #[test]
    fn test_unspecified_column_prefers_base() {
        let mut strategies = HashMap::new();
        strategies.insert("city".to_string(), ConflictStrategy::PreferDataset2);
        assert_eq!(strategy_for("city", &strategies), ConflictStrategy::PreferDataset2);
        assert_eq!(strategy_for("name", &strategies), ConflictStrategy::PreferDataset1);
        assert_eq!(
            resolve_conflict(&Value::text("a"), &Value::text("b"), strategy_for("name", &strategies)),
            Value::text("a")
        );
    }
}
