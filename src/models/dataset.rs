// src/models/dataset.rs
//! Tabular data model shared by every stage of the resolution pipeline.
//!
//! A `Dataset` is an ordered list of rows keyed by column name. Each column has a
//! fixed `ColumnRole` decided at load time, so text normalisation and numeric
//! scaling never have to guess what a cell is supposed to be.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::models::matching::FINAL_SIMILARITY;

static NULL_VALUE: Value = Value::Null;

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Number(f64),
    Null,
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null or an empty string.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            Value::Number(n) => n.is_nan(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric view of the cell. Text is parsed leniently; anything that does not
    /// parse is treated as missing.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) if n.is_finite() => Some(*n),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{}", s),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Null => Ok(()),
        }
    }
}

/// Integral values are printed without a trailing `.0`.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Role of a column, fixed per dataset when it is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Text,
    Numeric,
}

pub type Row = HashMap<String, Value>;

#[derive(Debug, Clone)]
pub struct Dataset {
    name: String,
    columns: Vec<String>,
    roles: HashMap<String, ColumnRole>,
    rows: Vec<Row>,
}

impl Dataset {
    /// Empty dataset with a declared schema.
    pub fn new(name: impl Into<String>, schema: Vec<(String, ColumnRole)>) -> Self {
        let columns = schema.iter().map(|(c, _)| c.clone()).collect();
        let roles = schema.into_iter().collect();
        Self {
            name: name.into(),
            columns,
            roles,
            rows: Vec::new(),
        }
    }

    /// Builds a dataset and infers each column's role from its values.
    ///
    /// Columns whose non-null cells all parse as numbers become `Numeric` and
    /// their text cells are converted to `Value::Number`; everything else is
    /// `Text`, with numbers rendered back to strings.
    pub fn from_rows(name: impl Into<String>, columns: Vec<String>, rows: Vec<Row>) -> Self {
        let mut roles = HashMap::new();
        for col in &columns {
            let role = infer_role(rows.iter().map(|r| r.get(col).unwrap_or(&NULL_VALUE)));
            roles.insert(col.clone(), role);
        }

        let mut dataset = Self {
            name: name.into(),
            columns,
            roles,
            rows,
        };
        dataset.coerce_to_roles();
        dataset
    }

    fn coerce_to_roles(&mut self) {
        for row in &mut self.rows {
            for (col, value) in row.iter_mut() {
                let replacement = match (self.roles.get(col), &*value) {
                    (Some(ColumnRole::Numeric), Value::Text(_)) => value.as_number().map(Value::Number),
                    (Some(ColumnRole::Text), Value::Number(n)) => Some(Value::Text(format_number(*n))),
                    _ => None,
                };
                if let Some(v) = replacement {
                    *value = v;
                }
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, col: &str) -> bool {
        self.roles.contains_key(col)
    }

    pub fn role(&self, col: &str) -> Option<ColumnRole> {
        self.roles.get(col).copied()
    }

    /// Adds a column to the schema if it is not there yet. Existing rows read it as null.
    pub fn add_column(&mut self, col: &str, role: ColumnRole) {
        if !self.roles.contains_key(col) {
            self.columns.push(col.to_string());
            self.roles.insert(col.to_string(), role);
        }
    }

    pub fn push_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Cell lookup; out-of-range rows and absent columns read as null.
    pub fn value(&self, row: usize, col: &str) -> &Value {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&NULL_VALUE)
    }

    pub fn set_value(&mut self, row: usize, col: &str, value: Value) {
        if let Some(r) = self.rows.get_mut(row) {
            r.insert(col.to_string(), value);
        }
    }

    pub fn column_values<'a>(&'a self, col: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.rows
            .iter()
            .map(move |r| r.get(col).unwrap_or(&NULL_VALUE))
    }

    /// Keeps rows whose `Final_Similarity` is at least `threshold`. Rows without a
    /// similarity (unmatched rows) are dropped.
    pub fn filter_by_min_similarity(&self, threshold: f64) -> Dataset {
        let rows = self
            .rows
            .iter()
            .filter(|r| {
                r.get(FINAL_SIMILARITY)
                    .and_then(Value::as_number)
                    .map_or(false, |s| s >= threshold)
            })
            .cloned()
            .collect();

        Dataset {
            name: self.name.clone(),
            columns: self.columns.clone(),
            roles: self.roles.clone(),
            rows,
        }
    }
}

/// Numeric iff every non-null value parses as a number and at least one exists.
pub fn infer_role<'a>(values: impl Iterator<Item = &'a Value>) -> ColumnRole {
    let mut saw_number = false;
    for value in values {
        match value {
            Value::Null => continue,
            Value::Text(s) if s.trim().is_empty() => continue,
            v => {
                if v.as_number().is_none() {
                    return ColumnRole::Text;
                }
                saw_number = true;
            }
        }
    }
    if saw_number {
        ColumnRole::Numeric
    } else {
        ColumnRole::Text
    }
}

/// Column names present in every dataset, sorted.
pub fn common_columns(datasets: &[Dataset]) -> Vec<String> {
    let mut iter = datasets.iter();
    let Some(first) = iter.next() else {
        return Vec::new();
    };

    let mut common: HashSet<&str> = first.columns().iter().map(String::as_str).collect();
    for dataset in iter {
        let cols: HashSet<&str> = dataset.columns().iter().map(String::as_str).collect();
        common.retain(|c| cols.contains(c));
    }

    let mut result: Vec<String> = common.into_iter().map(str::to_string).collect();
    result.sort();
    result
}
