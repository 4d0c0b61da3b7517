// src/utils/abbreviations.rs
//! Ordered short-form → long-form mapping used by the standardizer.
//!
//! Substitutions run sequentially in file order, so the mapping keeps the
//! order of the YAML document rather than a hash order.

use anyhow::{anyhow, Context, Result};
use log::info;
use regex::{NoExpand, Regex};
use serde_yaml::Value as YamlValue;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone)]
struct Abbreviation {
    short: String,
    full: String,
    pattern: Regex,
}

#[derive(Debug, Clone, Default)]
pub struct AbbreviationMap {
    entries: Vec<Abbreviation>,
}

impl AbbreviationMap {
    /// Compiles a whole-word, case-insensitive pattern for every short form.
    pub fn new<I, S, F>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, F)>,
        S: Into<String>,
        F: Into<String>,
    {
        let mut entries = Vec::new();
        for (short, full) in pairs {
            let short = short.into();
            let full = full.into();
            if short.trim().is_empty() {
                continue;
            }
            let pattern = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&short)))
                .with_context(|| format!("Failed to compile abbreviation pattern for '{}'", short))?;
            entries.push(Abbreviation {
                short,
                full,
                pattern,
            });
        }
        Ok(Self { entries })
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let doc: YamlValue = serde_yaml::from_str(yaml).context("Failed to parse abbreviation YAML")?;
        let mapping = match doc {
            YamlValue::Null => return Ok(Self::default()),
            YamlValue::Mapping(m) => m,
            _ => return Err(anyhow!("Abbreviation YAML must be a mapping of short form to expansion")),
        };

        let mut pairs = Vec::with_capacity(mapping.len());
        for (key, value) in mapping {
            let short = yaml_scalar_to_string(&key)
                .ok_or_else(|| anyhow!("Abbreviation keys must be scalars, got {:?}", key))?;
            let full = yaml_scalar_to_string(&value).ok_or_else(|| {
                anyhow!("Expansion for abbreviation '{}' must be a scalar, got {:?}", short, value)
            })?;
            pairs.push((short, full));
        }
        Self::new(pairs)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read abbreviation file {}", path.display()))?;
        let map = Self::from_yaml_str(&text)
            .with_context(|| format!("Invalid abbreviation file {}", path.display()))?;
        info!("📖 Loaded {} abbreviations from {}", map.len(), path.display());
        Ok(map)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|e| (e.short.as_str(), e.full.as_str()))
    }

    /// Applies every substitution in order. Expansions are inserted literally.
    pub fn expand(&self, text: &str) -> String {
        let mut result = text.to_string();
        for entry in &self.entries {
            if entry.pattern.is_match(&result) {
                result = entry
                    .pattern
                    .replace_all(&result, NoExpand(&entry.full))
                    .into_owned();
            }
        }
        result
    }
}

fn yaml_scalar_to_string(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
