// src/io/csv_loader.rs
use anyhow::{Context, Result};
use encoding_rs::{UTF_8, WINDOWS_1252};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::models::dataset::{Dataset, Row, Value};

/// Decodes file bytes as UTF-8 (BOM stripped), falling back to Windows-1252.
pub fn decode_bytes(bytes: &[u8], source: &str) -> String {
    if let Some(text) = UTF_8.decode_without_bom_handling_and_without_replacement(strip_utf8_bom(bytes)) {
        return text.into_owned();
    }
    warn!("⚠️ '{}' is not valid UTF-8; decoding as Windows-1252", source);
    let (text, _, had_errors) = WINDOWS_1252.decode(bytes);
    if had_errors {
        warn!("   Some bytes in '{}' could not be decoded and were replaced", source);
    }
    text.into_owned()
}

fn strip_utf8_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes)
}

/// Header names are trimmed and lowercased. A repeated name keeps its first column.
fn normalize_headers(raw: &csv::StringRecord, source: &str) -> Vec<Option<String>> {
    let mut seen = HashSet::new();
    raw.iter()
        .map(|h| {
            let name = h.trim().to_lowercase();
            if seen.insert(name.clone()) {
                Some(name)
            } else {
                warn!("Duplicate column '{}' in '{}'; keeping the first occurrence", name, source);
                None
            }
        })
        .collect()
}

/// Parses delimited text with a header row into a dataset named `name`.
pub fn parse_csv(text: &str, name: &str) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = normalize_headers(
        reader
            .headers()
            .with_context(|| format!("Failed to read header row of '{}'", name))?,
        name,
    );
    let columns: Vec<String> = headers.iter().flatten().cloned().collect();

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Malformed record {} in '{}'", line + 1, name))?;
        let mut row = Row::new();
        for (header, cell) in headers.iter().zip(record.iter()) {
            if let Some(col) = header {
                let value = if cell.is_empty() { Value::Null } else { Value::text(cell) };
                row.insert(col.clone(), value);
            }
        }
        rows.push(row);
    }

    let dataset = Dataset::from_rows(name, columns, rows);
    debug!(
        "Column roles for '{}': {:?}",
        name,
        dataset
            .columns()
            .iter()
            .map(|c| (c.as_str(), dataset.role(c)))
            .collect::<Vec<_>>()
    );
    Ok(dataset)
}

/// Loads a CSV file; the dataset is named after the file.
pub fn load_csv(path: &Path) -> Result<Dataset> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let text = decode_bytes(&bytes, &name);
    let dataset = parse_csv(&text, &name).with_context(|| format!("Failed to parse {}", path.display()))?;
    info!(
        "📥 Loaded '{}': {} rows, {} columns",
        dataset.name(),
        dataset.len(),
        dataset.columns().len()
    );
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::dataset::ColumnRole;
    use std::io::Write;

    #[test]
    fn test_parse_normalizes_headers_and_roles() {
        let ds = parse_csv(" Name ,AMOUNT,Notes\nAcme Corp,100,\nGlobex,,hi\n", "a.csv").unwrap();
        assert_eq!(ds.columns(), &["name".to_string(), "amount".to_string(), "notes".to_string()]);
        assert_eq!(ds.role("name"), Some(ColumnRole::Text));
        assert_eq!(ds.role("amount"), Some(ColumnRole::Numeric));
        assert_eq!(ds.value(0, "amount"), &Value::Number(100.0));
        assert!(ds.value(1, "amount").is_null());
        assert!(ds.value(0, "notes").is_null());
    }

    #[test]
    fn test_windows_1252_fallback() {
        let bytes = b"name\nCaf\xe9\n";
        let text = decode_bytes(bytes, "latin.csv");
        assert_eq!(text, "name\nCafé\n");
    }

    #[test]
    fn test_load_csv_names_dataset_after_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vendors.csv");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all("\u{feff}name,city\nacme,boston\n".as_bytes()).unwrap();

        let ds = load_csv(&path).unwrap();
        assert_eq!(ds.name(), "vendors.csv");
        assert_eq!(ds.columns()[0], "name");
        assert_eq!(ds.value(0, "city"), &Value::text("boston"));
    }
}
