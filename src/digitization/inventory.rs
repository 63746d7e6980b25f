use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim};
use std::fs;
use std::path::{Path, PathBuf};

/// One spreadsheet row: column 0 is the record id, column 1 the record name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryRow {
    pub record_id: String,
    pub record_name: String,
}

#[derive(Debug, Clone)]
pub struct BoxInventory {
    /// Box name exactly as the source file name gives it.
    pub box_name: String,
    pub rows: Vec<InventoryRow>,
}

const INVENTORY_EXTENSIONS: &[&str] = &["csv", "tsv", "txt"];

/// Parses a sheet exported as delimited text. The first line is the header
/// row and is skipped; rows without a record name are ignored. Quoted fields
/// may hold the delimiter, doubled quotes and line breaks.
pub fn parse_rows(raw: &str, delimiter: u8) -> Result<Vec<InventoryRow>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(raw.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.context("malformed inventory row")?;
        let (Some(record_id), Some(record_name)) = (record.get(0), record.get(1)) else {
            continue;
        };
        if record_name.is_empty() {
            continue;
        }
        rows.push(InventoryRow {
            record_id: record_id.to_string(),
            record_name: record_name.to_string(),
        });
    }
    Ok(rows)
}

pub fn read_inventory(path: &Path) -> Result<BoxInventory> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let delimiter = match path.extension().and_then(|e| e.to_str()) {
        Some("tsv") => b'\t',
        _ => b',',
    };
    let box_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .with_context(|| format!("inventory path has no file name: {}", path.display()))?
        .to_string();

    Ok(BoxInventory {
        box_name,
        rows: parse_rows(&raw, delimiter)
            .with_context(|| format!("failed to parse {}", path.display()))?,
    })
}

/// Inventory files directly under `dir`, sorted by name.
pub fn list_inventory_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let known = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| INVENTORY_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if known {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}
