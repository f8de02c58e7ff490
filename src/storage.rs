use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, info};

use crate::constants::OUTPUT_DATE_FORMAT;
use crate::error::Result;
use crate::table::RecordTable;

/// Load every `*.json` file of `dir` as a table keyed by its file stem.
/// Files are read in name order.
pub fn load_tables(dir: &Path) -> Result<BTreeMap<String, RecordTable>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    paths.sort();

    let mut tables = BTreeMap::new();
    for path in paths {
        if path.extension().and_then(|e| e.to_str()) != Some("json") || !path.is_file() {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let reader = BufReader::new(File::open(&path)?);
        let document: Value = serde_json::from_reader(reader)?;
        let table = RecordTable::from_json(document);
        debug!(
            "Loaded {} ({} rows, {} columns)",
            path.display(),
            table.len(),
            table.width()
        );
        tables.insert(name.to_string(), table);
    }

    info!("Loaded {} tables from {}", tables.len(), dir.display());
    Ok(tables)
}

/// Write each table as `<date>_<name>.csv` and `<date>_<name>.json` in `dir`.
/// Returns the written paths; the first failure aborts.
pub fn persist_tables(
    tables: &BTreeMap<String, RecordTable>,
    dir: &Path,
    date: NaiveDate,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let prefix = date.format(OUTPUT_DATE_FORMAT).to_string();

    let mut written = Vec::with_capacity(tables.len() * 2);
    for (name, table) in tables {
        let csv_path = dir.join(format!("{prefix}_{name}.csv"));
        write_csv(table, &csv_path)?;
        info!("Saved table to {}", csv_path.display());
        written.push(csv_path);

        let json_path = dir.join(format!("{prefix}_{name}.json"));
        write_json(table, &json_path)?;
        info!("Saved table to {}", json_path.display());
        written.push(json_path);
    }
    Ok(written)
}

/// Header row of column names, then one line per row
pub fn write_csv(table: &RecordTable, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(table.column_names())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(csv_field))?;
    }
    writer.flush()?;
    Ok(())
}

/// An array of row objects, keys in column order
pub fn write_json(table: &RecordTable, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, &table.to_records())?;
    writer.flush()?;
    Ok(())
}

fn csv_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
