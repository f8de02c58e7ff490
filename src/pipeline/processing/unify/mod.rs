//! Maps each flattened source table onto one shared column layout so both
//! sources can be consumed together downstream.

pub mod registry;
pub mod sources;

use serde_json::Value;
use tracing::warn;

use crate::error::Result;
use crate::table::RecordTable;

pub use registry::MappingRegistry;
pub use sources::{BeschaMapping, TedMapping};

/// Column layout shared by every unified table
pub const UNIFIED_COLUMNS: [&str; 18] = [
    "tender_title",
    "tender_description",
    "tender_cpv_number",
    "tender_cpv_category",
    "tender_numberOfTenderers",
    "buyer_name",
    "buyer_locality",
    "buyer_nut",
    "contracts_value_amount",
    "lot_description",
    "publication_number",
    "BT-05(a)-notice",
    "company_size",
    "BT-262-Lot",
    "BT-27-Procedure",
    "winner_name",
    "winner_post_code",
    "winner_size",
];

/// Source-specific copy of named columns into the unified layout
pub trait SourceMapping {
    /// Name of the table this mapping reads
    fn source_id(&self) -> &str;

    /// Name of the unified table it produces
    fn target_name(&self) -> &str;

    fn map(&self, table: &RecordTable) -> Result<RecordTable>;
}

/// Copy one source column, or a null column when the source has none.
///
/// Absent source columns are tolerated: a pass that saw no elements for a
/// nested field never generates its occurrence columns.
pub fn copy_column(table: &RecordTable, source: Option<&str>, source_id: &str) -> Vec<Value> {
    let Some(name) = source else {
        return vec![Value::Null; table.len()];
    };
    match table.column(name) {
        Some(values) => values.into_iter().cloned().collect(),
        None => {
            warn!("Column '{}' missing from {}, filling nulls", name, source_id);
            vec![Value::Null; table.len()]
        }
    }
}

/// Pull a single text value out of a multilingual cell.
///
/// `{"deu": ["Text"]}` yields `"Text"` for `lang = "deu"`, arrays yield their
/// first element, anything else is returned unchanged.
pub fn extract_text(value: &Value, lang: &str) -> Value {
    match value {
        Value::Object(map) => match map.get(lang) {
            Some(Value::Array(items)) if !items.is_empty() => items[0].clone(),
            Some(other) => other.clone(),
            None => value.clone(),
        },
        Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
        other => other.clone(),
    }
}
