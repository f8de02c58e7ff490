use indexmap::IndexSet;
use serde_json::{Map, Value};

use crate::constants::{field_marker, ANONYMOUS_LEAF};

/// A single JSON object, keys in column order
pub type Record = Map<String, Value>;

/// Typed description of one column.
///
/// Flatten passes decide what to keep from these tags instead of parsing the
/// rendered `name` back apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    /// Rendered column name as it appears in output files
    pub name: String,
    /// Nested field whose flatten pass generated this column
    pub source_field: Option<String>,
    /// Occurrence index within `source_field`, once widened
    pub occurrence: Option<usize>,
}

impl ColumnMeta {
    /// A column loaded from source data or produced by an unwrap
    pub fn base(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_field: None,
            occurrence: None,
        }
    }

    /// A leaf column generated by normalizing `field`, before widening
    pub fn leaf(path: &str, field: &str) -> Self {
        Self {
            name: format!("{path}{}", field_marker(field)),
            source_field: Some(field.to_string()),
            occurrence: None,
        }
    }

    /// True when this column was generated by the pass currently flattening `field`
    pub fn is_primary_target(&self, field: &str) -> bool {
        self.occurrence.is_none() && self.source_field.as_deref() == Some(field)
    }

    /// The same column at occurrence `index`, named `<name>_<index>`
    pub fn with_occurrence(&self, index: usize) -> Self {
        Self {
            name: format!("{}_{}", self.name, index),
            source_field: self.source_field.clone(),
            occurrence: Some(index),
        }
    }

    /// The same tags under a different rendered name
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_field: self.source_field.clone(),
            occurrence: self.occurrence,
        }
    }
}

/// Row-major table of JSON cells. Row values line up with `columns`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordTable {
    columns: Vec<ColumnMeta>,
    rows: Vec<Vec<Value>>,
}

impl RecordTable {
    pub fn new(columns: Vec<ColumnMeta>, rows: Vec<Vec<Value>>) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == columns.len()));
        Self { columns, rows }
    }

    /// Build a table from JSON objects. Columns are the union of keys in
    /// first-appearance order; keys missing from a record are null.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = Record>,
    {
        let records: Vec<Record> = records.into_iter().collect();
        let mut names: IndexSet<String> = IndexSet::new();
        for record in &records {
            for key in record.keys() {
                if !names.contains(key) {
                    names.insert(key.clone());
                }
            }
        }

        let rows = records
            .into_iter()
            .map(|mut record| {
                names
                    .iter()
                    .map(|name| record.remove(name).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Self {
            columns: names.into_iter().map(ColumnMeta::base).collect(),
            rows,
        }
    }

    /// Build a table from named columns of equal length
    pub fn from_columns(columns: Vec<(String, Vec<Value>)>) -> Self {
        let height = columns.iter().map(|(_, v)| v.len()).max().unwrap_or(0);
        let mut rows = vec![Vec::with_capacity(columns.len()); height];
        let mut metas = Vec::with_capacity(columns.len());
        for (name, values) in columns {
            let mut values = values.into_iter();
            for row in rows.iter_mut() {
                row.push(values.next().unwrap_or(Value::Null));
            }
            metas.push(ColumnMeta::base(name));
        }
        Self {
            columns: metas,
            rows,
        }
    }

    /// Read a parsed JSON document as a table.
    ///
    /// Arrays become one row per element. An object whose values are all
    /// arrays of one length is read column-wise; any other object is one row.
    pub fn from_json(document: Value) -> Self {
        match document {
            Value::Array(items) => Self::from_records(items.into_iter().map(|item| match item {
                Value::Object(map) => map,
                other => anonymous_record(other),
            })),
            Value::Object(map) if is_column_oriented(&map) => Self::from_columns(
                map.into_iter()
                    .map(|(name, value)| match value {
                        Value::Array(values) => (name, values),
                        other => (name, vec![other]),
                    })
                    .collect(),
            ),
            Value::Object(map) => Self::from_records(std::iter::once(map)),
            other => Self::from_records(std::iter::once(anonymous_record(other))),
        }
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn into_parts(self) -> (Vec<ColumnMeta>, Vec<Vec<Value>>) {
        (self.columns, self.rows)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// All values of one column, top to bottom
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// A single cell, addressed by row position and column name
    pub fn value(&self, row: usize, name: &str) -> Option<&Value> {
        let idx = self.column_index(name)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Rows as JSON objects keyed in column order
    pub fn to_records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row.iter())
                    .map(|(col, value)| (col.name.clone(), value.clone()))
                    .collect()
            })
            .collect()
    }
}

fn anonymous_record(value: Value) -> Record {
    let mut record = Map::new();
    record.insert(ANONYMOUS_LEAF.to_string(), value);
    record
}

fn is_column_oriented(map: &Map<String, Value>) -> bool {
    let mut lengths = map.values().map(|v| v.as_array().map(Vec::len));
    match lengths.next() {
        Some(Some(first)) => lengths.all(|len| len == Some(first)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_array_unions_keys_in_order() {
        let table = RecordTable::from_json(json!([
            {"id": 1, "title": "a"},
            {"id": 2, "buyer": {"name": "x"}}
        ]));

        assert_eq!(table.column_names(), vec!["id", "title", "buyer"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.value(0, "buyer"), Some(&Value::Null));
        assert_eq!(table.value(1, "buyer"), Some(&json!({"name": "x"})));
    }

    #[test]
    fn test_from_json_single_object_is_one_row() {
        let table = RecordTable::from_json(json!({
            "uri": "https://example.org",
            "releases": [{"id": "r1"}, {"id": "r2"}]
        }));

        assert_eq!(table.len(), 1);
        assert_eq!(table.column_names(), vec!["uri", "releases"]);
    }

    #[test]
    fn test_from_json_column_oriented_object() {
        let table = RecordTable::from_json(json!({
            "notice-title": ["a", "b"],
            "buyer-city": ["Berlin", "Bonn"]
        }));

        assert_eq!(table.len(), 2);
        assert_eq!(table.value(1, "buyer-city"), Some(&json!("Bonn")));
    }

    #[test]
    fn test_scalar_elements_use_anonymous_column() {
        let table = RecordTable::from_json(json!([1, 2]));
        assert_eq!(table.column_names(), vec![ANONYMOUS_LEAF]);
        assert_eq!(table.column(ANONYMOUS_LEAF).unwrap(), vec![&json!(1), &json!(2)]);
    }

    #[test]
    fn test_to_records_keeps_column_order() {
        let table = RecordTable::from_json(json!([{"b": 1, "a": 2}]));
        let records = table.to_records();
        let keys: Vec<&String> = records[0].keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn test_leaf_meta_renders_marker_and_occurrence() {
        let leaf = ColumnMeta::leaf("sku", "items");
        assert_eq!(leaf.name, "sku_items");
        assert!(leaf.is_primary_target("items"));
        assert!(!leaf.is_primary_target("lots"));

        let widened = leaf.with_occurrence(2);
        assert_eq!(widened.name, "sku_items_2");
        assert_eq!(widened.occurrence, Some(2));
        assert!(!widened.is_primary_target("items"));
    }
}
