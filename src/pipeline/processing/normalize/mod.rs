use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::constants::{ANONYMOUS_LEAF, PATH_SEPARATOR};
use crate::error::Result;
use crate::table::{ColumnMeta, RecordTable};

use super::expand::expand;

/// Leaf columns produced by normalizing a sequence of collection elements.
/// `rows[i]` lines up with `paths` and belongs to the i-th element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedLeaves {
    pub paths: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Flatten one collection element into `(leaf path, value)` pairs.
///
/// Top-level scalars come first in key order, followed by nested mappings
/// walked depth-first with dot-joined paths. Arrays are kept as values.
/// A null element has no leaves; any other non-mapping element becomes a
/// single anonymous leaf.
pub fn normalize_element(element: &Value) -> Vec<(String, Value)> {
    match element {
        Value::Object(map) => {
            let mut leaves = Vec::with_capacity(map.len());
            for (key, value) in map.iter().filter(|(_, v)| !v.is_object()) {
                leaves.push((key.clone(), value.clone()));
            }
            for (key, value) in map.iter().filter(|(_, v)| v.is_object()) {
                collect_nested(key, value, &mut leaves);
            }
            leaves
        }
        Value::Null => Vec::new(),
        other => vec![(ANONYMOUS_LEAF.to_string(), other.clone())],
    }
}

fn collect_nested(path: &str, value: &Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                collect_nested(&format!("{path}{PATH_SEPARATOR}{key}"), child, out);
            }
        }
        other => out.push((path.to_string(), other.clone())),
    }
}

/// Normalize every element and align the results on the union of leaf paths
/// (first-appearance order). Paths an element lacks are null.
pub fn normalize_elements<'a, I>(elements: I) -> NormalizedLeaves
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut positions: IndexMap<String, usize> = IndexMap::new();
    let mut sparse: Vec<Vec<(usize, Value)>> = Vec::new();

    for element in elements {
        let cells = normalize_element(element)
            .into_iter()
            .map(|(path, value)| {
                let next = positions.len();
                let idx = *positions.entry(path).or_insert(next);
                (idx, value)
            })
            .collect();
        sparse.push(cells);
    }

    let width = positions.len();
    let rows = sparse
        .into_iter()
        .map(|cells| {
            let mut row = vec![Value::Null; width];
            for (idx, value) in cells {
                row[idx] = value;
            }
            row
        })
        .collect();

    NormalizedLeaves {
        paths: positions.into_keys().collect(),
        rows,
    }
}

/// Replace a table by the normalized elements of its collection column `field`.
///
/// Used for the outer wrapper every source record arrives in: each element
/// becomes its own row, and nothing from the wrapper row is kept.
#[instrument(skip(table), fields(rows = table.len()))]
pub fn unwrap_collection(table: &RecordTable, field: &str) -> Result<RecordTable> {
    let expanded = expand(table, field)?;
    let leaves = normalize_elements(expanded.rows.iter().map(|row| &row.element));

    debug!(
        columns = leaves.paths.len(),
        rows = leaves.rows.len(),
        "Unwrapped collection"
    );

    let columns = leaves.paths.into_iter().map(ColumnMeta::base).collect();
    Ok(RecordTable::new(columns, leaves.rows))
}
