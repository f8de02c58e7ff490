use serde_json::Value;
use tracing::debug;

use crate::constants::PARENT_ID_COLUMN;
use crate::error::{FlattenError, Result};
use crate::table::{ColumnMeta, RecordTable};

/// One row of an expanded table: a copy of its parent row with the
/// collection cell replaced by a single element
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedRow {
    /// Position of the source row in the table that was expanded
    pub parent_id: usize,
    /// The collection element, or null for an empty/missing collection
    pub element: Value,
    /// The remaining cells of the parent row, aligned with `ExpandedTable::carried`
    pub carried: Vec<Value>,
}

/// Result of replicating each row once per element of `field`
#[derive(Debug, Clone)]
pub struct ExpandedTable {
    pub field: String,
    /// Columns copied unchanged from the parent row
    pub carried: Vec<ColumnMeta>,
    pub rows: Vec<ExpandedRow>,
}

impl ExpandedTable {
    /// Parent ids in expansion order, one per expanded row
    pub fn parent_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.rows.iter().map(|row| row.parent_id)
    }
}

/// Replicate every row of `table` once per element of the collection in `field`.
///
/// Rows whose collection is empty or null still produce exactly one row with
/// a null element. Non-array values are treated as one-element collections.
/// Output order is source row order, then element order.
pub fn expand(table: &RecordTable, field: &str) -> Result<ExpandedTable> {
    let field_idx = table
        .column_index(field)
        .ok_or_else(|| FlattenError::missing_column(field))?;

    // A parent_id left by an earlier pass is stale once this table is re-expanded
    let keep: Vec<usize> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(idx, col)| *idx != field_idx && col.name != PARENT_ID_COLUMN)
        .map(|(idx, _)| idx)
        .collect();

    let carried = keep.iter().map(|&i| table.columns()[i].clone()).collect();

    let mut rows = Vec::with_capacity(table.len());
    for (parent_id, row) in table.rows().iter().enumerate() {
        let carried_values: Vec<Value> = keep.iter().map(|&i| row[i].clone()).collect();
        for element in elements(&row[field_idx]) {
            rows.push(ExpandedRow {
                parent_id,
                element,
                carried: carried_values.clone(),
            });
        }
    }

    debug!(
        field,
        parents = table.len(),
        expanded = rows.len(),
        "Expanded collection column"
    );

    Ok(ExpandedTable {
        field: field.to_string(),
        carried,
        rows,
    })
}

fn elements(cell: &Value) -> Vec<Value> {
    match cell {
        Value::Array(items) if items.is_empty() => vec![Value::Null],
        Value::Array(items) => items.clone(),
        Value::Null => vec![Value::Null],
        other => vec![other.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn sample() -> RecordTable {
        RecordTable::from_json(json!([
            {"id": 1, "items": [{"sku": "A"}, {"sku": "B"}, {"sku": "C"}]},
            {"id": 2, "items": []},
            {"id": 3},
            {"id": 4, "items": null},
            {"id": 5, "items": [{"sku": "D"}]}
        ]))
    }

    #[test]
    fn test_every_parent_survives_expansion() {
        let table = sample();
        let expanded = expand(&table, "items").unwrap();

        let before: BTreeSet<usize> = (0..table.len()).collect();
        let after: BTreeSet<usize> = expanded.parent_ids().collect();
        assert_eq!(before, after);
        assert_eq!(expanded.rows.len(), 3 + 1 + 1 + 1 + 1);
    }

    #[test]
    fn test_empty_and_missing_collections_yield_one_null_row() {
        let expanded = expand(&sample(), "items").unwrap();

        for parent in [1, 2, 3] {
            let rows: Vec<&ExpandedRow> = expanded
                .rows
                .iter()
                .filter(|r| r.parent_id == parent)
                .collect();
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].element, Value::Null);
        }
    }

    #[test]
    fn test_order_is_row_then_element() {
        let expanded = expand(&sample(), "items").unwrap();

        let parents: Vec<usize> = expanded.parent_ids().collect();
        assert_eq!(parents, vec![0, 0, 0, 1, 2, 3, 4]);

        let skus: Vec<&Value> = expanded.rows[..3].iter().map(|r| &r.element["sku"]).collect();
        assert_eq!(skus, vec![&json!("A"), &json!("B"), &json!("C")]);
    }

    #[test]
    fn test_carried_columns_exclude_field_and_stale_parent_id() {
        let table = RecordTable::from_json(json!([
            {"parent_id": 7, "id": 1, "items": [1, 2]}
        ]));
        let expanded = expand(&table, "items").unwrap();

        let names: Vec<&str> = expanded.carried.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id"]);
        assert!(expanded.rows.iter().all(|r| r.carried == vec![json!(1)]));
    }

    #[test]
    fn test_scalar_cell_is_single_element() {
        let table = RecordTable::from_json(json!([{"items": {"sku": "A"}}]));
        let expanded = expand(&table, "items").unwrap();
        assert_eq!(expanded.rows.len(), 1);
        assert_eq!(expanded.rows[0].element, json!({"sku": "A"}));
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let result = expand(&sample(), "lots");
        assert!(matches!(
            result,
            Err(FlattenError::MissingColumn { ref column }) if column == "lots"
        ));
    }
}
