use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::constants::PARENT_ID_COLUMN;
use crate::error::Result;
use crate::table::{ColumnMeta, RecordTable};

use super::expand::{expand, ExpandedTable};
use super::normalize::normalize_elements;
use super::prune::{PrunePolicy, WideColumn};

/// Settings shared by every pass of one flatten run
#[derive(Debug, Clone, Copy)]
pub struct PassContext<'a> {
    pub policy: PrunePolicy,
    /// Every nested field of the run, in processing order
    pub all_fields: &'a [String],
}

/// Timing and shape of one completed pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassSummary {
    pub field: String,
    pub rows: usize,
    pub columns: usize,
    pub max_occurrence: usize,
    pub elapsed: Duration,
}

/// Output of flattening a table over a list of nested fields
#[derive(Debug, Clone)]
pub struct FlattenOutcome {
    pub table: RecordTable,
    pub passes: Vec<PassSummary>,
}

/// 1-based occurrence index of every expanded row within its parent, in
/// expansion order
pub fn assign_occurrences(expanded: &ExpandedTable) -> Vec<usize> {
    let mut counters: HashMap<usize, usize> = HashMap::new();
    expanded
        .parent_ids()
        .map(|parent| {
            let seen = counters.entry(parent).or_insert(0);
            *seen += 1;
            *seen
        })
        .collect()
}

/// Long-form view of an expanded table: carried columns followed by the
/// normalized leaf columns of the flattened field
struct LongTable {
    columns: Vec<ColumnMeta>,
    carried_idx: Vec<usize>,
    expanded: ExpandedTable,
    leaves: Vec<Vec<Value>>,
}

impl LongTable {
    fn build(expanded: ExpandedTable) -> Self {
        let field = expanded.field.clone();
        let normalized = normalize_elements(expanded.rows.iter().map(|r| &r.element));
        let leaf_columns: Vec<ColumnMeta> = normalized
            .paths
            .iter()
            .map(|path| ColumnMeta::leaf(path, &field))
            .collect();

        // A freshly generated leaf replaces a carried column of the same name
        let leaf_names: HashSet<&str> = leaf_columns.iter().map(|c| c.name.as_str()).collect();
        let carried_idx: Vec<usize> = expanded
            .carried
            .iter()
            .enumerate()
            .filter(|(_, c)| !leaf_names.contains(c.name.as_str()))
            .map(|(i, _)| i)
            .collect();

        let mut columns: Vec<ColumnMeta> = carried_idx
            .iter()
            .map(|&i| expanded.carried[i].clone())
            .collect();
        columns.extend(leaf_columns);

        Self {
            columns,
            carried_idx,
            expanded,
            leaves: normalized.rows,
        }
    }

    fn cell(&self, row: usize, column: usize) -> &Value {
        match self.carried_idx.get(column) {
            Some(&carried) => &self.expanded.rows[row].carried[carried],
            None => &self.leaves[row][column - self.carried_idx.len()],
        }
    }
}

/// Flatten the collection column `field` into one column group per occurrence.
///
/// Every row of the result stands for one row of `table` (its `parent_id`),
/// and the field's leaves appear as `<leaf>_<field>_<occurrence>`. Columns
/// carried from earlier passes keep their first occurrence only.
#[instrument(skip(table, ctx), fields(rows = table.len(), columns = table.width()))]
pub fn flatten(table: &RecordTable, field: &str, ctx: &PassContext<'_>) -> Result<RecordTable> {
    let expanded = expand(table, field)?;
    let occurrences = assign_occurrences(&expanded);

    // Parents in ascending id order, each with its rows in occurrence order
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (row, parent) in expanded.parent_ids().enumerate() {
        groups.entry(parent).or_default().push(row);
    }

    let long = LongTable::build(expanded);
    let max_occurrence = occurrences.iter().copied().max().unwrap_or(0);

    let mut order: Vec<usize> = (0..long.columns.len()).collect();
    order.sort_by(|a, b| long.columns[*a].name.cmp(&long.columns[*b].name));

    let mut wide = Vec::with_capacity(order.len() * max_occurrence);
    let mut sources = Vec::with_capacity(order.len() * max_occurrence);
    for occurrence in 1..=max_occurrence {
        for &column in &order {
            let base = long.columns[column].clone();
            let primary = base.is_primary_target(field);
            wide.push(WideColumn {
                base,
                occurrence,
                primary,
            });
            sources.push(column);
        }
    }

    let selected = ctx.policy.resolve(&wide, field, ctx.all_fields);
    debug!(
        widened = wide.len(),
        kept = selected.len(),
        max_occurrence,
        "Widened and pruned columns"
    );

    let mut columns = Vec::with_capacity(selected.len() + 1);
    columns.push(ColumnMeta::base(PARENT_ID_COLUMN));
    columns.extend(selected.iter().map(|(_, meta)| meta.clone()));

    let rows = groups
        .iter()
        .map(|(&parent, members)| {
            let mut row = Vec::with_capacity(columns.len());
            row.push(Value::from(parent));
            for (idx, _) in &selected {
                let occurrence = wide[*idx].occurrence;
                let value = members
                    .get(occurrence - 1)
                    .map(|&r| long.cell(r, sources[*idx]).clone())
                    .unwrap_or(Value::Null);
                row.push(value);
            }
            row
        })
        .collect();

    Ok(RecordTable::new(columns, rows))
}

/// Flatten `fields` one after another, each pass consuming the previous
/// pass's output. Order matters: later passes prune and rename the columns
/// earlier passes produced.
pub fn flatten_nested_fields(
    table: &RecordTable,
    fields: &[String],
    policy: PrunePolicy,
) -> Result<FlattenOutcome> {
    let ctx = PassContext {
        policy,
        all_fields: fields,
    };

    let mut current: Option<RecordTable> = None;
    let mut passes = Vec::with_capacity(fields.len());

    for field in fields {
        info!("Starting extraction for column: {}", field);
        let started = Instant::now();

        let input = current.as_ref().unwrap_or(table);
        let output = flatten(input, field, &ctx)?;

        let elapsed = started.elapsed();
        histogram!("tender_flatten_pass_duration_seconds", "field" => field.clone())
            .record(elapsed.as_secs_f64());
        counter!("tender_flatten_passes_total").increment(1);

        let max_occurrence = output
            .columns()
            .iter()
            .filter(|c| c.source_field.as_deref() == Some(field.as_str()))
            .filter_map(|c| c.occurrence)
            .max()
            .unwrap_or(0);

        info!(
            "Flattened {} in {:.2}s ({} rows, {} columns)",
            field,
            elapsed.as_secs_f64(),
            output.len(),
            output.width()
        );

        passes.push(PassSummary {
            field: field.clone(),
            rows: output.len(),
            columns: output.width(),
            max_occurrence,
            elapsed,
        });
        current = Some(output);
    }

    Ok(FlattenOutcome {
        table: current.unwrap_or_else(|| table.clone()),
        passes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlattenError;
    use serde_json::json;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn run(table: &RecordTable, names: &[&str]) -> RecordTable {
        flatten_nested_fields(table, &fields(names), PrunePolicy::Typed)
            .unwrap()
            .table
    }

    #[test]
    fn test_items_widen_into_occurrence_columns() {
        let table = RecordTable::from_json(json!([
            {"id": 1, "items": [{"sku": "A"}, {"sku": "B"}]},
            {"id": 2, "items": []}
        ]));

        let out = run(&table, &["items"]);

        assert_eq!(out.column_names(), vec!["parent_id", "id", "sku_items_1", "sku_items_2"]);
        assert_eq!(out.len(), 2);
        assert_eq!(out.value(0, "parent_id"), Some(&json!(0)));
        assert_eq!(out.value(0, "sku_items_1"), Some(&json!("A")));
        assert_eq!(out.value(0, "sku_items_2"), Some(&json!("B")));
        assert_eq!(out.value(1, "id"), Some(&json!(2)));
        assert_eq!(out.value(1, "sku_items_1"), Some(&Value::Null));
        assert_eq!(out.value(1, "sku_items_2"), Some(&Value::Null));
    }

    #[test]
    fn test_occurrences_are_complete_per_parent() {
        let table = RecordTable::from_json(json!([
            {"items": [1, 2, 3]},
            {"items": []},
            {"items": [4]}
        ]));
        let expanded = expand(&table, "items").unwrap();
        let occurrences = assign_occurrences(&expanded);

        assert_eq!(occurrences, vec![1, 2, 3, 1, 1]);
    }

    #[test]
    fn test_nested_leaves_use_dotted_paths() {
        let table = RecordTable::from_json(json!([
            {"parties": [{"id": "p1", "address": {"locality": "Bonn"}}]}
        ]));

        let out = run(&table, &["parties"]);
        assert_eq!(
            out.column_names(),
            vec!["parent_id", "address.locality_parties_1", "id_parties_1"]
        );
    }

    #[test]
    fn test_earlier_field_columns_survive_later_pass_once() {
        let table = RecordTable::from_json(json!([
            {"a": [{"x": 1}, {"x": 2}], "b": [{"y": 10}, {"y": 20}]},
            {"a": [{"x": 3}], "b": []}
        ]));

        let out = run(&table, &["a", "b"]);

        assert_eq!(
            out.column_names(),
            vec!["parent_id", "x_a_1", "x_a_2", "y_b_1", "y_b_2"]
        );
        assert!(!out.has_column("x_a_2_2"));
        assert_eq!(out.value(0, "x_a_2"), Some(&json!(2)));
        assert_eq!(out.value(1, "x_a_1"), Some(&json!(3)));
        assert_eq!(out.value(1, "x_a_2"), Some(&Value::Null));
        assert_eq!(out.value(0, "y_b_2"), Some(&json!(20)));
    }

    #[test]
    fn test_reflattening_adds_no_columns_beyond_first_occurrence() {
        let table = RecordTable::from_json(json!([
            {"id": 1, "items": [{"sku": "A"}, {"sku": "B"}], "lots": [{"n": 1}, {"n": 2}]}
        ]));
        let ctx_fields = fields(&["items", "lots"]);
        let ctx = PassContext {
            policy: PrunePolicy::Typed,
            all_fields: &ctx_fields,
        };

        let once = flatten(&table, "lots", &ctx).unwrap();
        let again = flatten(&once, "items", &ctx).unwrap();

        for name in once.column_names() {
            if name == "parent_id" || name == "items" {
                continue;
            }
            assert!(again.has_column(name), "lost column {name}");
            assert!(!again.has_column(&format!("{name}_2")), "fanned out {name}");
        }
        assert_eq!(again.width(), once.width() - 1 + 2);

        // the consumed field cannot be flattened twice
        let repeated = flatten(&again, "items", &ctx);
        assert!(matches!(repeated, Err(FlattenError::MissingColumn { .. })));
    }

    #[test]
    fn test_scalar_elements_become_anonymous_leaf() {
        let table = RecordTable::from_json(json!([{"tags": ["x", "y"]}]));
        let out = run(&table, &["tags"]);
        assert_eq!(out.column_names(), vec!["parent_id", "value_tags_1", "value_tags_2"]);
    }

    #[test]
    fn test_missing_field_is_fatal() {
        let table = RecordTable::from_json(json!([{"id": 1}]));
        let result = flatten_nested_fields(&table, &fields(&["awards"]), PrunePolicy::Typed);
        assert!(matches!(result, Err(FlattenError::MissingColumn { .. })));
    }

    #[test]
    fn test_policies_agree_on_ordinary_input() {
        let table = RecordTable::from_json(json!([
            {"t": "a", "p": [{"n": 1}, {"n": 2}], "q": [{"m": {"k": 1}}, {"m": {"k": 2}}, {"m": {"k": 3}}]},
            {"t": "b", "p": [], "q": [{"m": {"k": 4}}]}
        ]));
        let names = fields(&["p", "q"]);

        let typed = flatten_nested_fields(&table, &names, PrunePolicy::Typed).unwrap();
        let legacy = flatten_nested_fields(&table, &names, PrunePolicy::NamePattern).unwrap();

        assert_eq!(typed.table.column_names(), legacy.table.column_names());
        assert_eq!(typed.table.rows(), legacy.table.rows());
        assert_eq!(typed.passes.len(), 2);
        assert_eq!(typed.passes[1].max_occurrence, 3);
    }

    #[test]
    fn test_parent_id_keeps_its_name_under_name_pattern() {
        let table = RecordTable::from_json(json!([
            {"t": "a", "p": [{"n": 1}, {"n": 2}]},
            {"t": "b", "p": [{"n": 3}]}
        ]));
        let names = fields(&["p"]);

        let legacy = flatten_nested_fields(&table, &names, PrunePolicy::NamePattern).unwrap();

        assert_eq!(legacy.table.column_names()[0], PARENT_ID_COLUMN);
        assert!(!legacy.table.has_column("parent"));
        assert_eq!(legacy.table.value(1, PARENT_ID_COLUMN), Some(&json!(1)));
    }

    #[test]
    fn test_flatten_is_deterministic() {
        let table = RecordTable::from_json(json!([
            {"z": 1, "a": [{"k2": 1, "k1": {"deep": true}}, {"k3": "x"}]},
            {"z": 2, "a": [{"k3": "y"}]}
        ]));

        let first = run(&table, &["a"]);
        let second = run(&table, &["a"]);
        assert_eq!(first, second);
    }
}
