//! Naming and pruning of widened columns.
//!
//! After widening, every column of the pass input exists once per occurrence
//! index. Only the columns generated by the field being flattened keep their
//! per-occurrence fan-out; everything carried along from earlier passes is
//! collapsed back to its first occurrence under its original name.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::constants::{field_marker, PARENT_ID_COLUMN};
use crate::table::ColumnMeta;

/// Names of widened columns that the legacy rule treats as fan-out noise
static LEGACY_NOISE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^_[2-9]|\d_{2,}").expect("static pattern compiles"));

/// How a flatten pass decides which widened columns to keep and what to call them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrunePolicy {
    /// Decide from the column tags recorded at generation time
    #[default]
    Typed,
    /// Decide from the rendered names, reproducing the historical pattern
    /// rule including its limits (occurrence counts above 9, leaf names
    /// ending in a digit followed by underscores)
    NamePattern,
}

/// One (column, occurrence) pair of a widened table, before naming
#[derive(Debug, Clone, PartialEq)]
pub struct WideColumn {
    /// The pre-widen column this occurrence copies
    pub base: ColumnMeta,
    /// 1-based occurrence index
    pub occurrence: usize,
    /// Generated by the field flattened in this pass
    pub primary: bool,
}

impl WideColumn {
    /// `<base>_<occurrence>`, the name the widen step renders
    pub fn widened_name(&self) -> String {
        format!("{}_{}", self.base.name, self.occurrence)
    }
}

impl PrunePolicy {
    /// Choose the surviving columns and their final names.
    ///
    /// Returns `(index into wide, final column)` in wide order. Names are
    /// unique; when two columns resolve to the same name the first wins.
    pub fn resolve(
        self,
        wide: &[WideColumn],
        field: &str,
        all_fields: &[String],
    ) -> Vec<(usize, ColumnMeta)> {
        let markers: Vec<String> = all_fields.iter().map(|f| field_marker(f)).collect();
        let current = field_marker(field);

        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(PARENT_ID_COLUMN.to_string());

        wide.iter()
            .enumerate()
            .filter_map(|(idx, col)| {
                let named = match self {
                    PrunePolicy::Typed => typed(col),
                    PrunePolicy::NamePattern => by_pattern(col, &current, &markers),
                }?;
                let trimmed = named.name.trim_end_matches('_').to_string();
                if seen.insert(trimmed.clone()) {
                    Some((idx, named.renamed(trimmed)))
                } else {
                    None
                }
            })
            .collect()
    }
}

fn typed(col: &WideColumn) -> Option<ColumnMeta> {
    if col.primary {
        Some(col.base.with_occurrence(col.occurrence))
    } else if col.occurrence == 1 {
        Some(col.base.clone())
    } else {
        None
    }
}

fn by_pattern(col: &WideColumn, current: &str, markers: &[String]) -> Option<ColumnMeta> {
    let rendered = col.widened_name();
    if LEGACY_NOISE.is_match(&rendered) && !markers.iter().any(|m| rendered.contains(m.as_str())) {
        return None;
    }

    if rendered.contains(current) {
        return Some(col.base.with_occurrence(col.occurrence));
    }

    // Drop the two trailing characters, i.e. the "_<digit>" suffix
    let mut chars = rendered.chars();
    chars.next_back();
    chars.next_back();
    Some(col.base.renamed(chars.as_str()))
}
