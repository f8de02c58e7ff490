use serde_json::Value;
use tracing::debug;

use crate::constants::{TED_SOURCE, TED_UNIFIED};
use crate::cpv::{CpvCatalog, CpvCode};
use crate::error::Result;
use crate::table::RecordTable;

use super::super::{copy_column, extract_text, SourceMapping};

const CPV_COLUMN: &str = "classification-cpv";
const CATEGORY_COLUMN: &str = "tender_cpv_category";
const LOCALITY_COLUMN: &str = "buyer_locality";

const TEXT_LANGUAGE: &str = "deu";
const LOCALITY_LANGUAGE: &str = "mul";

/// Unified column -> TED notice column. `None` has no TED counterpart;
/// the CPV category is derived from `classification-cpv` instead.
const COLUMNS: [(&str, Option<&str>); 18] = [
    ("tender_title", Some("notice-title")),
    ("tender_description", Some("description-lot")),
    ("tender_cpv_number", Some(CPV_COLUMN)),
    (CATEGORY_COLUMN, None),
    ("tender_numberOfTenderers", None),
    ("buyer_name", Some("organisation-name-buyer")),
    (LOCALITY_COLUMN, Some("buyer-city")),
    ("buyer_nut", Some("buyer-country-sub")),
    ("contracts_value_amount", Some("total-value")),
    ("lot_description", Some("BT-24-Lot")),
    ("publication_number", Some("publicationNumber")),
    ("BT-05(a)-notice", Some("BT-05(a)-notice")),
    ("company_size", Some("BT-165-Organization-Company")),
    ("BT-262-Lot", Some("BT-262-Lot")),
    ("BT-27-Procedure", Some("BT-27-Procedure")),
    ("winner_name", Some("winner-name")),
    ("winner_post_code", Some("winner-post-code")),
    ("winner_size", Some("winner-size")),
];

/// Mapping for TED notices. Multilingual cells are reduced to German text
/// (the locality to its language-neutral form).
#[derive(Debug)]
pub struct TedMapping {
    source_id: String,
    catalog: Option<CpvCatalog>,
}

impl TedMapping {
    pub fn new(catalog: Option<CpvCatalog>) -> Self {
        Self {
            source_id: TED_SOURCE.to_string(),
            catalog,
        }
    }

    /// Read notices from a table with a non-default name
    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = source_id.into();
        self
    }

    fn categories(&self, table: &RecordTable) -> Vec<Value> {
        let Some(catalog) = &self.catalog else {
            return vec![Value::Null; table.len()];
        };
        copy_column(table, Some(CPV_COLUMN), self.source_id())
            .iter()
            .map(|cell| {
                let codes: Vec<CpvCode> = match cell {
                    Value::Array(items) => items.iter().filter_map(CpvCode::from_value).collect(),
                    _ => Vec::new(),
                };
                Value::Array(
                    catalog
                        .division_labels(codes.iter())
                        .into_iter()
                        .map(Value::String)
                        .collect(),
                )
            })
            .collect()
    }
}

impl SourceMapping for TedMapping {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn target_name(&self) -> &str {
        TED_UNIFIED
    }

    fn map(&self, table: &RecordTable) -> Result<RecordTable> {
        let mut columns = Vec::with_capacity(COLUMNS.len());
        for (target, source) in COLUMNS {
            let values = if target == CATEGORY_COLUMN {
                self.categories(table)
            } else {
                copy_column(table, source, self.source_id())
            };

            let lang = if target == LOCALITY_COLUMN {
                LOCALITY_LANGUAGE
            } else {
                TEXT_LANGUAGE
            };
            debug!("Extracting {} text for column: {}", lang, target);
            let values = values.iter().map(|v| extract_text(v, lang)).collect();

            columns.push((target.to_string(), values));
        }
        Ok(RecordTable::from_columns(columns))
    }
}
