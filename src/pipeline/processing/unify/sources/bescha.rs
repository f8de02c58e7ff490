use crate::constants::{BESCHA_SOURCE, BESCHA_UNIFIED};
use crate::error::Result;
use crate::table::RecordTable;

use super::super::{copy_column, SourceMapping};

/// Unified column -> flattened Bescha column. `None` has no Bescha counterpart.
const COLUMNS: [(&str, Option<&str>); 18] = [
    ("tender_title", Some("tender.title")),
    ("tender_description", Some("tender.description")),
    ("tender_cpv_number", Some("classification.id_tender.items_1")),
    ("tender_cpv_category", Some("tender.mainProcurementCategory")),
    ("tender_numberOfTenderers", Some("tender.numberOfTenderers")),
    ("buyer_name", Some("tender.procuringEntity.name")),
    ("buyer_locality", Some("buyer.address.locality")),
    ("buyer_nut", Some("buyer.address.region")),
    ("contracts_value_amount", Some("value.amount_contracts_1")),
    ("lot_description", Some("description_tender.lots_1")),
    ("publication_number", None),
    ("BT-05(a)-notice", Some("tender.awardPeriod.endDate")),
    ("company_size", None),
    ("BT-262-Lot", None),
    ("BT-27-Procedure", None),
    ("winner_name", None),
    ("winner_post_code", None),
    ("winner_size", None),
];

/// Mapping for the flattened Bescha (OCDS release) table
#[derive(Debug)]
pub struct BeschaMapping {
    source_id: String,
}

impl BeschaMapping {
    pub fn new() -> Self {
        Self::for_source(BESCHA_SOURCE)
    }

    /// Read the flattened releases from a table with a non-default name
    pub fn for_source(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
        }
    }
}

impl Default for BeschaMapping {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceMapping for BeschaMapping {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn target_name(&self) -> &str {
        BESCHA_UNIFIED
    }

    fn map(&self, table: &RecordTable) -> Result<RecordTable> {
        let columns = COLUMNS
            .iter()
            .map(|(target, source)| {
                (target.to_string(), copy_column(table, *source, self.source_id()))
            })
            .collect();
        Ok(RecordTable::from_columns(columns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::unify::UNIFIED_COLUMNS;
    use serde_json::{json, Value};

    #[test]
    fn test_bescha_mapping_copies_flattened_columns() {
        let table = RecordTable::from_json(json!([{
            "parent_id": 0,
            "tender.title": "Neubau Kita",
            "classification.id_tender.items_1": "45214100",
            "value.amount_contracts_1": 125000.0
        }]));

        let unified = BeschaMapping::new().map(&table).unwrap();

        assert_eq!(unified.column_names(), UNIFIED_COLUMNS.to_vec());
        assert_eq!(unified.value(0, "tender_title"), Some(&json!("Neubau Kita")));
        assert_eq!(unified.value(0, "tender_cpv_number"), Some(&json!("45214100")));
        assert_eq!(unified.value(0, "contracts_value_amount"), Some(&json!(125000.0)));
        assert_eq!(unified.value(0, "buyer_name"), Some(&Value::Null));
        assert_eq!(unified.value(0, "winner_name"), Some(&Value::Null));
    }
}
