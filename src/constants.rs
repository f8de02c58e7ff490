/// Table and column name constants shared across the pipeline.
/// Source table names match the file stems of the exported JSON documents.

// Source tables (file stems in the input directory)
pub const BESCHA_SOURCE: &str = "overView_Bescha";
pub const TED_SOURCE: &str = "overView_Ted";

// Unified table names written after source unification
pub const BESCHA_UNIFIED: &str = "bescha";
pub const TED_UNIFIED: &str = "ted";

/// Outer collection every Bescha record arrives wrapped in
pub const RELEASES_FIELD: &str = "releases";

/// Column carrying the lineage back to the parent row of a flatten pass
pub const PARENT_ID_COLUMN: &str = "parent_id";

/// Leaf name used for collection elements that are not mappings
pub const ANONYMOUS_LEAF: &str = "value";

/// Separator for nested mapping paths
pub const PATH_SEPARATOR: &str = ".";

/// Date prefix of persisted files
pub const OUTPUT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Nested fields flattened for the Bescha source, in processing order
pub const BESCHA_NESTED_FIELDS: [&str; 5] = [
    "parties",
    "awards",
    "contracts",
    "tender.items",
    "tender.lots",
];

/// Get the default nested field list as owned strings
pub fn default_nested_fields() -> Vec<String> {
    BESCHA_NESTED_FIELDS.iter().map(|f| f.to_string()).collect()
}

/// Marker a nested field leaves in every column it generates
pub fn field_marker(field: &str) -> String {
    format!("_{field}")
}
