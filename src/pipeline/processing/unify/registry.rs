use std::collections::BTreeMap;

use tracing::{info, warn};

use super::sources::{BeschaMapping, TedMapping};
use super::SourceMapping;
use crate::constants::{BESCHA_SOURCE, TED_SOURCE};
use crate::cpv::CpvCatalog;
use crate::error::Result;
use crate::table::RecordTable;

/// Registry of source mappings, keyed by the source table they read
pub struct MappingRegistry {
    mappings: BTreeMap<String, Box<dyn SourceMapping>>,
}

impl MappingRegistry {
    /// Create a registry with the built-in Bescha and TED mappings
    pub fn new(catalog: Option<CpvCatalog>) -> Self {
        Self::for_sources(BESCHA_SOURCE, TED_SOURCE, catalog)
    }

    /// Create a registry reading the given primary (Bescha) and secondary (TED) tables
    pub fn for_sources(primary: &str, secondary: &str, catalog: Option<CpvCatalog>) -> Self {
        let mut registry = Self {
            mappings: BTreeMap::new(),
        };
        registry.register(Box::new(BeschaMapping::for_source(primary)));
        registry.register(Box::new(TedMapping::new(catalog).with_source(secondary)));
        registry
    }

    /// Register a mapping under its source id
    pub fn register(&mut self, mapping: Box<dyn SourceMapping>) {
        self.mappings.insert(mapping.source_id().to_string(), mapping);
    }

    pub fn get_mapping(&self, source_id: &str) -> Option<&dyn SourceMapping> {
        self.mappings.get(source_id).map(|m| m.as_ref())
    }

    /// List all registered source ids
    pub fn list_sources(&self) -> Vec<&str> {
        self.mappings.keys().map(|k| k.as_str()).collect()
    }

    /// Map every registered source present in `tables`, keyed by target name.
    /// Sources that were not loaded are skipped.
    pub fn unify(
        &self,
        tables: &BTreeMap<String, RecordTable>,
    ) -> Result<BTreeMap<String, RecordTable>> {
        let mut unified = BTreeMap::new();
        for (source_id, mapping) in &self.mappings {
            match tables.get(source_id) {
                Some(table) => {
                    let mapped = mapping.map(table)?;
                    info!(
                        "Unified {} into {} ({} rows)",
                        source_id,
                        mapping.target_name(),
                        mapped.len()
                    );
                    unified.insert(mapping.target_name().to_string(), mapped);
                }
                None => warn!("Source table {} not loaded, skipping unification", source_id),
            }
        }
        Ok(unified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{BESCHA_UNIFIED, TED_UNIFIED};
    use serde_json::json;

    #[test]
    fn test_registry_has_built_in_mappings() {
        let registry = MappingRegistry::new(None);

        let sources = registry.list_sources();
        assert!(sources.contains(&BESCHA_SOURCE));
        assert!(sources.contains(&TED_SOURCE));
        assert_eq!(registry.get_mapping(TED_SOURCE).unwrap().target_name(), TED_UNIFIED);
        assert!(registry.get_mapping("unknown").is_none());
    }

    #[test]
    fn test_registry_for_renamed_sources() {
        let registry = MappingRegistry::for_sources("releases_2024", "notices_2024", None);
        assert_eq!(registry.list_sources(), vec!["notices_2024", "releases_2024"]);
        assert_eq!(
            registry.get_mapping("releases_2024").unwrap().target_name(),
            BESCHA_UNIFIED
        );
    }

    #[test]
    fn test_unify_skips_missing_sources() {
        let registry = MappingRegistry::new(None);
        let mut tables = BTreeMap::new();
        tables.insert(
            BESCHA_SOURCE.to_string(),
            RecordTable::from_json(json!([{"tender.title": "A"}])),
        );

        let unified = registry.unify(&tables).unwrap();

        assert_eq!(unified.len(), 1);
        assert_eq!(
            unified[BESCHA_UNIFIED].value(0, "tender_title"),
            Some(&json!("A"))
        );
    }
}
