use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use chrono::Local;
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::PipelineConfig;
use crate::constants::RELEASES_FIELD;
use crate::cpv::CpvCatalog;
use crate::error::{FlattenError, Result};
use crate::storage::{load_tables, persist_tables};
use crate::table::RecordTable;

use super::processing::unify::MappingRegistry;
use super::processing::{flatten_nested_fields, unwrap_collection, FlattenOutcome, PassSummary};

/// Summary of a complete pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub source_table: String,
    /// Shape of the flattened source table
    pub rows: usize,
    pub columns: usize,
    pub passes: Vec<PassSummary>,
    /// Names of every table handed back (and persisted, if configured)
    pub tables: Vec<String>,
    pub files_written: Vec<PathBuf>,
}

/// Every table of a run, keyed by name, with the run summary
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub tables: BTreeMap<String, RecordTable>,
    pub result: PipelineResult,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load the input directory, flatten the source table and write the results.
    /// Any failure stops the run; files already written are left in place.
    #[instrument(skip(self), fields(source = %self.config.source_table))]
    pub fn run(&self) -> Result<PipelineOutput> {
        let started = Instant::now();
        self.config.prepare_directories()?;

        let mut tables = load_tables(&self.config.data_dir)?;
        let source = tables
            .remove(&self.config.source_table)
            .ok_or_else(|| FlattenError::MissingSource(self.config.source_table.clone()))?;
        info!(
            "Loaded source table {} ({} rows)",
            self.config.source_table,
            source.len()
        );

        let outcome = self.flatten_source(&source)?;
        let (rows, columns) = (outcome.table.len(), outcome.table.width());
        info!("{} shape: ({}, {})", self.config.source_table, rows, columns);
        gauge!("tender_flattened_rows").set(rows as f64);
        gauge!("tender_flattened_columns").set(columns as f64);
        tables.insert(self.config.source_table.clone(), outcome.table);

        if self.config.unify {
            let unified = self.unify(&tables)?;
            tables.extend(unified);
        }

        let files_written = match &self.config.output_dir {
            Some(dir) => {
                let written = persist_tables(&tables, dir, Local::now().date_naive())?;
                counter!("tender_files_written_total").increment(written.len() as u64);
                written
            }
            None => {
                info!("No output directory specified. Skipping saving the tables.");
                Vec::new()
            }
        };

        let elapsed = started.elapsed();
        histogram!("tender_pipeline_duration_seconds").record(elapsed.as_secs_f64());
        info!("Pipeline finished in {:.2}s", elapsed.as_secs_f64());

        let result = PipelineResult {
            source_table: self.config.source_table.clone(),
            rows,
            columns,
            passes: outcome.passes,
            tables: tables.keys().cloned().collect(),
            files_written,
        };
        Ok(PipelineOutput { tables, result })
    }

    /// Unwrap the `releases` collection, then flatten every configured nested field
    pub fn flatten_source(&self, table: &RecordTable) -> Result<FlattenOutcome> {
        let started = Instant::now();
        let releases = unwrap_collection(table, RELEASES_FIELD)?;
        debug!(
            "Unwrapped {} into {} rows in {:.2}s",
            RELEASES_FIELD,
            releases.len(),
            started.elapsed().as_secs_f64()
        );
        flatten_nested_fields(
            &releases,
            &self.config.nested_fields,
            self.config.prune_policy,
        )
    }

    /// Read the primary and secondary source tables without processing them.
    /// The primary table is required, the secondary one is optional.
    pub fn load_sources(&self) -> Result<(RecordTable, Option<RecordTable>)> {
        let mut tables = load_tables(&self.config.data_dir)?;
        let primary = tables
            .remove(&self.config.source_table)
            .ok_or_else(|| FlattenError::MissingSource(self.config.source_table.clone()))?;
        let secondary = tables.remove(&self.config.secondary_table);
        if secondary.is_none() {
            warn!("Secondary table {} not found", self.config.secondary_table);
        }
        Ok((primary, secondary))
    }

    fn unify(&self, tables: &BTreeMap<String, RecordTable>) -> Result<BTreeMap<String, RecordTable>> {
        let catalog = match &self.config.cpv_table {
            Some(path) => {
                let catalog = CpvCatalog::from_csv_path(path)?;
                info!("Loaded {} CPV codes from {}", catalog.len(), path.display());
                Some(catalog)
            }
            None => None,
        };
        MappingRegistry::for_sources(
            &self.config.source_table,
            &self.config.secondary_table,
            catalog,
        )
        .unify(tables)
    }
}
