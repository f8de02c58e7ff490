use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::constants::{default_nested_fields, BESCHA_SOURCE, TED_SOURCE};
use crate::error::{FlattenError, Result};
use crate::pipeline::processing::PrunePolicy;

/// Settings for one pipeline run. Passed explicitly to every entry point;
/// nothing here is process-wide.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Directory holding one JSON document per source table
    pub data_dir: PathBuf,
    /// Where result tables are written; `None` writes nothing
    pub output_dir: Option<PathBuf>,
    /// Diagnostic logging toggle; off means no log output at all
    pub logging: bool,
    /// Optional directory for a JSON log file
    pub log_dir: Option<PathBuf>,
    /// Table that must exist and gets flattened
    pub source_table: String,
    /// Second source, only used for unification
    pub secondary_table: String,
    /// Nested fields flattened in order
    pub nested_fields: Vec<String>,
    pub prune_policy: PrunePolicy,
    /// Also build the unified tables
    pub unify: bool,
    /// CPV catalog CSV (`CODE`,`DE`) used to label TED notices
    pub cpv_table: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            output_dir: None,
            logging: false,
            log_dir: None,
            source_table: BESCHA_SOURCE.to_string(),
            secondary_table: TED_SOURCE.to_string(),
            nested_fields: default_nested_fields(),
            prune_policy: PrunePolicy::default(),
            unify: false,
            cpv_table: None,
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_nested_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nested_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_prune_policy(mut self, policy: PrunePolicy) -> Self {
        self.prune_policy = policy;
        self
    }

    pub fn with_unify(mut self, unify: bool) -> Self {
        self.unify = unify;
        self
    }

    /// Check the input directory and create the output directory if one is set
    pub fn prepare_directories(&self) -> Result<()> {
        if let Some(output_dir) = &self.output_dir {
            fs::create_dir_all(output_dir)?;
            info!("Output directory created or already exists: {}", output_dir.display());
        }

        if !self.data_dir.is_dir() {
            return Err(FlattenError::InvalidDirectory(self.data_dir.clone()));
        }
        info!("Input directory exists: {}", self.data_dir.display());
        Ok(())
    }
}

impl TryFrom<ConfigFile> for PipelineConfig {
    type Error = FlattenError;

    fn try_from(file: ConfigFile) -> Result<Self> {
        let data_dir = file
            .data_dir
            .ok_or_else(|| FlattenError::Config("The 'data_dir' parameter must be given".into()))?;

        let mut config = PipelineConfig::new(data_dir);
        config.output_dir = file.output_dir;
        config.log_dir = file.log_dir;
        config.cpv_table = file.cpv_table;
        if let Some(logging) = file.logging {
            config.logging = logging;
        }
        if let Some(source) = file.source_table {
            config.source_table = source;
        }
        if let Some(secondary) = file.secondary_table {
            config.secondary_table = secondary;
        }
        if let Some(fields) = file.nested_fields {
            config.nested_fields = fields;
        }
        if let Some(policy) = file.prune_policy {
            config.prune_policy = policy;
        }
        if let Some(unify) = file.unify {
            config.unify = unify;
        }
        Ok(config)
    }
}

/// On-disk TOML form of [`PipelineConfig`]; every key is optional so command
/// line flags can fill in or override values
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub data_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub logging: Option<bool>,
    pub log_dir: Option<PathBuf>,
    pub source_table: Option<String>,
    pub secondary_table: Option<String>,
    pub nested_fields: Option<Vec<String>>,
    pub prune_policy: Option<PrunePolicy>,
    pub unify: Option<bool>,
    pub cpv_table: Option<PathBuf>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            FlattenError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        debug!("Loaded config file {}", path.display());
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
