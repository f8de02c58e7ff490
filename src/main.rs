use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use tender_tables::logging::init_logging;
use tender_tables::{ConfigFile, Pipeline, PipelineConfig, PrunePolicy};

#[derive(Parser)]
#[command(name = "tender_tables")]
#[command(about = "Flattens nested procurement releases into columnar tables")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Flatten the source table's nested fields
    Flatten {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Flatten, then map both sources onto the unified column set
    Unify {
        #[command(flatten)]
        run: RunArgs,
        /// CPV catalog CSV with CODE and DE columns
        #[arg(long)]
        cpv_table: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// TOML config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory with one JSON document per source table
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Write result tables here (nothing is written without it)
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Enable diagnostic logging
    #[arg(long, short)]
    verbose: bool,
    /// Also write JSON logs to a daily file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
    /// Name of the source table to flatten
    #[arg(long)]
    source_table: Option<String>,
    /// Nested fields to flatten, in order (comma-separated)
    #[arg(long, value_delimiter = ',')]
    fields: Option<Vec<String>>,
    /// Prune carried columns by name pattern instead of by column origin
    #[arg(long)]
    legacy_pruning: bool,
    /// Print the run summary as JSON on stdout
    #[arg(long)]
    summary: bool,
}

impl RunArgs {
    /// Merge the config file (if any) with the command line flags
    fn into_config(self, unify: bool, cpv_table: Option<PathBuf>) -> anyhow::Result<PipelineConfig> {
        let mut file = match &self.config {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::default(),
        };

        if self.data_dir.is_some() {
            file.data_dir = self.data_dir;
        }
        if self.output_dir.is_some() {
            file.output_dir = self.output_dir;
        }
        if self.log_dir.is_some() {
            file.log_dir = self.log_dir;
        }
        if self.source_table.is_some() {
            file.source_table = self.source_table;
        }
        if self.fields.is_some() {
            file.nested_fields = self.fields;
        }
        if cpv_table.is_some() {
            file.cpv_table = cpv_table;
        }
        if self.verbose {
            file.logging = Some(true);
        }
        if self.legacy_pruning {
            file.prune_policy = Some(PrunePolicy::NamePattern);
        }
        if unify {
            file.unify = Some(true);
        }

        PipelineConfig::try_from(file).context("Invalid configuration")
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config, summary) = match cli.command {
        Commands::Flatten { run } => {
            let summary = run.summary;
            (run.into_config(false, None)?, summary)
        }
        Commands::Unify { run, cpv_table } => {
            let summary = run.summary;
            (run.into_config(true, cpv_table)?, summary)
        }
    };

    let _guard = init_logging(config.logging, config.log_dir.as_deref())?;

    let span = tracing::info_span!("Running pipeline", source = %config.source_table);
    let _enter = span.enter();

    info!("Starting pipeline");
    let output = Pipeline::new(config).run().map_err(|e| {
        error!("Pipeline failed: {}", e);
        e
    })?;
    info!(
        "Pipeline finished: {} tables, {} files written",
        output.result.tables.len(),
        output.result.files_written.len()
    );

    if summary {
        println!("{}", serde_json::to_string_pretty(&output.result)?);
    }
    Ok(())
}
