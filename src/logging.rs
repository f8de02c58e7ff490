use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{FlattenError, Result};

const DEFAULT_DIRECTIVE: &str = "tender_tables=info";
const LOG_FILE_NAME: &str = "tender_tables.log";

/// Initializes console logging, plus a daily JSON log file when `log_dir` is set.
///
/// Nothing is installed when `enabled` is false, so a disabled run produces
/// no log output at all. Keep the returned guard alive until exit so the
/// file writer flushes.
pub fn init_logging(enabled: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    if !enabled {
        return Ok(None);
    }

    let directive = DEFAULT_DIRECTIVE
        .parse()
        .map_err(|e| FlattenError::Config(format!("Invalid log directive: {e}")))?;
    let filter = EnvFilter::from_default_env().add_directive(directive);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            (Some(fmt::layer().json().with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    // Console output goes to stderr so stdout stays free for results
    let console_layer = fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| FlattenError::Config(format!("Logging already initialized: {e}")))?;

    Ok(guard)
}
