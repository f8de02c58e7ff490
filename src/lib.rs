pub mod config;
pub mod constants;
pub mod cpv;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod storage;
pub mod table;

pub use config::{ConfigFile, PipelineConfig};
pub use error::{FlattenError, Result};
pub use pipeline::processing::PrunePolicy;
pub use pipeline::{Pipeline, PipelineOutput, PipelineResult};
pub use table::{ColumnMeta, Record, RecordTable};
