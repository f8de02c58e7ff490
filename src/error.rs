use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlattenError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Input directory does not exist: {}", .0.display())]
    InvalidDirectory(PathBuf),

    #[error("Missing required source table: {0}")]
    MissingSource(String),

    #[error("Column '{column}' not found in table")]
    MissingColumn { column: String },
}

impl FlattenError {
    pub fn missing_column(column: impl Into<String>) -> Self {
        FlattenError::MissingColumn {
            column: column.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FlattenError>;
