use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AffordError {
    #[error("Missing source file: {}", .0.display())]
    MissingSourceFile(PathBuf),

    #[error("Schema mismatch in {table} table: {message}")]
    Schema { table: &'static str, message: String },

    #[error("Unrecognized state: '{0}'")]
    UnresolvedState(String),

    #[error("Unknown job title: '{0}'")]
    UnknownJob(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to persist cache file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

pub type Result<T> = std::result::Result<T, AffordError>;
