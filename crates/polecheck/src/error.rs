use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolecheckError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// Config validation error (bad threshold, empty alias list, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),

    /// The record source could not be opened or read at all.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A caller-supplied reader failed before the first record.
    #[error("cannot read input: {0}")]
    ReadInput(#[source] std::io::Error),

    /// The header row could not be parsed, or a report could not be written.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("report write error: {0}")]
    Write(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PolecheckError>;
