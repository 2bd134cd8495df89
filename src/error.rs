//! Error types for chatstate.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error(
        "No such file {}. Call check() before get() to ensure record {id} exists.",
        .path.display()
    )]
    NotFound { id: i64, path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Flush task cancelled")]
    Cancelled,

    #[error("Flush task error: {0}")]
    Task(String),
}

impl Error {
    /// True for the caller-contract violation raised by `get` on an unknown id.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
