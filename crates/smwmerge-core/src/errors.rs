//! Error types for the SIMPL Windows merge core.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SmwError {
    /// A key appeared twice in one record with different values.
    #[error("duplicate conflicting key in record: {key} (had {existing:?}, got {incoming:?})")]
    DuplicateKey {
        key: String,
        existing: String,
        incoming: String,
    },

    /// Attempt to set a key the record never declared.
    #[error("key not defined in record: {key}")]
    MissingKey { key: String },

    #[error("can't open file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration in '{path}': {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T, E = SmwError> = std::result::Result<T, E>;
