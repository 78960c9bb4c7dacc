//! Decoding errors

use std::path::PathBuf;

use thiserror::Error;

/// Signal dictionary errors
#[derive(Debug, Error)]
pub enum DictionaryError {
    /// Dictionary file missing or not parseable
    #[error("Cannot load signal dictionary {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("Message 0x{0:X} not in dictionary")]
    UnknownMessage(u32),

    /// Payload does not match the message layout
    #[error("Cannot decode message 0x{id:X}: {reason}")]
    Decode { id: u32, reason: String },
}

/// Capture log line errors
#[derive(Debug, Error)]
pub enum LineError {
    #[error("Malformed capture line: {0}")]
    Malformed(String),
}

/// Batch pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Fatal for a whole run
    #[error(transparent)]
    DictionaryLoad(DictionaryError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Processed-file ledger {path}: {source}")]
    Ledger {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
