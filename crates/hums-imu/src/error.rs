//! Serial acquisition errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImuError {
    /// Device absent, not openable, or lost
    #[error("Serial connection error: {0}")]
    Connection(String),

    #[error("Malformed sample ({fields} fields, expected {expected}): {line}")]
    MalformedSample {
        fields: usize,
        expected: usize,
        line: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<csv::Error> for ImuError {
    fn from(e: csv::Error) -> Self {
        ImuError::Io(e.into())
    }
}
