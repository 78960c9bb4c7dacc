//! Signal dictionary
//!
//! Maps CAN identifiers to message names and decodes payloads into named
//! physical values. The production dictionary is a DBC file.

use std::fmt;
use std::path::Path;

use tracing::info;

use crate::error::DictionaryError;

/// One decoded signal
#[derive(Debug, Clone, PartialEq)]
pub struct SignalValue {
    pub name: String,
    pub value: f64,
}

/// `name: value`
impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// Render decoded signals as `name: value, name: value, ...`
pub fn render_signals(signals: &[SignalValue]) -> String {
    signals
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Identifier to message lookup and payload decoding
pub trait SignalDictionary {
    fn message_name(&self, id: u32) -> Option<&str>;

    fn decode(&self, id: u32, payload: &[u8]) -> Result<Vec<SignalValue>, DictionaryError>;
}

/// DBC-backed signal dictionary (11-bit identifiers)
pub struct DbcDictionary {
    dbc: dbc_rs::Dbc,
}

impl DbcDictionary {
    /// Load and parse a DBC file
    pub fn load(path: &Path) -> Result<Self, DictionaryError> {
        let content = std::fs::read_to_string(path).map_err(|e| DictionaryError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let dbc = dbc_rs::Dbc::parse(&content).map_err(|e| DictionaryError::Load {
            path: path.to_path_buf(),
            reason: format!("{:?}", e),
        })?;
        info!(
            path = %path.display(),
            messages = dbc.messages().len(),
            "Signal dictionary loaded"
        );
        Ok(Self { dbc })
    }

    /// Parse DBC text
    pub fn parse(content: &str) -> Result<Self, DictionaryError> {
        let dbc = dbc_rs::Dbc::parse(content).map_err(|e| DictionaryError::Load {
            path: "<inline>".into(),
            reason: format!("{:?}", e),
        })?;
        Ok(Self { dbc })
    }
}

impl SignalDictionary for DbcDictionary {
    fn message_name(&self, id: u32) -> Option<&str> {
        self.dbc.messages().find_by_id(id).map(|m| m.name())
    }

    fn decode(&self, id: u32, payload: &[u8]) -> Result<Vec<SignalValue>, DictionaryError> {
        if self.message_name(id).is_none() {
            return Err(DictionaryError::UnknownMessage(id));
        }
        let decoded = self
            .dbc
            .decode(id, payload, false)
            .map_err(|e| DictionaryError::Decode {
                id,
                reason: format!("{:?}", e),
            })?;

        Ok(decoded
            .iter()
            .map(|signal| SignalValue {
                name: signal.name.to_string(),
                value: signal.value,
            })
            .collect())
    }
}
