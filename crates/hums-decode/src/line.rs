//! Capture log line parsing
//!
//! Accepted frame shapes:
//!
//! ```text
//! (1718000000.123456) can0 7E8#0641050000000000       candump -L
//! (1718000000.123456) can0 7E8 [8] 06 41 05 00 00 00   spaced form
//! ```
//!
//! Any other non-empty line containing whitespace and not starting with `(`
//! is a session marker.

use crate::error::LineError;

/// One classified capture log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureLine<'a> {
    SessionMarker(&'a str),
    Frame(LoggedFrame<'a>),
}

/// Frame fields as written in the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedFrame<'a> {
    pub timestamp: &'a str,
    pub identifier: &'a str,
    pub data: String,
}

impl LoggedFrame<'_> {
    pub fn identifier_value(&self) -> Result<u32, LineError> {
        u32::from_str_radix(self.identifier, 16)
            .map_err(|e| LineError::Malformed(format!("identifier '{}': {}", self.identifier, e)))
    }

    pub fn payload(&self) -> Result<Vec<u8>, LineError> {
        hex::decode(&self.data)
            .map_err(|e| LineError::Malformed(format!("data '{}': {}", self.data, e)))
    }
}

/// Classify one line; `Ok(None)` for blank lines
pub fn parse_line(line: &str) -> Result<Option<CaptureLine<'_>>, LineError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if !line.starts_with('(') {
        if line.contains(char::is_whitespace) {
            return Ok(Some(CaptureLine::SessionMarker(line)));
        }
        return Err(LineError::Malformed(line.to_string()));
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 3 {
        return Err(LineError::Malformed(line.to_string()));
    }
    let timestamp = tokens[0].trim_matches(|c| c == '(' || c == ')');

    let (identifier, data) = match tokens[2].split_once('#') {
        Some((identifier, data)) => (identifier, data.to_string()),
        None if tokens.len() >= 4 => (tokens[2], tokens[4..].concat()),
        None => return Err(LineError::Malformed(line.to_string())),
    };

    Ok(Some(CaptureLine::Frame(LoggedFrame {
        timestamp,
        identifier,
        data,
    })))
}
