//! Diagnostic requests and the request table
//!
//! The table is a CSV file with one request per row:
//!
//! ```text
//! ID,Datos,Frecuencia,Disparo,Disparo Único
//! 7DF,02010C0000000000,1000,5000,0
//! 7DF,0201A60000000000,0,10000,1
//! ```
//!
//! `ID` is the 11-bit identifier in hex, `Datos` the payload in hex,
//! `Frecuencia` the period in ms, `Disparo` the delay before the first
//! transmission in ms and `Disparo Único` marks one-shot requests.

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::RequestTableError;

/// Highest 11-bit identifier
pub const MAX_STANDARD_ID: u16 = 0x7FF;

/// Classic CAN payload limit
pub const MAX_PAYLOAD_LEN: usize = 8;

/// One frame to transmit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub identifier: u16,
    pub payload: Vec<u8>,
}

impl RequestFrame {
    pub fn new(identifier: u16, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            identifier,
            payload: payload.into(),
        }
    }

    /// Build from hex strings (e.g., "7DF", "0209020000000000")
    pub fn from_hex(identifier: &str, payload: &str) -> Result<Self, RequestTableError> {
        let identifier = parse_standard_id(identifier)?;
        let payload = hex::decode(payload.trim()).map_err(|e| {
            RequestTableError::InvalidRequest(format!("Invalid payload '{}': {}", payload, e))
        })?;
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(RequestTableError::InvalidRequest(format!(
                "Payload of {} bytes exceeds {} bytes",
                payload.len(),
                MAX_PAYLOAD_LEN
            )));
        }
        Ok(Self::new(identifier, payload))
    }
}

/// `7DF#0209020000000000`, the `cansend` notation
impl fmt::Display for RequestFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:03X}#{}",
            self.identifier,
            hex::encode_upper(&self.payload)
        )
    }
}

/// Parse an 11-bit identifier from hex (with or without 0x prefix)
fn parse_standard_id(s: &str) -> Result<u16, RequestTableError> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);

    let id = u16::from_str_radix(digits, 16)
        .map_err(|e| RequestTableError::InvalidRequest(format!("Invalid CAN ID '{}': {}", s, e)))?;
    if id > MAX_STANDARD_ID {
        return Err(RequestTableError::InvalidRequest(format!(
            "CAN ID 0x{:X} is not an 11-bit identifier",
            id
        )));
    }
    Ok(id)
}

/// A configured request, immutable for the lifetime of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRequest {
    pub frame: RequestFrame,
    /// Interval between transmissions; ignored for one-shot requests
    pub period: Duration,
    /// Delay from acquisition start to the first transmission
    pub trigger_delay: Duration,
    pub one_shot: bool,
}

impl DiagnosticRequest {
    pub fn periodic(frame: RequestFrame, trigger_delay: Duration, period: Duration) -> Self {
        Self {
            frame,
            period,
            trigger_delay,
            one_shot: false,
        }
    }

    pub fn one_shot(frame: RequestFrame, trigger_delay: Duration) -> Self {
        Self {
            frame,
            period: Duration::ZERO,
            trigger_delay,
            one_shot: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RequestRow {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Datos")]
    data: String,
    #[serde(rename = "Frecuencia")]
    period_ms: u64,
    #[serde(rename = "Disparo")]
    trigger_ms: u64,
    #[serde(rename = "Disparo Único")]
    one_shot: u8,
}

impl TryFrom<RequestRow> for DiagnosticRequest {
    type Error = RequestTableError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        Ok(Self {
            frame: RequestFrame::from_hex(&row.id, &row.data)?,
            period: Duration::from_millis(row.period_ms),
            trigger_delay: Duration::from_millis(row.trigger_ms),
            one_shot: row.one_shot != 0,
        })
    }
}

/// Parse a request table; rows that do not describe a valid request are skipped
pub fn parse_request_table<R: Read>(
    reader: R,
) -> Result<Vec<DiagnosticRequest>, RequestTableError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut requests = Vec::new();
    for (index, row) in reader.deserialize::<RequestRow>().enumerate() {
        let row_number = index + 2;
        let parsed = row
            .map_err(RequestTableError::from)
            .and_then(DiagnosticRequest::try_from);
        match parsed {
            Ok(request) => requests.push(request),
            Err(e) => warn!(row = row_number, error = %e, "Skipping request table row"),
        }
    }
    Ok(requests)
}

/// Load the request table from a CSV file
pub fn load_request_table(path: &Path) -> Result<Vec<DiagnosticRequest>, RequestTableError> {
    let file = std::fs::File::open(path)?;
    let requests = parse_request_table(file)?;
    info!(count = requests.len(), path = %path.display(), "Loaded diagnostic requests");
    Ok(requests)
}
