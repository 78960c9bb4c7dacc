//! OBD-II DTC (Diagnostic Trouble Code) decoding for mode 0x03/0x07 responses
//!
//! Each code is two bytes. The top two bits of the first byte select the
//! system letter; the remaining 14 bits render as four hex digits.

use crate::response_mode;

/// Text reported when the ECU answers with a DTC count of zero
pub const NO_CODES: &str = "No codes";

/// DTC category based on the first character of the DTC code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtcCategory {
    /// P codes - Powertrain (engine, transmission)
    Powertrain,
    /// C codes - Chassis (ABS, suspension)
    Chassis,
    /// B codes - Body (airbags, climate control)
    Body,
    /// U codes - Network (communication)
    Network,
}

impl DtcCategory {
    /// Get category from the first DTC byte
    pub fn from_high_byte(high_byte: u8) -> Self {
        match (high_byte >> 6) & 0x03 {
            0 => DtcCategory::Powertrain,
            1 => DtcCategory::Chassis,
            2 => DtcCategory::Body,
            _ => DtcCategory::Network,
        }
    }

    /// Get category prefix character
    pub fn prefix(&self) -> char {
        match self {
            DtcCategory::Powertrain => 'P',
            DtcCategory::Chassis => 'C',
            DtcCategory::Body => 'B',
            DtcCategory::Network => 'U',
        }
    }
}

/// Which DTC list a response carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtcMode {
    /// Mode 0x03 - confirmed codes
    Stored,
    /// Mode 0x07 - codes detected during the current or last drive cycle
    Pending,
}

impl DtcMode {
    pub fn from_response_mode(mode: u8) -> Option<Self> {
        match mode {
            response_mode::STORED_DTC => Some(DtcMode::Stored),
            response_mode::PENDING_DTC => Some(DtcMode::Pending),
            _ => None,
        }
    }

    pub fn response_mode(&self) -> u8 {
        match self {
            DtcMode::Stored => response_mode::STORED_DTC,
            DtcMode::Pending => response_mode::PENDING_DTC,
        }
    }

    /// Record label used in decoded output
    pub fn label(&self) -> &'static str {
        match self {
            DtcMode::Stored => "DTC Almacenados",
            DtcMode::Pending => "DTC Pendientes",
        }
    }
}

/// A two-byte OBD-II trouble code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObdDtc {
    pub high: u8,
    pub low: u8,
}

impl ObdDtc {
    pub fn new(high: u8, low: u8) -> Self {
        Self { high, low }
    }

    pub fn category(&self) -> DtcCategory {
        DtcCategory::from_high_byte(self.high)
    }

    /// `0x0000` pads unused slots in a response
    pub fn is_padding(&self) -> bool {
        self.high == 0 && self.low == 0
    }

    /// Standard code string (e.g., P0133, C0420, U0100)
    pub fn to_code_string(&self) -> String {
        format!(
            "{}{:02X}{:02X}",
            self.category().prefix(),
            self.high & 0x3F,
            self.low
        )
    }
}

/// Parsed mode 0x03/0x07 response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtcReport {
    pub mode: DtcMode,
    /// Count byte as sent by the ECU
    pub reported_count: u8,
    /// Codes present in the frame, padding removed
    pub codes: Vec<ObdDtc>,
}

impl DtcReport {
    /// Parse a single-frame DTC response: `[PCI] [mode] [count] {[hi] [lo]}*`
    ///
    /// Returns `None` when the payload is not a DTC response at all. Codes
    /// beyond the end of the payload are silently absent.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < 3 {
            return None;
        }
        let mode = DtcMode::from_response_mode(payload[1])?;
        let reported_count = payload[2];

        let end = payload.len().min(3 + usize::from(reported_count) * 2);
        let codes = payload[3..end]
            .chunks_exact(2)
            .map(|pair| ObdDtc::new(pair[0], pair[1]))
            .filter(|dtc| !dtc.is_padding())
            .collect();

        Some(Self {
            mode,
            reported_count,
            codes,
        })
    }

    /// Human-readable text: comma-joined codes or [`NO_CODES`]
    pub fn text(&self) -> String {
        if self.reported_count == 0 {
            return NO_CODES.to_string();
        }
        self.codes
            .iter()
            .map(ObdDtc::to_code_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}
