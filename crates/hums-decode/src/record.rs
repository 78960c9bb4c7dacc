//! Decoded records and the record file layout

use std::io::{self, Write};

/// First line of every decoded record file
pub const HEADER: &str = "Timestamp | CAN ID | Message Name | Decoded Data";

/// Message-name column of session marker rows
pub const SESSION_LABEL: &str = "SESIÓN:";

/// Message name of frames neither extracted nor decodable
pub const UNKNOWN_MESSAGE: &str = "Unknown";

/// One output row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedRecord {
    /// Start of a capture session inside the log
    Session { marker: String },
    Frame {
        timestamp: String,
        identifier: String,
        message_name: String,
        text: String,
    },
}

impl DecodedRecord {
    /// Fallback record: raw payload as uppercase hex
    pub fn unknown(timestamp: &str, identifier: &str, payload: &[u8]) -> Self {
        DecodedRecord::Frame {
            timestamp: timestamp.to_string(),
            identifier: identifier.to_string(),
            message_name: UNKNOWN_MESSAGE.to_string(),
            text: hex::encode_upper(payload),
        }
    }

    pub fn to_row(&self) -> String {
        match self {
            DecodedRecord::Session { marker } => format!(" | | {} | {}", SESSION_LABEL, marker),
            DecodedRecord::Frame {
                timestamp,
                identifier,
                message_name,
                text,
            } => format!(
                "{} | {} | {} | {}",
                timestamp, identifier, message_name, text
            ),
        }
    }
}

/// Write the header and one row per record
pub fn write_records<W: Write>(mut writer: W, records: &[DecodedRecord]) -> io::Result<()> {
    writeln!(writer, "{}", HEADER)?;
    for record in records {
        writeln!(writer, "{}", record.to_row())?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_layout() {
        let records = vec![
            DecodedRecord::Session {
                marker: "20240610_083005 HUMS-0042".to_string(),
            },
            DecodedRecord::Frame {
                timestamp: "1718000000.1".to_string(),
                identifier: "7E8".to_string(),
                message_name: "VIN".to_string(),
                text: "1HGCM82633A123456".to_string(),
            },
            DecodedRecord::unknown("1718000000.2", "123", &[0xde, 0xad]),
        ];

        let mut out = Vec::new();
        write_records(&mut out, &records).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Timestamp | CAN ID | Message Name | Decoded Data\n \
| | SESIÓN: | 20240610_083005 HUMS-0042\n\
1718000000.1 | 7E8 | VIN | 1HGCM82633A123456\n\
1718000000.2 | 123 | Unknown | DEAD\n"
        );
    }
}
