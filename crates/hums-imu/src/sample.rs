//! Sensor sample lines
//!
//! The sensor board prints one comma-separated line per sample:
//!
//! ```text
//! accel_x,accel_y,accel_z,gyro_x,gyro_y,gyro_z,latitude,longitude
//! ```
//!
//! Values are stored as received; only the field count is validated.

use chrono::{DateTime, Local};

use crate::error::ImuError;

/// Fields per sample: 3 accelerometer, 3 gyroscope, 2 position
pub const SAMPLE_FIELDS: usize = 8;

/// Column names of the time-series file
pub const COLUMNS: [&str; SAMPLE_FIELDS + 1] = [
    "timestamp",
    "accel_x_m_s2",
    "accel_y_m_s2",
    "accel_z_m_s2",
    "gyro_x_rad_s",
    "gyro_y_rad_s",
    "gyro_z_rad_s",
    "latitude",
    "longitude",
];

/// Millisecond-precision row timestamp
pub fn row_timestamp(at: &DateTime<Local>) -> String {
    at.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImuSample {
    fields: Vec<String>,
}

impl ImuSample {
    pub fn parse(line: &str) -> Result<Self, ImuError> {
        let fields: Vec<String> = line.split(',').map(|f| f.trim().to_string()).collect();
        if fields.len() != SAMPLE_FIELDS {
            return Err(ImuError::MalformedSample {
                fields: fields.len(),
                expected: SAMPLE_FIELDS,
                line: line.to_string(),
            });
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Output row: timestamp followed by the sample fields
    pub fn row<'a>(&'a self, timestamp: &'a str) -> Vec<&'a str> {
        std::iter::once(timestamp)
            .chain(self.fields.iter().map(String::as_str))
            .collect()
    }
}
