//! hums-imu - serial IMU/GPS acquisition
//!
//! Reads one comma-separated sample per line from the sensor board and
//! appends it, timestamped, to `<imu_gps_logs>/YYYY/MM/YYYYMMDD_IMU_GPS_DATA.csv`.
//! Each connection opens a numbered session in the daily file.

pub mod connector;
pub mod error;
pub mod sample;
pub mod service;

pub use connector::{LineAssembler, SerialConnector, SerialPortConnector};
pub use error::ImuError;
pub use sample::{ImuSample, COLUMNS, SAMPLE_FIELDS};
pub use service::{sample_log_path, ImuAcquisitionService, ImuConfig};
