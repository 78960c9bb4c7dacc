//! HUMS configuration
//!
//! One TOML file drives every service. All fields have defaults, so an
//! empty file (or no file at all) reproduces the stock on-vehicle layout:
//!
//! ```toml
//! [paths]
//! data_dir = "/home/pi/hums_data"
//! dbc_file = "assets/dbc/CSS-Electronics-11-bit-OBD2-v2.1.dbc"
//!
//! [can]
//! interface = "can0"
//! bitrate = 500000
//!
//! [imu]
//! serial_port = "/dev/esp32_data"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;

/// Identifier written into capture session headers when none is provisioned
pub const UNKNOWN_DEVICE_ID: &str = "UNKNOWN_ID";

/// Complete HUMS configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HumsConfig {
    #[serde(default)]
    pub paths: PathSettings,
    #[serde(default)]
    pub can: CanSettings,
    #[serde(default)]
    pub imu: ImuSettings,
}

impl HumsConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

// =============================================================================
// Paths
// =============================================================================

/// Data and asset locations
///
/// Only `data_dir` is required in practice; the other directories default
/// to fixed sub-paths of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_log_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv_exports_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imu_gps_log_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_log_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_files_log: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id_file: Option<PathBuf>,
    /// Vehicle signal dictionary (DBC)
    #[serde(default = "default_dbc_file")]
    pub dbc_file: PathBuf,
    /// Diagnostic request table (CSV)
    #[serde(default = "default_requests_table")]
    pub requests_table: PathBuf,
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hums_data")
}

fn default_dbc_file() -> PathBuf {
    PathBuf::from("assets/dbc/CSS-Electronics-11-bit-OBD2-v2.1.dbc")
}

fn default_requests_table() -> PathBuf {
    PathBuf::from("assets/config_files/solicitudes.csv")
}

impl Default for PathSettings {
    fn default() -> Self {
        Self::under(default_data_dir())
    }
}

impl PathSettings {
    /// Default layout rooted at `data_dir`
    pub fn under(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            can_log_dir: None,
            csv_exports_dir: None,
            imu_gps_log_dir: None,
            system_log_dir: None,
            processed_files_log: None,
            device_id_file: None,
            dbc_file: default_dbc_file(),
            requests_table: default_requests_table(),
        }
    }

    pub fn can_log_dir(&self) -> PathBuf {
        self.resolve(&self.can_log_dir, "can_logs")
    }

    pub fn csv_exports_dir(&self) -> PathBuf {
        self.resolve(&self.csv_exports_dir, "csv_exports")
    }

    pub fn imu_gps_log_dir(&self) -> PathBuf {
        self.resolve(&self.imu_gps_log_dir, "imu_gps_logs")
    }

    pub fn system_log_dir(&self) -> PathBuf {
        self.resolve(&self.system_log_dir, "system_logs")
    }

    pub fn processed_files_log(&self) -> PathBuf {
        self.resolve(&self.processed_files_log, "processed_files.txt")
    }

    pub fn device_id_file(&self) -> PathBuf {
        self.device_id_file
            .clone()
            .unwrap_or_else(|| self.system_log_dir().join("id.txt"))
    }

    fn resolve(&self, explicit: &Option<PathBuf>, default_name: &str) -> PathBuf {
        explicit
            .clone()
            .unwrap_or_else(|| self.data_dir.join(default_name))
    }

    /// Create every data directory that does not exist yet
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        for dir in [
            self.data_dir.clone(),
            self.can_log_dir(),
            self.csv_exports_dir(),
            self.imu_gps_log_dir(),
            self.system_log_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|source| ConfigError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        info!(data_dir = %self.data_dir.display(), "Data directories ready");
        Ok(())
    }

    /// Read the provisioned device identifier, falling back to [`UNKNOWN_DEVICE_ID`]
    pub fn load_device_id(&self) -> String {
        let path = self.device_id_file();
        match std::fs::read_to_string(&path) {
            Ok(content) if !content.trim().is_empty() => content.trim().to_string(),
            Ok(_) => {
                warn!(path = %path.display(), "Device ID file is empty, using {}", UNKNOWN_DEVICE_ID);
                UNKNOWN_DEVICE_ID.to_string()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Device ID file not readable, using {}", UNKNOWN_DEVICE_ID);
                UNKNOWN_DEVICE_ID.to_string()
            }
        }
    }
}

// =============================================================================
// CAN bus acquisition
// =============================================================================

/// CAN interface and capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanSettings {
    /// CAN interface name (e.g., "can0")
    #[serde(default = "default_interface")]
    pub interface: String,
    /// CAN bus bitrate
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,
    /// Prefix interface commands with sudo
    #[serde(default = "default_true")]
    pub use_sudo: bool,
    /// Passive capture program, invoked as `<program> -L <interface>`
    #[serde(default = "default_capture_program")]
    pub capture_program: String,
    /// How long `stop()` waits for the worker
    #[serde(default = "default_can_stop_timeout")]
    pub stop_timeout_ms: u64,
    /// Grace period between terminating and killing the capture process
    #[serde(default = "default_capture_grace")]
    pub capture_grace_ms: u64,
    /// Fire the VIN/CVN/DTC identification requests
    #[serde(default = "default_true")]
    pub builtin_requests: bool,
}

fn default_interface() -> String {
    "can0".to_string()
}

fn default_bitrate() -> u32 {
    500000
}

fn default_true() -> bool {
    true
}

fn default_capture_program() -> String {
    "candump".to_string()
}

fn default_can_stop_timeout() -> u64 {
    5000
}

fn default_capture_grace() -> u64 {
    2000
}

impl Default for CanSettings {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            bitrate: default_bitrate(),
            use_sudo: true,
            capture_program: default_capture_program(),
            stop_timeout_ms: default_can_stop_timeout(),
            capture_grace_ms: default_capture_grace(),
            builtin_requests: true,
        }
    }
}

// =============================================================================
// Serial IMU/GPS acquisition
// =============================================================================

/// Serial sensor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImuSettings {
    #[serde(default = "default_serial_port")]
    pub serial_port: PathBuf,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Serial read timeout
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Polling interval while the device node is absent
    #[serde(default = "default_absent_retry")]
    pub absent_retry_ms: u64,
    /// Back-off after the device node exists but cannot be opened
    #[serde(default = "default_open_retry")]
    pub open_retry_ms: u64,
    /// How long `stop()` waits for the worker
    #[serde(default = "default_imu_stop_timeout")]
    pub stop_timeout_ms: u64,
}

fn default_serial_port() -> PathBuf {
    PathBuf::from("/dev/esp32_data")
}

fn default_baud_rate() -> u32 {
    115200
}

fn default_read_timeout() -> u64 {
    1000
}

fn default_absent_retry() -> u64 {
    2000
}

fn default_open_retry() -> u64 {
    5000
}

fn default_imu_stop_timeout() -> u64 {
    3000
}

impl Default for ImuSettings {
    fn default() -> Self {
        Self {
            serial_port: default_serial_port(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout(),
            absent_retry_ms: default_absent_retry(),
            open_retry_ms: default_open_retry(),
            stop_timeout_ms: default_imu_stop_timeout(),
        }
    }
}
