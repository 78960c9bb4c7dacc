//! hums-core - shared building blocks for the HUMS vehicle monitor
//!
//! The acquisition services and the batch decoder all share:
//!
//! - [`config`]: one TOML file describing data paths, the CAN interface and the serial sensor
//! - [`clock`]: an injectable wall clock so date-driven behavior is testable
//! - [`rotation`]: daily files with numbered session headers

pub mod clock;
pub mod config;
pub mod error;
pub mod rotation;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{CanSettings, HumsConfig, ImuSettings, PathSettings};
pub use error::ConfigError;
