//! hums-can - CAN bus acquisition
//!
//! [`BusAcquisitionService`] owns one CAN interface for the lifetime of an
//! acquisition session. It brings the interface up, captures every frame to
//! a daily log (`canlog_YYYYMMDD.log`) and transmits diagnostic requests:
//! the periodic/one-shot requests of the request table plus a fixed
//! VIN/CVN/DTC identification sequence.
//!
//! Operating-system access goes through the [`BusDriver`] trait so the
//! service can run against [`driver::mock::MockBusDriver`] in tests.

pub mod driver;
pub mod error;
pub mod request;
pub mod scheduler;
pub mod service;

pub use driver::{create_driver, BusDriver, CaptureProcess};
pub use error::{BusError, RequestTableError};
pub use request::{load_request_table, parse_request_table, DiagnosticRequest, RequestFrame};
pub use scheduler::{BuiltinPlan, BuiltinRequest, RequestScheduler};
pub use service::{
    capture_log_path, capture_session_header, AcquisitionConfig, BusAcquisitionService,
};
