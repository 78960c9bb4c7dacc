//! Bus drivers
//!
//! A driver owns everything that touches the operating system:
//! - bringing the CAN interface up and down
//! - running the passive capture process that writes every frame to a log file
//! - transmitting single request frames
//!
//! [`socketcan::SocketCanDriver`] is the Linux implementation;
//! [`mock::MockBusDriver`] records calls for tests.

pub mod mock;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socketcan;

use std::fs::File;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hums_core::CanSettings;

use crate::error::BusError;
use crate::request::RequestFrame;

/// Operating-system side of CAN acquisition
#[async_trait]
pub trait BusDriver: Send + Sync {
    /// Configure the interface bitrate and set it up
    async fn bring_up(&self, interface: &str, bitrate: u32) -> Result<(), BusError>;

    /// Set the interface down
    async fn bring_down(&self, interface: &str) -> Result<(), BusError>;

    /// Start passive capture of every frame on `interface`, written to `sink`
    ///
    /// Lines use the `(timestamp) interface id#data` log format.
    async fn start_capture(
        &self,
        interface: &str,
        sink: File,
    ) -> Result<Box<dyn CaptureProcess>, BusError>;

    /// Transmit one frame
    async fn send_frame(&self, interface: &str, frame: &RequestFrame) -> Result<(), BusError>;
}

/// A running passive capture
#[async_trait]
pub trait CaptureProcess: Send {
    /// Exit description if the capture has stopped on its own
    fn poll_exit(&mut self) -> Option<String>;

    /// Ask the capture to stop; force it after `grace`
    ///
    /// Calling this on an already stopped capture is a no-op.
    async fn shutdown(&mut self, grace: Duration) -> Result<(), BusError>;
}

/// Create the platform bus driver
pub fn create_driver(settings: &CanSettings) -> Result<Arc<dyn BusDriver>, BusError> {
    #[cfg(all(target_os = "linux", feature = "socketcan"))]
    {
        Ok(Arc::new(socketcan::SocketCanDriver::new(settings)))
    }
    #[cfg(not(all(target_os = "linux", feature = "socketcan")))]
    {
        let _ = settings;
        Err(BusError::Unsupported(
            "SocketCAN requires Linux and the 'socketcan' feature".to_string(),
        ))
    }
}
