//! Mock bus driver for testing

use std::fs::File;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{BusDriver, CaptureProcess};
use crate::error::BusError;
use crate::request::RequestFrame;

/// Driver call recorded by [`MockBusDriver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    BringUp { interface: String, bitrate: u32 },
    BringDown { interface: String },
    CaptureStarted { interface: String },
    CaptureStopped,
    Sent(RequestFrame),
}

/// Mock bus driver
///
/// The fake capture writes the configured traffic lines to its sink when it
/// starts, the way a capture tool would write received frames.
#[derive(Default)]
pub struct MockBusDriver {
    events: Arc<Mutex<Vec<DriverEvent>>>,
    traffic: Mutex<Vec<String>>,
    fail_bring_up: AtomicBool,
    fail_send: AtomicBool,
    capture_exited: Arc<AtomicBool>,
    fail_capture_stop: Arc<AtomicBool>,
    capture_stop_delay: Arc<Mutex<Duration>>,
}

impl MockBusDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `bring_up` fail (simulates a missing interface)
    pub fn set_fail_bring_up(&self, fail: bool) {
        self.fail_bring_up.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    /// Lines each capture writes to its log when started
    pub fn set_capture_traffic(&self, lines: Vec<String>) {
        *self.traffic.lock() = lines;
    }

    /// Simulate the capture process dying on its own
    pub fn set_capture_exited(&self, exited: bool) {
        self.capture_exited.store(exited, Ordering::SeqCst);
    }

    /// Make stopping a capture fail
    pub fn set_fail_capture_stop(&self, fail: bool) {
        self.fail_capture_stop.store(fail, Ordering::SeqCst);
    }

    /// Time a capture takes to stop (simulates a hung capture tool)
    pub fn set_capture_stop_delay(&self, delay: Duration) {
        *self.capture_stop_delay.lock() = delay;
    }

    pub fn events(&self) -> Vec<DriverEvent> {
        self.events.lock().clone()
    }

    pub fn sent_frames(&self) -> Vec<RequestFrame> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                DriverEvent::Sent(frame) => Some(frame.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&DriverEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    fn record(&self, event: DriverEvent) {
        self.events.lock().push(event);
    }
}

#[async_trait]
impl BusDriver for MockBusDriver {
    async fn bring_up(&self, interface: &str, bitrate: u32) -> Result<(), BusError> {
        if self.fail_bring_up.load(Ordering::SeqCst) {
            return Err(BusError::Interface(format!(
                "Cannot find device \"{}\"",
                interface
            )));
        }
        self.record(DriverEvent::BringUp {
            interface: interface.to_string(),
            bitrate,
        });
        Ok(())
    }

    async fn bring_down(&self, interface: &str) -> Result<(), BusError> {
        self.record(DriverEvent::BringDown {
            interface: interface.to_string(),
        });
        Ok(())
    }

    async fn start_capture(
        &self,
        interface: &str,
        mut sink: File,
    ) -> Result<Box<dyn CaptureProcess>, BusError> {
        for line in self.traffic.lock().iter() {
            writeln!(sink, "{}", line)?;
        }
        sink.flush()?;

        self.record(DriverEvent::CaptureStarted {
            interface: interface.to_string(),
        });
        Ok(Box::new(MockCapture {
            events: self.events.clone(),
            exited: self.capture_exited.clone(),
            fail_stop: self.fail_capture_stop.clone(),
            stop_delay: self.capture_stop_delay.clone(),
            stopped: false,
        }))
    }

    async fn send_frame(&self, _interface: &str, frame: &RequestFrame) -> Result<(), BusError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(BusError::Transmit("No buffer space available".to_string()));
        }
        self.record(DriverEvent::Sent(frame.clone()));
        Ok(())
    }
}

struct MockCapture {
    events: Arc<Mutex<Vec<DriverEvent>>>,
    exited: Arc<AtomicBool>,
    fail_stop: Arc<AtomicBool>,
    stop_delay: Arc<Mutex<Duration>>,
    stopped: bool,
}

#[async_trait]
impl CaptureProcess for MockCapture {
    fn poll_exit(&mut self) -> Option<String> {
        if self.exited.load(Ordering::SeqCst) {
            Some("exit status: 1".to_string())
        } else {
            None
        }
    }

    async fn shutdown(&mut self, _grace: Duration) -> Result<(), BusError> {
        let delay = *self.stop_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(BusError::Capture("Operation not permitted".to_string()));
        }
        if !self.stopped {
            self.stopped = true;
            self.events.lock().push(DriverEvent::CaptureStopped);
        }
        Ok(())
    }
}
