//! CAN acquisition service
//!
//! A background task that:
//! 1. brings the interface up (the session aborts if this fails)
//! 2. opens today's capture log and writes the session header
//! 3. starts passive capture into it
//! 4. transmits scheduled requests until stopped, rotating the log when the
//!    date changes
//! 5. stops the capture and brings the interface down

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate};
use hums_core::rotation::{date_stamp, DailyFile};
use hums_core::{Clock, HumsConfig, SystemClock};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::driver::{BusDriver, CaptureProcess};
use crate::error::BusError;
use crate::request::{load_request_table, DiagnosticRequest, RequestFrame};
use crate::scheduler::{BuiltinPlan, RequestScheduler};

/// Capture log path for a given date: `<dir>/canlog_YYYYMMDD.log`
pub fn capture_log_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("canlog_{}.log", date_stamp(date)))
}

/// Session header line: `YYYYMMDD_HHMMSS <device id>`
pub fn capture_session_header(at: &DateTime<Local>, device_id: &str) -> String {
    format!("{} {}", at.format("%Y%m%d_%H%M%S"), device_id)
}

/// Settings for one acquisition service
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    pub interface: String,
    pub bitrate: u32,
    pub capture_dir: PathBuf,
    pub device_id: String,
    pub requests: Vec<DiagnosticRequest>,
    pub builtins: BuiltinPlan,
    /// How long `stop()` waits for the worker before aborting it
    pub stop_timeout: Duration,
    pub capture_grace: Duration,
    /// Upper bound on the worker's sleep between housekeeping checks
    pub housekeeping_interval: Duration,
}

impl AcquisitionConfig {
    pub fn new(interface: impl Into<String>, capture_dir: impl Into<PathBuf>) -> Self {
        Self {
            interface: interface.into(),
            bitrate: 500_000,
            capture_dir: capture_dir.into(),
            device_id: hums_core::config::UNKNOWN_DEVICE_ID.to_string(),
            requests: Vec::new(),
            builtins: BuiltinPlan::none(),
            stop_timeout: Duration::from_secs(5),
            capture_grace: Duration::from_secs(2),
            housekeeping_interval: Duration::from_millis(250),
        }
    }

    /// Build from the HUMS configuration
    ///
    /// Reads the device identifier and the request table. A missing or
    /// unreadable table is logged and leaves only the built-in requests.
    pub fn from_settings(config: &HumsConfig) -> Self {
        let requests = match load_request_table(&config.paths.requests_table) {
            Ok(requests) => requests,
            Err(e) => {
                error!(
                    path = %config.paths.requests_table.display(),
                    error = %e,
                    "Request table not loaded, only built-in requests will be sent"
                );
                Vec::new()
            }
        };

        Self {
            interface: config.can.interface.clone(),
            bitrate: config.can.bitrate,
            capture_dir: config.paths.can_log_dir(),
            device_id: config.paths.load_device_id(),
            requests,
            builtins: if config.can.builtin_requests {
                BuiltinPlan::obd_identification()
            } else {
                BuiltinPlan::none()
            },
            stop_timeout: Duration::from_millis(config.can.stop_timeout_ms),
            capture_grace: Duration::from_millis(config.can.capture_grace_ms),
            housekeeping_interval: Duration::from_millis(250),
        }
    }
}

struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// CAN acquisition service handle
pub struct BusAcquisitionService {
    config: Arc<AcquisitionConfig>,
    driver: Arc<dyn BusDriver>,
    clock: Arc<dyn Clock>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<Worker>>,
}

impl BusAcquisitionService {
    pub fn new(config: AcquisitionConfig, driver: Arc<dyn BusDriver>) -> Self {
        Self::with_clock(config, driver, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: AcquisitionConfig,
        driver: Arc<dyn BusDriver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            driver,
            clock,
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Whether the worker is active
    ///
    /// Becomes false on its own when bring-up fails.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start acquisition in the background; no-op if already running
    pub async fn start(&self) {
        let mut worker = self.worker.lock().await;
        if self.is_running() {
            warn!(interface = %self.config.interface, "CAN acquisition already running");
            return;
        }
        if let Some(previous) = worker.take() {
            // Worker that ended on its own (e.g., failed bring-up)
            let _ = previous.handle.await;
        }

        self.running.store(true, Ordering::SeqCst);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let session = AcquisitionSession {
            config: self.config.clone(),
            driver: self.driver.clone(),
            clock: self.clock.clone(),
            running: self.running.clone(),
        };
        let handle = tokio::spawn(session.run(shutdown_rx));

        *worker = Some(Worker {
            shutdown: shutdown_tx,
            handle,
        });
        info!(interface = %self.config.interface, "CAN acquisition started");
    }

    /// Stop acquisition and wait for cleanup; no-op if not running
    pub async fn stop(&self) {
        let Some(mut worker) = self.worker.lock().await.take() else {
            warn!(interface = %self.config.interface, "CAN acquisition not running");
            return;
        };

        let _ = worker.shutdown.send(true);
        match tokio::time::timeout(self.config.stop_timeout, &mut worker.handle).await {
            Ok(Ok(())) => info!(interface = %self.config.interface, "CAN acquisition stopped"),
            Ok(Err(e)) => error!(error = %e, "CAN acquisition task failed"),
            Err(_) => {
                error!(
                    timeout_ms = self.config.stop_timeout.as_millis() as u64,
                    "CAN acquisition did not stop in time, aborting"
                );
                worker.handle.abort();
                if let Err(e) = self.driver.bring_down(&self.config.interface).await {
                    error!(
                        interface = %self.config.interface,
                        error = %e,
                        "Failed to bring down CAN interface"
                    );
                }
            }
        }
        self.running.store(false, Ordering::SeqCst);
    }

    /// Run the down, configure, up sequence on the configured interface
    ///
    /// Safe to call when the interface is already down.
    pub async fn bring_interface_up(&self) -> Result<(), BusError> {
        self.driver
            .bring_up(&self.config.interface, self.config.bitrate)
            .await
    }

    /// Transmit one frame outside the schedule; failures are logged
    pub async fn send_request(&self, frame: &RequestFrame) {
        transmit(self.driver.as_ref(), &self.config.interface, frame).await;
    }
}

async fn transmit(driver: &dyn BusDriver, interface: &str, frame: &RequestFrame) {
    match driver.send_frame(interface, frame).await {
        Ok(()) => debug!(interface, frame = %frame, "Request sent"),
        Err(e) => warn!(interface, frame = %frame, error = %e, "Request not sent"),
    }
}

/// Capture log plus the process writing into it
struct ActiveCapture {
    file: DailyFile,
    process: Box<dyn CaptureProcess>,
    exit_reported: bool,
}

struct AcquisitionSession {
    config: Arc<AcquisitionConfig>,
    driver: Arc<dyn BusDriver>,
    clock: Arc<dyn Clock>,
    running: Arc<AtomicBool>,
}

impl AcquisitionSession {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let interface = self.config.interface.as_str();

        if let Err(e) = self.driver.bring_up(interface, self.config.bitrate).await {
            error!(interface, error = %e, "Failed to bring up CAN interface, acquisition aborted");
            self.running.store(false, Ordering::SeqCst);
            return;
        }

        if let Err(e) = self.acquire(&mut shutdown).await {
            error!(interface, error = %e, "CAN acquisition failed");
        }

        if let Err(e) = self.driver.bring_down(interface).await {
            error!(interface, error = %e, "Failed to bring down CAN interface");
        }
        self.running.store(false, Ordering::SeqCst);
    }

    async fn acquire(&self, shutdown: &mut watch::Receiver<bool>) -> Result<(), BusError> {
        let mut capture = self.open_capture().await?;
        let started = Instant::now();
        let mut scheduler =
            RequestScheduler::new(self.config.requests.clone(), self.config.builtins.clone());
        let mut rotation_failed_on: Option<NaiveDate> = None;

        loop {
            if *shutdown.borrow() {
                break;
            }

            for frame in scheduler.due(started.elapsed()) {
                transmit(self.driver.as_ref(), &self.config.interface, &frame).await;
            }

            let today = self.clock.today();
            if !capture.file.is_current(today) && rotation_failed_on != Some(today) {
                match self.rotate(&mut capture).await {
                    Ok(()) => rotation_failed_on = None,
                    Err(e) => {
                        error!(error = %e, "Capture log rotation failed, keeping previous log");
                        rotation_failed_on = Some(today);
                    }
                }
            }

            if !capture.exit_reported {
                if let Some(status) = capture.process.poll_exit() {
                    error!(
                        interface = %self.config.interface,
                        %status,
                        "Capture process exited, frames are no longer logged"
                    );
                    capture.exit_reported = true;
                }
            }

            let wait = scheduler
                .next_deadline()
                .map(|deadline| deadline.saturating_sub(started.elapsed()))
                .unwrap_or(self.config.housekeeping_interval)
                .min(self.config.housekeeping_interval);

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }

        capture.process.shutdown(self.config.capture_grace).await
    }

    async fn open_capture(&self) -> Result<ActiveCapture, BusError> {
        let today = self.clock.today();
        let path = capture_log_path(&self.config.capture_dir, today);
        let mut file = DailyFile::open(&path, today)?;
        file.write_line(&capture_session_header(&self.clock.now(), &self.config.device_id))?;

        let process = self
            .driver
            .start_capture(&self.config.interface, file.try_clone_file()?)
            .await?;
        info!(path = %path.display(), "Capturing to log");

        Ok(ActiveCapture {
            file,
            process,
            exit_reported: false,
        })
    }

    /// Switch to the log of the new date, then stop the old capture
    ///
    /// Fails only when the new capture cannot be started.
    async fn rotate(&self, capture: &mut ActiveCapture) -> Result<(), BusError> {
        let mut previous = std::mem::replace(capture, self.open_capture().await?);
        info!(
            from = %previous.file.path().display(),
            to = %capture.file.path().display(),
            "Capture log rotated"
        );
        if let Err(e) = previous.process.shutdown(self.config.capture_grace).await {
            error!(
                path = %previous.file.path().display(),
                error = %e,
                "Failed to stop previous capture"
            );
        }
        Ok(())
    }
}
