//! Serial time-series acquisition service
//!
//! The worker runs on a blocking thread:
//! - waits for the device node, then opens it (retrying forever while running)
//! - opens a new session in today's file on every (re)connect
//! - appends one timestamped row per valid sample, flushed immediately
//! - switches to a new file when the date changes

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use hums_core::rotation::{date_stamp, next_session_number_in, open_append, session_banner};
use hums_core::{Clock, HumsConfig, SystemClock};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::connector::{LineAssembler, SerialConnector, SerialPortConnector};
use crate::error::ImuError;
use crate::sample::{row_timestamp, ImuSample, COLUMNS};

/// Polling slice for interruptible waits
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Daily file path: `<dir>/YYYY/MM/YYYYMMDD_IMU_GPS_DATA.csv`
pub fn sample_log_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(date.format("%Y").to_string())
        .join(date.format("%m").to_string())
        .join(format!("{}_IMU_GPS_DATA.csv", date_stamp(date)))
}

/// Settings for the serial acquisition service
#[derive(Debug, Clone)]
pub struct ImuConfig {
    pub serial_port: PathBuf,
    pub baud_rate: u32,
    pub read_timeout: Duration,
    /// Polling interval while the device node is absent
    pub absent_retry: Duration,
    /// Back-off after a failed open
    pub open_retry: Duration,
    pub stop_timeout: Duration,
    pub log_dir: PathBuf,
}

impl ImuConfig {
    pub fn from_settings(config: &HumsConfig) -> Self {
        let imu = &config.imu;
        Self {
            serial_port: imu.serial_port.clone(),
            baud_rate: imu.baud_rate,
            read_timeout: Duration::from_millis(imu.read_timeout_ms),
            absent_retry: Duration::from_millis(imu.absent_retry_ms),
            open_retry: Duration::from_millis(imu.open_retry_ms),
            stop_timeout: Duration::from_millis(imu.stop_timeout_ms),
            log_dir: config.paths.imu_gps_log_dir(),
        }
    }

    pub fn connector(&self) -> SerialPortConnector {
        SerialPortConnector::new(&self.serial_port, self.baud_rate, self.read_timeout)
    }
}

/// Serial IMU/GPS acquisition service handle
pub struct ImuAcquisitionService {
    config: Arc<ImuConfig>,
    connector: Arc<dyn SerialConnector>,
    clock: Arc<dyn Clock>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ImuAcquisitionService {
    /// Service reading the configured serial port
    pub fn new(config: ImuConfig) -> Self {
        let connector = Arc::new(config.connector());
        Self::with_parts(config, connector, Arc::new(SystemClock))
    }

    pub fn with_parts(
        config: ImuConfig,
        connector: Arc<dyn SerialConnector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            connector,
            clock,
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start acquisition on a blocking thread; no-op if already running
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if self.is_running() {
            warn!(port = %self.config.serial_port.display(), "IMU/GPS acquisition already running");
            return;
        }

        self.running.store(true, Ordering::SeqCst);
        let session = SerialSession {
            config: self.config.clone(),
            connector: self.connector.clone(),
            clock: self.clock.clone(),
            running: self.running.clone(),
        };
        *worker = Some(tokio::task::spawn_blocking(move || session.run()));
        info!(port = %self.config.serial_port.display(), "IMU/GPS acquisition started");
    }

    /// Stop acquisition and wait for the worker; no-op if not running
    pub async fn stop(&self) {
        let handle = self.worker.lock().take();
        let Some(handle) = handle else {
            warn!(port = %self.config.serial_port.display(), "IMU/GPS acquisition not running");
            return;
        };

        self.running.store(false, Ordering::SeqCst);
        match tokio::time::timeout(self.config.stop_timeout, handle).await {
            Ok(Ok(())) => info!("IMU/GPS acquisition stopped"),
            Ok(Err(e)) => error!(error = %e, "IMU/GPS acquisition task failed"),
            Err(_) => error!(
                timeout_ms = self.config.stop_timeout.as_millis() as u64,
                "IMU/GPS acquisition did not stop in time"
            ),
        }
    }
}

/// Today's time-series file with a session already opened in it
struct SampleLog {
    date: NaiveDate,
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl SampleLog {
    fn append(&mut self, record: &[&str]) -> Result<(), ImuError> {
        self.writer.write_record(record)?;
        self.writer.flush()?;
        Ok(())
    }
}

struct SerialSession {
    config: Arc<ImuConfig>,
    connector: Arc<dyn SerialConnector>,
    clock: Arc<dyn Clock>,
    running: Arc<AtomicBool>,
}

impl SerialSession {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn run(self) {
        while let Some(reader) = self.connect() {
            let mut log = match self.open_session() {
                Ok(log) => log,
                Err(e) => {
                    error!(error = %e, "Cannot open IMU/GPS log file");
                    self.wait(self.config.open_retry);
                    continue;
                }
            };

            if let Err(e) = self.read_samples(reader, &mut log) {
                error!(error = %e, "Serial read failed, reconnecting");
            }
        }
        debug!("IMU/GPS worker exiting");
    }

    /// Ingest lines until stopped (`Ok`) or the connection fails (`Err`)
    fn read_samples(
        &self,
        reader: Box<dyn Read + Send>,
        log: &mut SampleLog,
    ) -> Result<(), ImuError> {
        let mut lines = LineAssembler::new(reader);

        while self.is_running() {
            let today = self.clock.today();
            if log.date != today {
                match self.open_session() {
                    Ok(next) => {
                        info!(from = %log.path.display(), to = %next.path.display(), "IMU/GPS log rotated");
                        *log = next;
                    }
                    Err(e) => {
                        error!(error = %e, "IMU/GPS log rotation failed, keeping previous file");
                        log.date = today;
                    }
                }
            }

            match lines.next_line()? {
                Some(line) if line.is_empty() => {}
                Some(line) => self.ingest(log, &line),
                None => std::thread::sleep(WAIT_SLICE),
            }
        }
        Ok(())
    }

    fn ingest(&self, log: &mut SampleLog, line: &str) {
        let sample = match ImuSample::parse(line) {
            Ok(sample) => sample,
            Err(e) => {
                warn!(error = %e, "Discarding malformed sample");
                return;
            }
        };
        let timestamp = row_timestamp(&self.clock.now());
        if let Err(e) = log.append(&sample.row(&timestamp)) {
            error!(path = %log.path.display(), error = %e, "Failed to write sample");
        }
    }

    /// Wait for the device and open it; `None` once stopped
    fn connect(&self) -> Option<Box<dyn Read + Send>> {
        let port = self.config.serial_port.display();
        let mut absent_logged = false;

        while self.is_running() {
            if !self.connector.is_present() {
                if !absent_logged {
                    warn!(port = %port, "Waiting for serial device");
                    absent_logged = true;
                }
                self.wait(self.config.absent_retry);
                continue;
            }

            match self.connector.open() {
                Ok(reader) => {
                    info!(port = %port, "Serial device connected");
                    return Some(reader);
                }
                Err(e) => {
                    error!(
                        port = %port,
                        error = %e,
                        retry_ms = self.config.open_retry.as_millis() as u64,
                        "Cannot open serial device"
                    );
                    self.wait(self.config.open_retry);
                }
            }
        }
        None
    }

    /// Open today's file and write a new session banner plus the column header
    fn open_session(&self) -> Result<SampleLog, ImuError> {
        let now = self.clock.now();
        let date = now.date_naive();
        let path = sample_log_path(&self.config.log_dir, date);

        let session = next_session_number_in(&path);
        let file = open_append(&path)?;
        let writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(file);

        let mut log = SampleLog { date, path, writer };
        let banner = session_banner(session, &now);
        log.append(&[banner.as_str()])?;
        log.append(&COLUMNS)?;

        info!(path = %log.path.display(), session, "Logging IMU/GPS samples");
        Ok(log)
    }

    /// Sleep up to `duration`, returning early once stopped
    fn wait(&self, duration: Duration) {
        let mut remaining = duration;
        while !remaining.is_zero() && self.is_running() {
            let slice = remaining.min(WAIT_SLICE);
            std::thread::sleep(slice);
            remaining -= slice;
        }
    }
}
