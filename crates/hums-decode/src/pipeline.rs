//! Batch conversion of capture logs
//!
//! Every capture log that is not in the processed-file ledger and is not
//! today's (still being written) is decoded into `<csv_exports>/<name>.csv`.
//! A log is added to the ledger only once its record file is complete, so an
//! interrupted run simply converts it again on the next one.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hums_core::rotation::date_stamp;
use hums_core::{Clock, HumsConfig, SystemClock};
use hums_obd::ResponseExtractor;
use tracing::{debug, error, info, warn};

use crate::dictionary::{render_signals, DbcDictionary, SignalDictionary};
use crate::error::{DictionaryError, PipelineError};
use crate::ledger::ProcessedLedger;
use crate::line::{parse_line, CaptureLine};
use crate::record::{write_records, DecodedRecord};

/// Extension of capture logs
pub const CAPTURE_EXTENSION: &str = "log";

/// Extension of decoded record files
pub const RECORD_EXTENSION: &str = "csv";

/// Locations used by the pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub capture_dir: PathBuf,
    pub output_dir: PathBuf,
    pub ledger_path: PathBuf,
    pub dictionary_path: PathBuf,
}

impl PipelineConfig {
    pub fn from_settings(config: &HumsConfig) -> Self {
        Self {
            capture_dir: config.paths.can_log_dir(),
            output_dir: config.paths.csv_exports_dir(),
            ledger_path: config.paths.processed_files_log(),
            dictionary_path: config.paths.dbc_file.clone(),
        }
    }
}

/// Outcome of one pending-logs run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Converted and recorded in the ledger
    pub processed: usize,
    /// Conversion or ledger update failed; retried next run
    pub failed: usize,
    /// Already in the ledger or still being written today
    pub skipped: usize,
}

/// Capture log to decoded record file converter
pub struct LogProcessor {
    config: PipelineConfig,
    clock: Arc<dyn Clock>,
}

impl LogProcessor {
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: PipelineConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    /// Convert every pending capture log using the configured DBC
    ///
    /// Fails without touching any file when the dictionary cannot be loaded.
    pub fn process_pending_logs(&self) -> Result<BatchSummary, PipelineError> {
        let dictionary = DbcDictionary::load(&self.config.dictionary_path)
            .map_err(PipelineError::DictionaryLoad)?;
        self.process_pending_with(&dictionary)
    }

    /// Convert every pending capture log using `dictionary`
    pub fn process_pending_with(
        &self,
        dictionary: &dyn SignalDictionary,
    ) -> Result<BatchSummary, PipelineError> {
        info!(dir = %self.config.capture_dir.display(), "Processing pending capture logs");

        let mut ledger = ProcessedLedger::load(&self.config.ledger_path);
        let today = date_stamp(self.clock.today());
        let mut summary = BatchSummary::default();

        let mut pending = Vec::new();
        for path in self.capture_logs()? {
            let Some(name) = file_name(&path) else {
                continue;
            };
            if ledger.contains(&name) || name.contains(&today) {
                debug!(file = %name, "Skipping capture log");
                summary.skipped += 1;
            } else {
                pending.push((name, path));
            }
        }

        if pending.is_empty() {
            info!("No pending capture logs");
            return Ok(summary);
        }
        info!(count = pending.len(), "Found pending capture logs");

        let mut extractor = ResponseExtractor::new();
        for (name, path) in pending {
            info!(file = %name, "Processing capture log");
            extractor.reset_session();

            if let Err(e) =
                process_log_file(&path, &self.config.output_dir, dictionary, &mut extractor)
            {
                error!(file = %name, error = %e, "Failed to process capture log");
                summary.failed += 1;
                continue;
            }

            match ledger.mark_processed(&name) {
                Ok(()) => {
                    info!(file = %name, "Capture log processed");
                    summary.processed += 1;
                }
                Err(e) => {
                    error!(file = %name, error = %e, "Capture log not recorded as processed");
                    summary.failed += 1;
                }
            }
        }

        info!(
            processed = summary.processed,
            failed = summary.failed,
            skipped = summary.skipped,
            "Capture log processing finished"
        );
        Ok(summary)
    }

    /// Capture logs in the capture directory, sorted by name
    fn capture_logs(&self) -> Result<Vec<PathBuf>, PipelineError> {
        let dir = &self.config.capture_dir;
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(dir = %dir.display(), "Capture directory does not exist");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(PipelineError::Io {
                    path: dir.clone(),
                    source,
                })
            }
        };

        let mut logs: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|ext| ext.to_str()) == Some(CAPTURE_EXTENSION)
            })
            .collect();
        logs.sort();
        Ok(logs)
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(String::from)
}

/// Decoded record file path for a capture log
pub fn record_file_path(log_path: &Path, output_dir: &Path) -> PathBuf {
    let stem = log_path.file_stem().unwrap_or_default().to_string_lossy();
    output_dir.join(format!("{}.{}", stem, RECORD_EXTENSION))
}

/// Decode capture log text into records, preserving line order
///
/// Malformed lines and lines whose identifier or data are not valid hex
/// are skipped.
pub fn decode_log(
    content: &str,
    dictionary: &dyn SignalDictionary,
    extractor: &mut ResponseExtractor,
) -> Vec<DecodedRecord> {
    let mut records = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let frame = match parse_line(line) {
            Ok(None) => continue,
            Ok(Some(CaptureLine::SessionMarker(marker))) => {
                extractor.reset_session();
                records.push(DecodedRecord::Session {
                    marker: marker.to_string(),
                });
                continue;
            }
            Ok(Some(CaptureLine::Frame(frame))) => frame,
            Err(e) => {
                debug!(line = index + 1, error = %e, "Skipping line");
                continue;
            }
        };

        let parsed = frame
            .identifier_value()
            .and_then(|id| Ok((id, frame.payload()?)));
        let (id, payload) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(line = index + 1, error = %e, "Skipping line");
                continue;
            }
        };

        if let Some(special) = extractor.extract(id, &payload) {
            records.push(DecodedRecord::Frame {
                timestamp: frame.timestamp.to_string(),
                identifier: frame.identifier.to_string(),
                message_name: special.message_name().to_string(),
                text: special.text(),
            });
            continue;
        }

        let decoded = dictionary.decode(id, &payload).and_then(|signals| {
            let name = dictionary
                .message_name(id)
                .ok_or(DictionaryError::UnknownMessage(id))?;
            Ok((name.to_string(), render_signals(&signals)))
        });
        match decoded {
            Ok((message_name, text)) => records.push(DecodedRecord::Frame {
                timestamp: frame.timestamp.to_string(),
                identifier: frame.identifier.to_string(),
                message_name,
                text,
            }),
            Err(e) => {
                debug!(line = index + 1, error = %e, "Frame not decoded");
                records.push(DecodedRecord::unknown(
                    frame.timestamp,
                    frame.identifier,
                    &payload,
                ));
            }
        }
    }

    records
}

/// Convert one capture log into its decoded record file
pub fn process_log_file(
    log_path: &Path,
    output_dir: &Path,
    dictionary: &dyn SignalDictionary,
    extractor: &mut ResponseExtractor,
) -> Result<PathBuf, PipelineError> {
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| PipelineError::Io { path, source }
    };

    let bytes = std::fs::read(log_path).map_err(io_error(log_path))?;
    let content = String::from_utf8_lossy(&bytes);
    let records = decode_log(&content, dictionary, extractor);

    std::fs::create_dir_all(output_dir).map_err(io_error(output_dir))?;
    let output_path = record_file_path(log_path, output_dir);
    let file = File::create(&output_path).map_err(io_error(&output_path))?;
    write_records(BufWriter::new(file), &records).map_err(io_error(&output_path))?;

    info!(
        output = %output_path.display(),
        records = records.len(),
        "Decoded record file written"
    );
    Ok(output_path)
}
