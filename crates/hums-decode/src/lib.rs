//! hums-decode - capture log decoding
//!
//! Converts the daily CAN capture logs into pipe-delimited decoded record
//! files. Each frame goes through:
//!
//! 1. the OBD-II [`ResponseExtractor`](hums_obd::ResponseExtractor) (VIN, CVN, DTCs)
//! 2. the [`SignalDictionary`] (DBC) for everything else
//! 3. an `Unknown` record with the raw payload when neither applies
//!
//! [`LogProcessor::process_pending_logs`] runs the batch over every log not
//! yet listed in the processed-file ledger.

pub mod dictionary;
pub mod error;
pub mod ledger;
pub mod line;
pub mod pipeline;
pub mod record;

pub use dictionary::{render_signals, DbcDictionary, SignalDictionary, SignalValue};
pub use error::{DictionaryError, LineError, PipelineError};
pub use ledger::ProcessedLedger;
pub use line::{parse_line, CaptureLine, LoggedFrame};
pub use pipeline::{
    decode_log, process_log_file, record_file_path, BatchSummary, LogProcessor, PipelineConfig,
};
pub use record::DecodedRecord;
