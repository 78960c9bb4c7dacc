//! Pending-log batch runs over a real DBC and temporary data directories

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hums_core::FixedClock;
use hums_decode::{
    process_log_file, record_file_path, BatchSummary, DbcDictionary, LogProcessor, PipelineConfig,
    PipelineError,
};
use hums_obd::ResponseExtractor;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const DBC: &str = r#"VERSION "1.0"

BU_: ECM

BO_ 256 Engine : 8 ECM
 SG_ Speed : 0|8@1+ (1,0) [0|255] "km/h" *
"#;

const YESTERDAY_LOG: &str = "\
20240609_080000 HUMS-0042
(1717912800.000100) can0 7E8#1014490201314847
(1717912800.000200) can0 7E8#21434D3832363333
(1717912800.000300) can0 7E8#2241313233343536
(1717912800.000400) can0 7E8#0749060112345678
(1717912800.000500) can0 7E8#0247000000000000
(1717912800.000600) can0 555#0102
(1717912800.000700) can0
";

struct Fixture {
    _dir: TempDir,
    config: PipelineConfig,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let capture_dir = dir.path().join("can_logs");
        fs::create_dir_all(&capture_dir).unwrap();
        let dictionary_path = dir.path().join("vehicle.dbc");
        fs::write(&dictionary_path, DBC).unwrap();

        let config = PipelineConfig {
            capture_dir,
            output_dir: dir.path().join("csv_exports"),
            ledger_path: dir.path().join("processed_files.txt"),
            dictionary_path,
        };
        Self { _dir: dir, config }
    }

    fn add_log(&self, name: &str, content: &str) -> PathBuf {
        let path = self.config.capture_dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn processor(&self) -> LogProcessor {
        LogProcessor::with_clock(
            self.config.clone(),
            Arc::new(FixedClock::at(2024, 6, 10, 12, 0, 0)),
        )
    }

    fn output(&self, log_name: &str) -> String {
        let path = record_file_path(Path::new(log_name), &self.config.output_dir);
        fs::read_to_string(path).unwrap()
    }
}

#[test]
fn test_converts_pending_logs() {
    let fixture = Fixture::new();
    fixture.add_log("canlog_20240609.log", YESTERDAY_LOG);

    let summary = fixture.processor().process_pending_logs().unwrap();
    assert_eq!(
        summary,
        BatchSummary {
            processed: 1,
            failed: 0,
            skipped: 0
        }
    );

    assert_eq!(
        fixture.output("canlog_20240609.log"),
        "\
Timestamp | CAN ID | Message Name | Decoded Data
 | | SESIÓN: | 20240609_080000 HUMS-0042
1717912800.000100 | 7E8 | Unknown | 1014490201314847
1717912800.000200 | 7E8 | Unknown | 21434D3832363333
1717912800.000300 | 7E8 | VIN | 1HGCM82633A123456
1717912800.000400 | 7E8 | CVN | 12345678
1717912800.000500 | 7E8 | DTC Pendientes | No codes
1717912800.000600 | 555 | Unknown | 0102
"
    );
    assert_eq!(
        fs::read_to_string(&fixture.config.ledger_path).unwrap(),
        "canlog_20240609.log\n"
    );
}

#[test]
fn test_second_run_is_a_no_op() {
    let fixture = Fixture::new();
    fixture.add_log("canlog_20240609.log", YESTERDAY_LOG);

    let processor = fixture.processor();
    processor.process_pending_logs().unwrap();
    let summary = processor.process_pending_logs().unwrap();

    assert_eq!(summary.processed, 0);
    assert_eq!(summary.skipped, 1);
    assert_eq!(
        fs::read_to_string(&fixture.config.ledger_path).unwrap(),
        "canlog_20240609.log\n"
    );
}

#[test]
fn test_todays_log_is_left_alone() {
    let fixture = Fixture::new();
    fixture.add_log("canlog_20240609.log", YESTERDAY_LOG);
    fixture.add_log("canlog_20240610.log", "(1.0) can0 100#32\n");
    fixture.add_log("notes.txt", "not a capture log\n");

    let summary = fixture.processor().process_pending_logs().unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped, 1);

    let today_output =
        record_file_path(Path::new("canlog_20240610.log"), &fixture.config.output_dir);
    assert!(!today_output.exists());
}

#[test]
fn test_logs_processed_in_name_order() {
    let fixture = Fixture::new();
    fixture.add_log("canlog_20240608.log", "(1.0) can0 100#0100000000000000\n");
    fixture.add_log("canlog_20240607.log", "(1.0) can0 100#0200000000000000\n");

    fixture.processor().process_pending_logs().unwrap();

    assert_eq!(
        fs::read_to_string(&fixture.config.ledger_path).unwrap(),
        "canlog_20240607.log\ncanlog_20240608.log\n"
    );
    let output = fixture.output("canlog_20240607.log");
    assert!(output.ends_with("1.0 | 100 | Engine | Speed: 2\n"));
}

#[test]
fn test_missing_dictionary_aborts_run() {
    let mut fixture = Fixture::new();
    fixture.add_log("canlog_20240609.log", YESTERDAY_LOG);
    fixture.config.dictionary_path = fixture.config.dictionary_path.with_extension("missing");

    let err = fixture.processor().process_pending_logs().unwrap_err();
    assert!(matches!(err, PipelineError::DictionaryLoad(_)));
    assert!(!fixture.config.output_dir.exists());
    assert!(!fixture.config.ledger_path.exists());
}

#[test]
fn test_unrecorded_file_is_reprocessed_identically() {
    let fixture = Fixture::new();
    let log = fixture.add_log("canlog_20240609.log", YESTERDAY_LOG);
    let dictionary = DbcDictionary::parse(DBC).unwrap();

    // Converted, then interrupted before the ledger append
    let output = process_log_file(
        &log,
        &fixture.config.output_dir,
        &dictionary,
        &mut ResponseExtractor::new(),
    )
    .unwrap();
    let first = fs::read_to_string(&output).unwrap();

    let summary = fixture.processor().process_pending_logs().unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(fs::read_to_string(&output).unwrap(), first);
}

#[test]
fn test_ledger_failure_leaves_file_pending() {
    let mut fixture = Fixture::new();
    fixture.add_log("canlog_20240609.log", YESTERDAY_LOG);
    // A directory in place of the ledger file makes every append fail
    let ledger_dir = fixture.config.capture_dir.with_file_name("ledger_dir");
    fs::create_dir_all(&ledger_dir).unwrap();
    fixture.config.ledger_path = ledger_dir;

    let summary = fixture.processor().process_pending_logs().unwrap();
    assert_eq!(
        summary,
        BatchSummary {
            processed: 0,
            failed: 1,
            skipped: 0
        }
    );
    assert!(fixture.output("canlog_20240609.log").contains("| VIN |"));

    let again = fixture.processor().process_pending_logs().unwrap();
    assert_eq!(again.failed, 1);
    assert_eq!(again.skipped, 0);
}

#[test]
fn test_missing_capture_directory_is_empty_run() {
    let fixture = Fixture::new();
    fs::remove_dir(&fixture.config.capture_dir).unwrap();

    let summary = fixture.processor().process_pending_logs().unwrap();
    assert_eq!(summary, BatchSummary::default());
}
