//! Daily files with session headers
//!
//! Both acquisition services append to one file per calendar day. Every
//! run of a service starts with a header line, so a single daily file may
//! hold several sessions. The serial logger numbers its sessions; the
//! number of a new session is one past the highest number already present.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate};
use tracing::warn;

/// Leading text of a numbered session header
pub const SESSION_BANNER: &str = "===== Sesión ";

/// `YYYYMMDD`, the date token embedded in daily file names
pub fn date_stamp(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// `===== Sesión N - YYYY-MM-DD HH:MM:SS =====`
pub fn session_banner(number: u32, at: &DateTime<Local>) -> String {
    format!(
        "{}{} - {} =====",
        SESSION_BANNER,
        number,
        at.format("%Y-%m-%d %H:%M:%S")
    )
}

/// Number for the next session given the current file content
pub fn next_session_number(content: &str) -> u32 {
    content
        .lines()
        .filter_map(|line| {
            let (_, rest) = line.split_once(SESSION_BANNER)?;
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u32>().ok()
        })
        .max()
        .map_or(1, |n| n.saturating_add(1))
}

/// Like [`next_session_number`], reading the file first
///
/// A missing or unreadable file starts at session 1.
pub fn next_session_number_in(path: &Path) -> u32 {
    if !path.exists() {
        return 1;
    }
    match std::fs::read(path) {
        Ok(bytes) => next_session_number(&String::from_utf8_lossy(&bytes)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read file to determine session number");
            1
        }
    }
}

/// Open a file for appending, creating it and its parent directories
pub fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// An append-mode file bound to one calendar day
#[derive(Debug)]
pub struct DailyFile {
    date: NaiveDate,
    path: PathBuf,
    file: File,
}

impl DailyFile {
    pub fn open(path: impl Into<PathBuf>, date: NaiveDate) -> io::Result<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        Ok(Self { date, path, file })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this file still belongs to `today`
    pub fn is_current(&self, today: NaiveDate) -> bool {
        self.date == today
    }

    /// Write one line and flush it to the OS
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.file, "{}", line)?;
        self.file.flush()
    }

    /// Independent handle to the same file (e.g., for a child process)
    pub fn try_clone_file(&self) -> io::Result<File> {
        self.file.try_clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_next_session_number_takes_maximum() {
        let content = "\
===== Sesión 1 - 2024-03-09 08:00:00 =====
timestamp,accel_x_m_s2
===== Sesión 4 - 2024-03-09 12:00:00 =====
===== Sesión 2 - 2024-03-09 18:00:00 =====
";
        assert_eq!(next_session_number(content), 5);
    }

    #[test]
    fn test_next_session_number_defaults_to_one() {
        assert_eq!(next_session_number(""), 1);
        assert_eq!(next_session_number("timestamp,lat\n1,2\n"), 1);
    }

    #[test]
    fn test_session_banner_format() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 3).unwrap();
        assert_eq!(
            session_banner(3, &at),
            "===== Sesión 3 - 2024-03-09 07:05:03 ====="
        );
    }

    #[test]
    fn test_daily_file_appends_and_tracks_date() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2024").join("03").join("x.csv");
        let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();

        let mut file = DailyFile::open(&path, day).unwrap();
        file.write_line("first").unwrap();
        drop(file);

        let mut file = DailyFile::open(&path, day).unwrap();
        file.write_line("second").unwrap();

        assert!(file.is_current(day));
        assert!(!file.is_current(day.succ_opt().unwrap()));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_missing_file_starts_at_session_one() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(next_session_number_in(&dir.path().join("nope.csv")), 1);
    }
}
