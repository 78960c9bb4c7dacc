//! Processed-file ledger: basenames of capture logs already converted

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use hums_core::rotation::open_append;
use tracing::warn;

use crate::error::PipelineError;

/// Append-only list of processed capture log basenames, one per line
#[derive(Debug)]
pub struct ProcessedLedger {
    path: PathBuf,
    entries: HashSet<String>,
}

impl ProcessedLedger {
    /// Read the ledger
    ///
    /// A missing ledger is empty. An unreadable one is logged and treated
    /// as empty, so its files are converted again.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Processed-file ledger unreadable");
                HashSet::new()
            }
        };
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a basename and flush it
    pub fn mark_processed(&mut self, name: &str) -> Result<(), PipelineError> {
        let ledger_error = |source| PipelineError::Ledger {
            path: self.path.clone(),
            source,
        };
        let mut file = open_append(&self.path).map_err(ledger_error)?;
        writeln!(file, "{}", name)
            .and_then(|_| file.flush())
            .map_err(ledger_error)?;
        self.entries.insert(name.to_string());
        Ok(())
    }
}
