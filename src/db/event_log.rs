//! Append-only event log backing the status report.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::file::{load_or_default, write_atomic, DbError};
use super::models::LogEntry;

/// Thread-safe, file-backed log of check outcomes. Entries are never removed.
pub struct EventLog {
    path: PathBuf,
    entries: Mutex<Vec<LogEntry>>,
}

impl EventLog {
    /// Open the log stored at `path`. A missing file is an empty log.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let path = path.as_ref().to_path_buf();
        let entries: Vec<LogEntry> = load_or_default(&path)?;
        tracing::debug!("Loaded {} log entries from {}", entries.len(), path.display());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one entry and rewrite the log file.
    pub fn append(&self, entry: LogEntry) -> Result<(), DbError> {
        let mut entries = self.lock();
        entries.push(entry);
        if let Err(e) = write_atomic(&self.path, &*entries) {
            entries.pop();
            return Err(e);
        }
        Ok(())
    }

    /// All entries in append order.
    pub fn load_all(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
