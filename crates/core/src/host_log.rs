//! Host log sink.
//!
//! `host.log(...)` from scripts and failure reports from the engine land here.
//! Entries are kept in memory for the editor's log pane, forwarded to the `log`
//! facade, and optionally mirrored to a daily file (`host_YYYYMMDD.log`).

use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Local, NaiveDate};
use parking_lot::Mutex;

/// Entries kept in memory before the oldest are dropped.
pub const MAX_ENTRIES: usize = 10_000;

/// Days of daily log files kept when none is configured.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

const FILE_PREFIX: &str = "host_";
const FILE_SUFFIX: &str = ".log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    /// `[2026-01-31 09:15:02.113] [INFO] message`
    pub fn format_line(&self) -> String {
        format!(
            "[{}] [{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.level.as_str(),
            self.message
        )
    }
}

#[derive(Debug)]
struct FileSink {
    dir: PathBuf,
}

#[derive(Debug, Default)]
struct Inner {
    entries: VecDeque<LogEntry>,
    file: Option<FileSink>,
}

/// Cloneable handle to the shared host log.
#[derive(Debug, Clone, Default)]
pub struct HostLog {
    inner: Arc<Mutex<Inner>>,
}

impl HostLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror entries into daily files under `dir`, removing files older than
    /// `retention_days`.
    pub fn with_file_sink(dir: impl Into<PathBuf>, retention_days: u32) -> Result<Self, String> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| e.to_string())?;
        let removed = cleanup_old_files(&dir, retention_days, Local::now().date_naive());
        if removed > 0 {
            log::debug!("removed {} expired host log file(s) from {}", removed, dir.display());
        }
        let log = Self::new();
        log.inner.lock().file = Some(FileSink { dir });
        Ok(log)
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.append(LogLevel::Debug, message.into());
    }

    pub fn info(&self, message: impl Into<String>) {
        self.append(LogLevel::Info, message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.append(LogLevel::Warn, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.append(LogLevel::Error, message.into());
    }

    pub fn append(&self, level: LogLevel, message: String) {
        match level {
            LogLevel::Debug => log::debug!(target: "host", "{}", message),
            LogLevel::Info => log::info!(target: "host", "{}", message),
            LogLevel::Warn => log::warn!(target: "host", "{}", message),
            LogLevel::Error => log::error!(target: "host", "{}", message),
        }

        let entry = LogEntry { timestamp: Local::now(), level, message };
        let mut inner = self.inner.lock();
        if let Some(sink) = &inner.file {
            // File mirroring never fails the caller.
            if let Err(e) = append_to_file(&sink.dir, &entry) {
                log::warn!("host log file write failed: {}", e);
            }
        }
        if inner.entries.len() >= MAX_ENTRIES {
            inner.entries.pop_front();
        }
        inner.entries.push_back(entry);
    }

    /// Snapshot of all entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.inner.lock().entries.iter().cloned().collect()
    }

    /// True if any entry at `level` contains `needle`.
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.inner
            .lock()
            .entries
            .iter()
            .any(|e| e.level == level && e.message.contains(needle))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }
}

/// Path of the daily file for `date`.
pub fn daily_file_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("{}{}{}", FILE_PREFIX, date.format("%Y%m%d"), FILE_SUFFIX))
}

fn append_to_file(dir: &Path, entry: &LogEntry) -> std::io::Result<()> {
    let path = daily_file_path(dir, entry.timestamp.date_naive());
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", entry.format_line())
}

/// Delete daily files dated before `today - retention_days`. Returns the count removed.
fn cleanup_old_files(dir: &Path, retention_days: u32, today: NaiveDate) -> usize {
    let cutoff = today - Duration::days(retention_days as i64);
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("cannot scan host log dir {}: {}", dir.display(), e);
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(stamp) = name
            .strip_prefix(FILE_PREFIX)
            .and_then(|rest| rest.strip_suffix(FILE_SUFFIX))
        else {
            continue;
        };
        let Ok(date) = NaiveDate::parse_from_str(stamp, "%Y%m%d") else { continue };
        if date < cutoff && fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }
    removed
}
