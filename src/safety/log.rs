//! # Safety Log
//!
//! Append-only record of safety diagnostics shared between the background
//! loop (writer) and operator-facing readers (status queries, dashboards,
//! export).
//!
//! Entries keep append order and timestamps never go backwards: an entry is
//! stamped with `max(now, previous timestamp)` while holding the lock.
//! Timestamps are truncated to milliseconds so an exported log parses back
//! to identical entries.
//!
//! ## Export format
//!
//! ```text
//! === Drone Safety Log ===
//!
//! [2026-03-14 09:26:53.589] Altitude exceeded: 12.0m > 10m
//! ```

use chrono::{Local, NaiveDateTime, SubsecRound};
use std::collections::VecDeque;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::info;

use crate::error::{Result, SafetyError};

/// Header written at the top of every exported log
pub const LOG_HEADER: &str = "=== Drone Safety Log ===";

/// Timestamp layout used in exported lines
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// One timestamped diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyLogEntry {
    pub timestamp: NaiveDateTime,
    pub message: String,
}

impl fmt::Display for SafetyLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format(TIMESTAMP_FORMAT), self.message)
    }
}

impl SafetyLogEntry {
    /// Parse a `[<timestamp>] <message>` line
    fn parse(line: &str) -> Option<Self> {
        let (stamp, message) = line.strip_prefix('[')?.split_once("] ")?;
        let timestamp = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
        Some(Self {
            timestamp,
            message: message.to_string(),
        })
    }
}

#[derive(Debug, Default)]
struct LogInner {
    entries: VecDeque<SafetyLogEntry>,
    total_appended: usize,
}

/// Thread-safe, ordered safety log
///
/// Unbounded by default. With a capacity the oldest entries are evicted
/// once the limit is reached; [`SafetyLog::total_appended`] still counts them.
#[derive(Debug, Default)]
pub struct SafetyLog {
    inner: Mutex<LogInner>,
    capacity: Option<usize>,
}

impl SafetyLog {
    /// Create an unbounded log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log holding at most `capacity` entries in memory
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LogInner::default()),
            capacity: Some(capacity.max(1)),
        }
    }

    fn inner(&self) -> MutexGuard<'_, LogInner> {
        // A panicking reader must not take the safety log down with it
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a message stamped with the current local time
    ///
    /// Line breaks are folded into spaces so every entry stays one line.
    ///
    /// # Examples
    ///
    /// ```
    /// use drone_safety::safety::SafetyLog;
    ///
    /// let log = SafetyLog::new();
    /// log.append("Low battery: 15% < 20%");
    /// assert_eq!(log.len(), 1);
    /// assert_eq!(log.tail(1)[0].message, "Low battery: 15% < 20%");
    /// ```
    pub fn append(&self, message: impl Into<String>) -> SafetyLogEntry {
        let message: String = message.into();
        let message = if message.contains(['\n', '\r']) {
            message.replace(['\n', '\r'], " ")
        } else {
            message
        };

        let now = Local::now().naive_local().trunc_subsecs(3);
        let mut inner = self.inner();
        let timestamp = match inner.entries.back() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };

        let entry = SafetyLogEntry { timestamp, message };
        if let Some(capacity) = self.capacity {
            while inner.entries.len() >= capacity {
                inner.entries.pop_front();
            }
        }
        inner.entries.push_back(entry.clone());
        inner.total_appended += 1;
        entry
    }

    /// Last `n` entries, oldest first
    #[must_use]
    pub fn tail(&self, n: usize) -> Vec<SafetyLogEntry> {
        let inner = self.inner();
        let skip = inner.entries.len().saturating_sub(n);
        inner.entries.iter().skip(skip).cloned().collect()
    }

    /// Every retained entry in append order
    #[must_use]
    pub fn all(&self) -> Vec<SafetyLogEntry> {
        self.inner().entries.iter().cloned().collect()
    }

    /// Number of entries currently retained
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner().entries.is_empty()
    }

    /// Number of entries ever appended, including evicted ones
    #[must_use]
    pub fn total_appended(&self) -> usize {
        self.inner().total_appended
    }

    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Write the log as plain text, one entry per line
    ///
    /// Takes a snapshot first so the background loop is never blocked on disk I/O.
    ///
    /// # Errors
    ///
    /// Returns [`SafetyError::Io`] if the file cannot be created or written.
    pub fn export<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let entries = self.all();
        let path = path.as_ref();

        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "{}", LOG_HEADER)?;
        writeln!(writer)?;
        for entry in &entries {
            writeln!(writer, "{}", entry)?;
        }
        writer.flush()?;

        info!("Safety log saved to {} ({} entries)", path.display(), entries.len());
        Ok(entries.len())
    }

    /// Parse a file produced by [`SafetyLog::export`]
    ///
    /// # Errors
    ///
    /// Returns [`SafetyError::LogFormat`] for a missing header or an
    /// unparseable entry line, and [`SafetyError::Io`] if the file cannot be read.
    pub fn read_export<P: AsRef<Path>>(path: P) -> Result<Vec<SafetyLogEntry>> {
        let contents = fs::read_to_string(path)?;
        let mut lines = contents.lines().enumerate();

        match lines.next() {
            Some((_, header)) if header == LOG_HEADER => {}
            other => {
                return Err(SafetyError::LogFormat {
                    line: 1,
                    content: other.map(|(_, l)| l.to_string()).unwrap_or_default(),
                })
            }
        }

        let mut entries = Vec::new();
        for (idx, line) in lines {
            if line.is_empty() {
                continue;
            }
            let entry = SafetyLogEntry::parse(line).ok_or_else(|| SafetyError::LogFormat {
                line: idx + 1,
                content: line.to_string(),
            })?;
            entries.push(entry);
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    #[test]
    fn test_append_order() {
        let log = SafetyLog::new();
        log.append("first");
        log.append("second");
        log.append("third");

        let messages: Vec<String> = log.all().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_timestamps_non_decreasing() {
        let log = SafetyLog::new();
        for i in 0..200 {
            log.append(format!("entry {}", i));
        }
        let entries = log.all();
        assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_tail() {
        let log = SafetyLog::new();
        for i in 0..10 {
            log.append(format!("entry {}", i));
        }

        let tail = log.tail(3);
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[0].message, "entry 7");
        assert_eq!(tail[2].message, "entry 9");

        assert_eq!(log.tail(50).len(), 10);
        assert!(log.tail(0).is_empty());
    }

    #[test]
    fn test_tail_on_empty_log() {
        let log = SafetyLog::new();
        assert!(log.tail(5).is_empty());
        assert!(log.is_empty());
    }

    #[test]
    fn test_multiline_message_is_folded() {
        let log = SafetyLog::new();
        let entry = log.append("line one\nline two");
        assert_eq!(entry.message, "line one line two");
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let log = SafetyLog::with_capacity(3);
        for i in 0..5 {
            log.append(format!("entry {}", i));
        }

        assert_eq!(log.len(), 3);
        assert_eq!(log.total_appended(), 5);
        assert_eq!(log.all()[0].message, "entry 2");
    }

    #[test]
    fn test_concurrent_appends() {
        let log = Arc::new(SafetyLog::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        log.append(format!("thread {} entry {}", t, i));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(log.len(), 1000);
        let entries = log.all();
        assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_export_format() {
        let log = SafetyLog::new();
        let entry = log.append("Altitude exceeded: 12.0m > 10m");

        let file = NamedTempFile::new().unwrap();
        assert_eq!(log.export(file.path()).unwrap(), 1);

        let contents = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "=== Drone Safety Log ===");
        assert_eq!(lines[1], "");
        assert_eq!(
            lines[2],
            format!(
                "[{}] Altitude exceeded: 12.0m > 10m",
                entry.timestamp.format(TIMESTAMP_FORMAT)
            )
        );
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_export_round_trip() {
        let log = SafetyLog::new();
        log.append("Altitude exceeded: 12.0m > 10m");
        log.append("Low battery: 15% < 20%");
        log.append("Message with ] bracket and [brackets]");

        let file = NamedTempFile::new().unwrap();
        log.export(file.path()).unwrap();

        let parsed = SafetyLog::read_export(file.path()).unwrap();
        assert_eq!(parsed, log.all());
    }

    #[test]
    fn test_export_empty_log() {
        let log = SafetyLog::new();
        let file = NamedTempFile::new().unwrap();
        log.export(file.path()).unwrap();

        let contents = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(contents, "=== Drone Safety Log ===\n\n");
        assert!(SafetyLog::read_export(file.path()).unwrap().is_empty());
    }

    #[test]
    fn test_read_export_rejects_missing_header() {
        use std::io::Write;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[2026-01-01 00:00:00.000] no header").unwrap();

        let result = SafetyLog::read_export(file.path());
        assert!(matches!(result, Err(SafetyError::LogFormat { line: 1, .. })));
    }

    #[test]
    fn test_read_export_rejects_garbage_line() {
        use std::io::Write;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", LOG_HEADER).unwrap();
        writeln!(file).unwrap();
        writeln!(file, "[2026-01-01 00:00:00.000] fine").unwrap();
        writeln!(file, "not an entry").unwrap();

        let result = SafetyLog::read_export(file.path());
        assert!(matches!(result, Err(SafetyError::LogFormat { line: 4, .. })));
    }

    #[test]
    fn test_export_to_missing_directory_fails() {
        let log = SafetyLog::new();
        let result = log.export("/nonexistent/dir/safety_log.txt");
        assert!(matches!(result, Err(SafetyError::Io(_))));
    }
}
