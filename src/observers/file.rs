//! File destination with a circuit breaker

use crate::core::{EventFormatter, LogEvent, LoggerError, Observer, Result};
#[cfg(feature = "file")]
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Successive failures tolerated before writes are suspended
pub const MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// How long writes stay suspended once the breaker opens
pub const SUSPEND_DURATION: Duration = Duration::from_secs(10);

/// Suspends a failing destination instead of failing every call
#[derive(Debug, Default)]
pub(crate) struct CircuitBreaker {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

impl CircuitBreaker {
    pub(crate) fn is_open(&self, now: Instant) -> bool {
        self.open_until.is_some_and(|until| now < until)
    }

    pub(crate) fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.open_until = None;
    }

    /// Returns true when this failure opened the breaker
    pub(crate) fn record_failure(&mut self, now: Instant) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures > MAX_CONSECUTIVE_FAILURES {
            self.open_until = Some(now + SUSPEND_DURATION);
            return true;
        }
        false
    }

    pub(crate) fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

struct FileState {
    writer: Option<BufWriter<File>>,
    breaker: CircuitBreaker,
}

/// Appends one formatted line per event
pub struct FileObserver {
    path: PathBuf,
    formatter: EventFormatter,
    lock_writes: bool,
    state: Mutex<FileState>,
}

impl FileObserver {
    /// Open (creating if needed) `path` for appending
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        Ok(Self {
            path,
            formatter: EventFormatter::default(),
            lock_writes: false,
            state: Mutex::new(FileState {
                writer: Some(BufWriter::new(file)),
                breaker: CircuitBreaker::default(),
            }),
        })
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_formatter(mut self, formatter: EventFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    /// Take an advisory exclusive lock around every write
    ///
    /// Lines are flushed while the lock is held, so several processes can
    /// share one file. Without the `file` feature this is a no-op.
    #[must_use = "builder methods return a new value"]
    pub fn with_locking(mut self, lock_writes: bool) -> Self {
        self.lock_writes = lock_writes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&self, writer: &mut BufWriter<File>, line: &str) -> Result<()> {
        #[cfg(feature = "file")]
        if self.lock_writes {
            writer.get_ref().lock_exclusive().map_err(|e| {
                LoggerError::io_operation("lock", self.path.display().to_string(), e)
            })?;
            let written = writer
                .write_all(line.as_bytes())
                .and_then(|()| writer.flush());
            let unlocked = writer.get_ref().unlock();
            written?;
            unlocked?;
            return Ok(());
        }
        writer.write_all(line.as_bytes())?;
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| LoggerError::io_operation("open", path.display().to_string(), e))
}

impl Observer for FileObserver {
    fn log_event(&self, event: &LogEvent) -> Result<()> {
        let mut line = self.formatter.format(event);
        line.push('\n');

        let now = Instant::now();
        let mut state = self.state.lock();
        if state.breaker.is_open(now) {
            return Err(LoggerError::circuit_open(
                self.path.display().to_string(),
                state.breaker.consecutive_failures(),
            ));
        }

        let result = match state.writer.take() {
            Some(writer) => Ok(writer),
            None => open_append(&self.path).map(BufWriter::new),
        }
        .and_then(|mut writer| {
            self.write_line(&mut writer, &line)?;
            Ok(writer)
        });

        match result {
            Ok(writer) => {
                state.writer = Some(writer);
                state.breaker.record_success();
                Ok(())
            }
            Err(e) => {
                // The writer is dropped; the next attempt reopens the file
                state.breaker.record_failure(now);
                Err(e)
            }
        }
    }

    fn name(&self) -> &str {
        "file"
    }

    fn flush(&self) -> Result<()> {
        if let Some(ref mut writer) = self.state.lock().writer {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for FileObserver {
    fn drop(&mut self) {
        let _ = Observer::flush(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LogLevel;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_appends_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let observer = FileObserver::open(&path).unwrap();

        for message in ["first", "second"] {
            observer
                .log_event(&LogEvent::new(Arc::from("app"), LogLevel::Info, message))
                .unwrap();
        }
        observer.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("app - first"));
    }

    #[cfg(feature = "file")]
    #[test]
    fn test_locked_writes_are_flushed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("locked.log");
        let observer = FileObserver::open(&path).unwrap().with_locking(true);
        observer
            .log_event(&LogEvent::new(Arc::from("app"), LogLevel::Warn, "locked"))
            .unwrap();

        // Visible without an explicit flush
        assert!(std::fs::read_to_string(&path).unwrap().contains("locked"));
    }

    #[test]
    fn test_open_failure() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("no-such-dir").join("app.log");
        assert!(matches!(
            FileObserver::open(missing),
            Err(LoggerError::IoOperation { .. })
        ));
    }

    #[test]
    fn test_breaker_opens_after_repeated_failures() {
        let mut breaker = CircuitBreaker::default();
        let now = Instant::now();
        for _ in 0..MAX_CONSECUTIVE_FAILURES {
            assert!(!breaker.record_failure(now));
        }
        assert!(!breaker.is_open(now));

        assert!(breaker.record_failure(now));
        assert!(breaker.is_open(now + Duration::from_secs(9)));
        assert!(!breaker.is_open(now + SUSPEND_DURATION));

        breaker.record_success();
        assert_eq!(breaker.consecutive_failures(), 0);
        assert!(!breaker.is_open(now));
    }
}
