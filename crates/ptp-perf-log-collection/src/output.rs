//! Output writers for log targets

use crate::types::LogEntry;
use parking_lot::Mutex;
use ptp_perf_common::{Error, Result};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Trait for writing log entries to various outputs
pub trait OutputWriter: Send {
    /// Write a log entry
    fn write(&mut self, entry: &LogEntry) -> Result<()>;

    /// Flush any buffered output
    fn flush(&mut self) -> Result<()>;

    /// Close the output writer
    fn close(&mut self) -> Result<()> {
        self.flush()
    }
}

/// File output writer, used for the per-run `profile_<id>.log`.
pub struct FileOutputWriter {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl FileOutputWriter {
    /// Create a new file output writer, appending to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::from(e).context(format!("Failed to create log directory {}", parent.display()))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::from(e).context(format!("Failed to open log file {}", path.display())))?;

        Ok(Self {
            writer: BufWriter::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputWriter for FileOutputWriter {
    fn write(&mut self, entry: &LogEntry) -> Result<()> {
        // Format: timestamp LEVEL [source] message
        writeln!(
            self.writer,
            "{} {:<7} [{}] {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            entry.level,
            entry.source,
            entry.message
        )?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Circular buffer output writer (keeps last N log entries).
///
/// Clones share the same buffer, so a test can install one clone and read
/// the captured entries through another.
#[derive(Clone)]
pub struct CircularBufferOutputWriter {
    buffer: Arc<Mutex<VecDeque<LogEntry>>>,
    max_size: usize,
}

impl CircularBufferOutputWriter {
    pub fn new(max_size: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(max_size))),
            max_size,
        }
    }

    pub fn get_logs(&self) -> Vec<LogEntry> {
        self.buffer.lock().iter().cloned().collect()
    }
}

impl OutputWriter for CircularBufferOutputWriter {
    fn write(&mut self, entry: &LogEntry) -> Result<()> {
        let mut buffer = self.buffer.lock();
        buffer.push_back(entry.clone());
        while buffer.len() > self.max_size {
            buffer.pop_front();
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
