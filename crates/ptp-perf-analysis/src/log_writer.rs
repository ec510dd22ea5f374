//! The markdown analysis log.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use ptp_perf_common::{Error, Result};
use ptp_perf_log_collection::{LogEntry, OutputWriter};

/// Writes `LEVEL: message` paragraphs, replacing the file of a previous
/// analysis.
pub struct MarkdownOutputWriter {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl MarkdownOutputWriter {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::from(e).context(format!("Failed to create directory {}", parent.display()))
            })?;
        }
        let file = File::create(&path)
            .map_err(|e| Error::from(e).context(format!("Failed to create {}", path.display())))?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputWriter for MarkdownOutputWriter {
    fn write(&mut self, entry: &LogEntry) -> Result<()> {
        writeln!(self.writer, "{}: {}\n", entry.level, entry.message)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ptp_perf_log_collection::LogLevel;

    #[test]
    fn test_writes_paragraphs_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles").join("analysis.log.md");
        let entry = |level, message: &str| LogEntry {
            timestamp: Utc::now(),
            level,
            source: "pipeline".to_string(),
            message: message.to_string(),
        };

        let mut writer = MarkdownOutputWriter::create(&path).unwrap();
        writer.write(&entry(LogLevel::Info, "old")).unwrap();
        writer.close().unwrap();

        let mut writer = MarkdownOutputWriter::create(&path).unwrap();
        writer.write(&entry(LogLevel::Warn, "No clock step found")).unwrap();
        writer.write(&entry(LogLevel::Info, "Analysis completed")).unwrap();
        writer.close().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "WARNING: No clock step found\n\nINFO: Analysis completed\n\n");
    }
}
