//! Per-run log file
//!
//! Every line written here is also emitted through `tracing`, so the run
//! directory keeps a human-readable `<StageName>.log` while the process-wide
//! subscriber still sees the same events.

use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{PipelineError, Result};

#[derive(Debug)]
pub struct RunLog {
    path: Option<PathBuf>,
    writer: Option<Mutex<BufWriter<File>>>,
}

impl RunLog {
    /// Open (append) a log file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| PipelineError::persist(path, source))?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            writer: Some(Mutex::new(BufWriter::new(file))),
        })
    }

    /// A log that only forwards to `tracing`.
    pub fn disabled() -> Self {
        Self {
            path: None,
            writer: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write one timestamped line.
    ///
    /// Write failures are reported through `tracing` and otherwise ignored:
    /// a broken log must not fail a reduction.
    pub fn line(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!(target: "stagehand::run", "{message}");

        let Some(writer) = &self.writer else {
            return;
        };
        let mut writer = writer.lock().unwrap_or_else(|p| p.into_inner());
        let stamp = Utc::now().format("%Y-%m-%d %H:%M:%S%.3f");
        if let Err(e) = writeln!(writer, "[{stamp}] {message}") {
            tracing::warn!(error = %e, "failed to write run log");
        }
    }

    /// Flush buffered lines to disk.
    pub fn flush(&self) -> Result<()> {
        if let (Some(writer), Some(path)) = (&self.writer, &self.path) {
            let mut writer = writer.lock().unwrap_or_else(|p| p.into_inner());
            writer
                .flush()
                .map_err(|source| PipelineError::persist(path, source))?;
        }
        Ok(())
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        if let Some(writer) = &self.writer {
            let mut writer = writer.lock().unwrap_or_else(|p| p.into_inner());
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lines_are_timestamped() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("Stage3.log");
        let log = RunLog::open(&path).unwrap();
        log.line("Starting Stage 3");
        log.line("Writing results");
        log.flush().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] Starting Stage 3"));
    }

    #[test]
    fn test_disabled_log_has_no_path() {
        let log = RunLog::disabled();
        log.line("ignored");
        assert!(log.path().is_none());
        log.flush().unwrap();
    }
}
