use crate::domain::{AnalysisError, AnalysisResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

/// Lifecycle events and warnings of one job run, mirrored to `tracing`.
/// Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct JobLog {
    job: String,
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl JobLog {
    pub fn new(job: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            entries: Arc::default(),
        }
    }

    fn push(&self, level: LogLevel, message: String) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(LogEntry { level, message });
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(job = %self.job, "{message}");
        self.push(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(job = %self.job, "{message}");
        self.push(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(job = %self.job, "{message}");
        self.push(LogLevel::Error, message);
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().map(|entries| entries.clone()).unwrap_or_default()
    }

    pub fn warnings(&self) -> usize {
        self.entries()
            .iter()
            .filter(|entry| entry.level == LogLevel::Warning)
            .count()
    }

    pub fn render(&self) -> String {
        self.entries()
            .iter()
            .map(|entry| format!("{} [{}] {}", entry.level.as_str(), self.job, entry.message))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn write(&self, path: &Path) -> AnalysisResult<()> {
        std::fs::write(path, super::text::normalize_text_artifact(&self.render()))
            .map_err(|error| AnalysisError::io("IO.LOG_WRITE", format!("{}: {error}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::{JobLog, LogLevel};

    #[test]
    fn clones_share_entries_and_render_one_line_each() {
        let log = JobLog::new("1234_abcd");
        let shared = log.clone();
        log.info("job started");
        shared.warn("no velocities stored; using finite differences");
        assert_eq!(log.entries().len(), 2);
        assert_eq!(log.warnings(), 1);
        assert_eq!(log.entries()[1].level, LogLevel::Warning);
        let rendered = log.render();
        assert_eq!(rendered.lines().count(), 2);
        assert!(rendered.starts_with("INFO [1234_abcd] job started"));

        let directory = tempfile::tempdir().expect("tempdir");
        let path = directory.path().join("job.log");
        log.write(&path).expect("write");
        assert!(std::fs::read_to_string(&path).expect("read").ends_with("finite differences\n"));
    }
}
