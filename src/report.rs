//! Progress reporting shared by the walker, the fetch workers and the
//! maintenance passes.
//!
//! Components receive an `Arc<dyn Reporter>` instead of writing to a global
//! sink. Implementations must accept concurrent calls from pool workers.

use log::Level;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Which operation produced a report line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Download,
    Duplicates,
    Archive,
    Cleanup,
}

impl Stage {
    /// `log` target used for this stage
    pub fn target(self) -> &'static str {
        match self {
            Stage::Download => "harvest::download",
            Stage::Duplicates => "harvest::duplicates",
            Stage::Archive => "harvest::archive",
            Stage::Cleanup => "harvest::cleanup",
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Stage::Download => "DOWNLOAD",
            Stage::Duplicates => "DUPLICATES",
            Stage::Archive => "ARCHIVE",
            Stage::Cleanup => "CLEANUP",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

pub trait Reporter: Send + Sync {
    fn report(&self, level: Level, stage: Stage, message: &str);

    fn info(&self, stage: Stage, message: &str) {
        self.report(Level::Info, stage, message);
    }

    fn warn(&self, stage: Stage, message: &str) {
        self.report(Level::Warn, stage, message);
    }

    fn error(&self, stage: Stage, message: &str) {
        self.report(Level::Error, stage, message);
    }

    fn debug(&self, stage: Stage, message: &str) {
        self.report(Level::Debug, stage, message);
    }
}

/// Forwards every line to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, level: Level, stage: Stage, message: &str) {
        log::log!(target: stage.target(), level, "[{}] {}", stage.tag(), message);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLine {
    pub level: Level,
    pub stage: Stage,
    pub message: String,
}

/// Keeps every line in memory.
///
/// Useful for front ends that poll for output and for tests.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    lines: Mutex<Vec<ReportLine>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<ReportLine> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Remove and return everything recorded so far
    pub fn drain(&self) -> Vec<ReportLine> {
        self.lines
            .lock()
            .map(|mut l| std::mem::take(&mut *l))
            .unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.message.contains(needle))
    }

    pub fn count_at(&self, level: Level) -> usize {
        self.lines().iter().filter(|l| l.level == level).count()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, level: Level, stage: Stage, message: &str) {
        // A poisoned buffer only loses report lines
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(ReportLine {
                level,
                stage,
                message: message.to_string(),
            });
        }
    }
}

impl<R: Reporter + ?Sized> Reporter for Arc<R> {
    fn report(&self, level: Level, stage: Stage, message: &str) {
        (**self).report(level, stage, message);
    }
}

/// Default reporter for callers that only want `log` output
pub fn log_reporter() -> Arc<dyn Reporter> {
    Arc::new(LogReporter)
}
