use std::sync::Mutex;

use log::Level;

pub const LOG_TARGET: &str = "codelinter";

/// Receives the status and warning lines of a lint run.
pub trait ReportSink: Sync {
    fn info(&self, line: &str);
    fn warn(&self, line: &str);
}

/// Forwards lines to the `log` facade, the way mdbook reports preprocessor
/// progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn info(&self, line: &str) {
        log::info!(target: LOG_TARGET, "{}", line);
    }

    fn warn(&self, line: &str) {
        log::warn!(target: LOG_TARGET, "{}", line);
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(Level, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Writes every recorded line to `sink`, in order.
    pub fn replay(&self, sink: &dyn ReportSink) {
        for (level, line) in self.lock().iter() {
            match level {
                Level::Warn | Level::Error => sink.warn(line),
                _ => sink.info(line),
            }
        }
    }

    /// All informational lines joined by newlines.
    pub fn status(&self) -> String {
        self.joined(Level::Info)
    }

    /// All warning lines joined by newlines.
    pub fn warnings(&self) -> String {
        self.joined(Level::Warn)
    }

    fn joined(&self, level: Level) -> String {
        self.lock()
            .iter()
            .filter(|(line_level, _)| *line_level == level)
            .map(|(_, line)| line.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn push(&self, level: Level, line: &str) {
        self.lock().push((level, line.to_string()));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(Level, String)>> {
        // A poisoned sink still holds every line written before the panic.
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ReportSink for MemorySink {
    fn info(&self, line: &str) {
        self.push(Level::Info, line);
    }

    fn warn(&self, line: &str) {
        self.push(Level::Warn, line);
    }
}
