//! Import progress feed via Server-Sent Events (SSE).
//!
//! Every entry is emitted as a `tracing` event and broadcast to connected
//! `/api/logs` clients, so the console can show an import as it runs.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Buffered entries per subscriber before the slowest one starts lagging.
const CHANNEL_CAPACITY: usize = 256;

/// Log level for frontend display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A single log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Import this entry belongs to, when emitted during a run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_id: Option<String>,
    /// Nesting level for row details under a summary line.
    #[serde(default)]
    pub indent: u8,
}

impl LogEntry {
    fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self { level, message: message.into(), import_id: None, indent: 0 }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    pub fn for_import(mut self, import_id: impl Into<String>) -> Self {
        self.import_id = Some(import_id.into());
        self
    }

    pub fn with_indent(mut self, indent: u8) -> Self {
        self.indent = indent;
        self
    }
}

/// Global log broadcaster
pub static LOG_BROADCASTER: Lazy<LogBroadcaster> = Lazy::new(LogBroadcaster::new);

/// Broadcasts log entries to all connected SSE clients
pub struct LogBroadcaster {
    sender: broadcast::Sender<LogEntry>,
}

impl LogBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Send a log entry to all subscribers
    pub fn log(&self, entry: LogEntry) {
        let import_id = entry.import_id.as_deref().unwrap_or("-");
        match entry.level {
            LogLevel::Info | LogLevel::Success => {
                tracing::info!(import_id, indent = entry.indent, "{}", entry.message)
            }
            LogLevel::Warning => tracing::warn!(import_id, indent = entry.indent, "{}", entry.message),
            LogLevel::Error => tracing::error!(import_id, indent = entry.indent, "{}", entry.message),
        }

        // Broadcast to SSE clients (ignore if no receivers)
        let _ = self.sender.send(entry);
    }

    /// Get a receiver for SSE streaming
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Logger bound to one import run.
#[derive(Debug, Clone)]
pub struct ImportLog {
    import_id: String,
}

impl ImportLog {
    pub fn new(import_id: impl Into<String>) -> Self {
        Self { import_id: import_id.into() }
    }

    pub fn import_id(&self) -> &str {
        &self.import_id
    }

    pub fn info(&self, msg: impl Into<String>) {
        LOG_BROADCASTER.log(LogEntry::info(msg).for_import(&self.import_id));
    }

    pub fn success(&self, msg: impl Into<String>) {
        LOG_BROADCASTER.log(LogEntry::success(msg).for_import(&self.import_id));
    }

    pub fn warning(&self, msg: impl Into<String>) {
        LOG_BROADCASTER.log(LogEntry::warning(msg).for_import(&self.import_id));
    }

    pub fn warning_indent(&self, msg: impl Into<String>, indent: u8) {
        LOG_BROADCASTER.log(LogEntry::warning(msg).for_import(&self.import_id).with_indent(indent));
    }

    pub fn error(&self, msg: impl Into<String>) {
        LOG_BROADCASTER.log(LogEntry::error(msg).for_import(&self.import_id));
    }
}

/// Convenient logging functions
pub fn log_info(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::info(msg));
}

pub fn log_warning(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::warning(msg));
}
