//! Structured, timestamped, leveled log capture for one render session.
//!
//! The sink is the diagnostics side-channel of the pipeline: every
//! component takes a handle to it explicitly instead of writing through
//! process-global output. Entries accumulate until `clear()`, which the
//! engine calls at the start of each render attempt. Entry ids keep
//! increasing across clears so consumers can tell sessions apart.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// Severity of a log entry, mirroring the browser console levels the
/// playground surfaces to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Log,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Log => "log",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "log" => Ok(LogLevel::Log),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(()),
        }
    }
}

/// A single captured diagnostic line
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Monotonic counter, never reset
    pub id: u64,
    pub level: LogLevel,
    /// Milliseconds since the Unix epoch
    pub time_ms: u64,
    pub text: String,
}

/// Append-only in-memory log store. Cheap to clone via `Arc`.
pub struct LogSink {
    entries: Mutex<Vec<LogEntry>>,
    next_id: AtomicU64,
}

/// Shared handle components hold onto
pub type Logger = Arc<LogSink>;

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn shared() -> Logger {
        Arc::new(Self::new())
    }

    /// Append a plain text entry
    pub fn append(&self, level: LogLevel, text: impl Into<String>) {
        let entry = LogEntry {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            level,
            time_ms: now_ms(),
            text: text.into(),
        };
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }

    /// Append an error value, rendered as its display text plus up to two
    /// entries of its source chain.
    pub fn append_err(&self, level: LogLevel, err: &(dyn std::error::Error + 'static)) {
        let mut text = err.to_string();
        let mut source = err.source();
        for _ in 0..2 {
            match source {
                Some(cause) => {
                    text.push_str("\n  caused by: ");
                    text.push_str(&cause.to_string());
                    source = cause.source();
                }
                None => break,
            }
        }
        self.append(level, text);
    }

    /// Append a structured value as pretty JSON, falling back to the
    /// `Debug` rendering when serialization fails.
    pub fn append_json(&self, level: LogLevel, label: &str, value: &serde_json::Value) {
        let body = serde_json::to_string_pretty(value).unwrap_or_else(|_| format!("{:?}", value));
        self.append(level, format!("{} {}", label, body));
    }

    /// Drop all entries; ids are not reset.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    /// Ordered copy of the current session's entries
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
