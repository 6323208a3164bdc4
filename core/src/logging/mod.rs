//! Leveled logging seam handed to the engine at construction.
//!
//! [`TracingLogger`] forwards to `tracing` once started and buffers every
//! message logged before that. [`MemoryLogger`] keeps records in memory.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

pub trait StageLogger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);

    /// Flush anything buffered before the logger was configured.
    fn start(&self) {}

    /// Turn console output on or off (progress bars own the terminal).
    fn set_console(&self, _enabled: bool) {}

    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    fn critical(&self, message: &str) {
        self.log(LogLevel::Critical, message);
    }
}

/// Shared on/off flag for console log output.
#[derive(Debug, Clone)]
pub struct ConsoleSwitch(Arc<AtomicBool>);

impl ConsoleSwitch {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Relaxed);
    }
}

impl Default for ConsoleSwitch {
    fn default() -> Self {
        Self::new(true)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Forwards to `tracing`, holding messages back until [`StageLogger::start`].
pub struct TracingLogger {
    buffer: Mutex<Option<Vec<(LogLevel, String)>>>,
    console: ConsoleSwitch,
}

impl TracingLogger {
    pub fn new(console: ConsoleSwitch) -> Self {
        Self {
            buffer: Mutex::new(Some(Vec::new())),
            console,
        }
    }

    pub fn console(&self) -> &ConsoleSwitch {
        &self.console
    }

    fn emit(level: LogLevel, message: &str) {
        match level {
            LogLevel::Trace => tracing::trace!("{message}"),
            LogLevel::Debug => tracing::debug!("{message}"),
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warn => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
            LogLevel::Critical => tracing::error!(critical = true, "{message}"),
        }
    }
}

impl StageLogger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        let mut buffer = lock(&self.buffer);
        if let Some(pending) = buffer.as_mut() {
            pending.push((level, message.to_string()));
            return;
        }
        drop(buffer);
        Self::emit(level, message);
    }

    fn start(&self) {
        let pending = lock(&self.buffer).take();
        for (level, message) in pending.unwrap_or_default() {
            Self::emit(level, &message);
        }
    }

    fn set_console(&self, enabled: bool) {
        self.console.set(enabled);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    records: Mutex<Vec<LogRecord>>,
    started: AtomicBool,
    console: ConsoleSwitch,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        lock(&self.records).clone()
    }

    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        lock(&self.records)
            .iter()
            .filter(|r| r.level == level)
            .map(|r| r.message.clone())
            .collect()
    }

    pub fn count(&self, level: LogLevel) -> usize {
        lock(&self.records)
            .iter()
            .filter(|r| r.level == level)
            .count()
    }

    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        lock(&self.records)
            .iter()
            .any(|r| r.level == level && r.message.contains(needle))
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Relaxed)
    }

    pub fn console_enabled(&self) -> bool {
        self.console.is_enabled()
    }
}

impl StageLogger for MemoryLogger {
    fn log(&self, level: LogLevel, message: &str) {
        lock(&self.records).push(LogRecord {
            level,
            message: message.to_string(),
        });
    }

    fn start(&self) {
        self.started.store(true, Ordering::Relaxed);
    }

    fn set_console(&self, enabled: bool) {
        self.console.set(enabled);
    }
}
