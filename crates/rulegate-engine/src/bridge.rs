//! Host bridge state shared with the guest.
//!
//! Exactly three capabilities cross the sandbox boundary: `getInput()`
//! reads the serialized change-set snapshot, `setOutput(json)` writes the
//! result slot, and `console.*` emits log entries routed by [`LogMode`].
//! Everything is plain data; no host references ever reach the guest.

use std::cell::RefCell;

use serde::Serialize;

/// What happens to guest `console.*` calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogMode {
    /// Log calls are no-ops (default).
    #[default]
    Drop,
    /// Entries are forwarded to the host's `tracing` output.
    Console,
    /// Entries are captured and returned in the evaluation record.
    Capture,
}

/// Severity of a guest log entry, matching the `console` method called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// `console.debug`
    Debug,
    /// `console.log`
    Log,
    /// `console.info`
    Info,
    /// `console.warn`
    Warn,
    /// `console.error`
    Error,
}

/// One captured guest log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Severity from the `console` method name.
    pub level: LogLevel,
    /// Space-joined, stringified arguments.
    pub msg: String,
}

/// Mutable bridge state for one rule invocation.
#[derive(Debug)]
pub struct Bridge {
    /// Serialized `{patches, metadata}` snapshot handed to `getInput()`.
    pub input: String,
    /// Last value written by `setOutput`.
    pub output: RefCell<Option<String>>,
    /// Entries captured under [`LogMode::Capture`].
    pub logs: RefCell<Vec<LogEntry>>,
    /// Active log mode.
    pub mode: LogMode,
}

impl Bridge {
    /// Create bridge state for one invocation.
    pub fn new(input: String, mode: LogMode) -> Self {
        Self {
            input,
            output: RefCell::new(None),
            logs: RefCell::new(Vec::new()),
            mode,
        }
    }

    /// Route one guest log call according to the active mode.
    pub fn log(&self, level: LogLevel, msg: String) {
        match self.mode {
            LogMode::Drop => {}
            LogMode::Console => match level {
                LogLevel::Debug => {
                    tracing::debug!(target: "rulegate::sandbox::guest", "{msg}");
                }
                LogLevel::Log | LogLevel::Info => {
                    tracing::info!(target: "rulegate::sandbox::guest", "{msg}");
                }
                LogLevel::Warn => {
                    tracing::warn!(target: "rulegate::sandbox::guest", "{msg}");
                }
                LogLevel::Error => {
                    tracing::error!(target: "rulegate::sandbox::guest", "{msg}");
                }
            },
            LogMode::Capture => self.logs.borrow_mut().push(LogEntry { level, msg }),
        }
    }
}
