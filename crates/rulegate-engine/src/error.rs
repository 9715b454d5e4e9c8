//! Error types for rule execution.

use thiserror::Error;

/// Errors that can occur while running a rule.
#[derive(Debug, Error)]
pub enum RuleError {
    /// Rule text failed pre-execution validation checks.
    #[error("rule validation failed: {reason}")]
    ValidationFailed {
        /// What went wrong.
        reason: String,
    },

    /// Rule text exceeds the configured maximum size.
    #[error("rule exceeds maximum size of {max} bytes (got {actual})")]
    CodeTooLarge {
        /// Maximum allowed size.
        max: usize,
        /// Actual size.
        actual: usize,
    },

    /// Execution exceeded the configured wall-clock budget.
    #[error("rule execution timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The rule's `main` returned something other than a boolean.
    #[error("rule returned a non-boolean result: {got}")]
    NonBooleanResult {
        /// Description of what was returned instead.
        got: String,
    },

    /// The rule threw, referenced a missing name, or failed to parse.
    #[error("rule execution failed: {message}")]
    RuleExecutionFailure {
        /// The guest-side error message.
        message: String,
    },

    /// A harness invariant was violated (host-side bug, not a guest fault).
    #[error("engine internal error: {0}")]
    Internal(String),
}
