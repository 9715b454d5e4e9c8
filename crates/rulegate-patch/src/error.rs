//! Error types for patch assembly.

use thiserror::Error;

/// Errors that can occur while building the canonical patch model.
#[derive(Debug, Error)]
pub enum PatchError {
    /// Diff text was malformed (e.g. an unparseable hunk header).
    #[error("invalid patch: {reason}")]
    InvalidPatch {
        /// What went wrong.
        reason: String,
    },

    /// A structured configuration file failed to parse.
    #[error("failed to parse structured config '{path}': {reason}")]
    ParseFailure {
        /// Path of the file that failed to parse.
        path: String,
        /// Parser error message.
        reason: String,
    },

    /// The PR description carried a `fensak` front-matter block that is
    /// structurally invalid.
    #[error("malformed front matter: {reason}")]
    MalformedFrontMatter {
        /// What went wrong.
        reason: String,
    },
}
