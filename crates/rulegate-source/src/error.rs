//! Error types for forge source adapters.

use rulegate_patch::PatchError;
use thiserror::Error;

/// Errors emitted while assembling a change set from a forge.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SourceError {
    /// The forge reported a file status verb this adapter does not know.
    #[error("unknown file status from forge: '{status}'")]
    UnknownFileStatus {
        /// The unrecognized status verb.
        status: String,
    },

    /// The forge response violated its own contract (e.g. a rename entry
    /// without the prior filename).
    #[error("inconsistent forge response: {reason}")]
    InconsistentForgeResponse {
        /// What the response was missing or contradicting.
        reason: String,
    },

    /// Request transport failed.
    #[error("forge transport error: {0}")]
    Transport(String),

    /// The forge answered with a non-success status.
    #[error("forge API error ({status}): {message}")]
    Api {
        /// HTTP status code returned by the forge.
        status: u16,
        /// Error body/message.
        message: String,
    },

    /// A forge payload could not be decoded.
    #[error("failed to decode forge payload: {0}")]
    Decode(String),

    /// Patch-model assembly failed (malformed diff text, structured-config
    /// parse failure, malformed front matter).
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// Invalid adapter configuration.
    #[error("source configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}
