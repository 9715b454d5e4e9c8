//! File-content lookup seam.

use crate::error::SourceError;

/// Fetches file text at a specific ref so object diffs can be computed.
///
/// Each adapter implements this against its forge's contents endpoint; the
/// seam keeps patch assembly testable with an in-memory map.
#[async_trait::async_trait]
pub trait FileContents: Send + Sync {
    /// Return the full text of `path` at `reference` (a branch name or
    /// commit hash, depending on the adapter).
    async fn file_at(&self, reference: &str, path: &str) -> Result<String, SourceError>;
}
