#![warn(missing_docs)]

//! # rulegate-source
//!
//! Forge source adapters for the rulegate approval engine.
//!
//! Each adapter normalizes one forge's representation of a pull request
//! into the canonical [`PullRequestPatches`] model:
//!
//! - [`GitHubSource`] consumes a REST API that lists changed files with an
//!   embedded per-file unified diff.
//! - [`BitbucketSource`] consumes an API that returns one concatenated
//!   unified-diff blob which must be split per file.
//!
//! Both resolve the `fensak.linked` front-matter references in the PR
//! description into [`rulegate_patch::LinkedPr`] records, and both fetch
//! file contents at the base/head refs to compute object diffs for
//! structured configuration files. Adapters hold no state across calls
//! and never retry; failures surface as [`SourceError`].

pub mod bitbucket;
pub mod config;
pub mod content;
pub mod error;
pub mod github;
pub mod linked;

use rulegate_patch::PullRequestPatches;

pub use bitbucket::BitbucketSource;
pub use config::{BitbucketConfig, GitHubConfig, SourceConfig};
pub use content::FileContents;
pub use error::SourceError;
pub use github::GitHubSource;
pub use linked::{resolve_linked_prs, LinkedPrState, PrLookup};

/// A forge adapter that can assemble the normalized change set for one
/// pull request.
#[async_trait::async_trait]
pub trait PatchSource: Send + Sync {
    /// Fetch and normalize the change set of `pr_number`.
    async fn pull_request_patches(
        &self,
        pr_number: u64,
    ) -> Result<PullRequestPatches, SourceError>;
}
