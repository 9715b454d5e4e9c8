#![warn(missing_docs)]

//! # rulegate-patch
//!
//! Canonical patch model for the rulegate approval engine.
//!
//! A pull-request change set is normalized into [`PullRequestPatches`]: one
//! [`Patch`] per changed file (line-level hunks plus, for structured
//! configuration files, an object-level diff) together with
//! [`ChangeSetMetadata`] describing the branches and any linked pull
//! requests declared in the PR description's front matter.
//!
//! The model is the contract between the source adapters (which assemble it
//! from forge APIs) and the rule engine (which serializes it into the
//! sandbox). Every type here is immutable once constructed and serializes
//! to the exact camelCase JSON shape rule programs observe.

pub mod error;
pub mod frontmatter;
pub mod objdiff;
pub mod types;
pub mod unified;

pub use error::PatchError;
pub use frontmatter::{linked_pr_refs, LinkedPrRef};
pub use objdiff::{diff_trees, object_diff_for, parse_tree, ConfigFormat};
pub use types::{
    ChangeSetMetadata, ChangeType, Hunk, LineDiff, LineOp, LinkedPr, ObjectChange, ObjectDiff,
    Patch, PatchOp, PathStep, PullRequestPatches,
};
pub use unified::parse_unified_diff;
