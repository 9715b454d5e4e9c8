//! Canonical sum types for change sets.
//!
//! Serialized field names are camelCase because the serialized form is what
//! rule programs receive through the sandbox bridge.

use serde::{Deserialize, Serialize};

/// Classification of a single line within a hunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineOp {
    /// Not recognized (forward compatibility).
    #[default]
    Unknown,
    /// Line added in the updated file.
    Insert,
    /// Line removed from the original file.
    Delete,
    /// Line changed in place (a paired delete/insert).
    Modified,
    /// Context line carried unchanged around the edits.
    Untouched,
}

/// One line of a hunk.
///
/// `new_text` is non-empty only for [`LineOp::Modified`]; for every other op
/// it is the empty string. `Insert` content and `Delete` content both live
/// in `text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineDiff {
    /// What happened to this line.
    pub op: LineOp,
    /// Line content (original content for `Delete`/`Modified`/`Untouched`,
    /// inserted content for `Insert`).
    pub text: String,
    /// Replacement content, only for `Modified`.
    pub new_text: String,
}

impl LineDiff {
    /// An inserted line.
    pub fn insert(text: impl Into<String>) -> Self {
        Self {
            op: LineOp::Insert,
            text: text.into(),
            new_text: String::new(),
        }
    }

    /// A deleted line.
    pub fn delete(text: impl Into<String>) -> Self {
        Self {
            op: LineOp::Delete,
            text: text.into(),
            new_text: String::new(),
        }
    }

    /// An in-place modification.
    pub fn modified(text: impl Into<String>, new_text: impl Into<String>) -> Self {
        Self {
            op: LineOp::Modified,
            text: text.into(),
            new_text: new_text.into(),
        }
    }

    /// An unchanged context line.
    pub fn untouched(text: impl Into<String>) -> Self {
        Self {
            op: LineOp::Untouched,
            text: text.into(),
            new_text: String::new(),
        }
    }
}

/// A contiguous region of a unified diff.
///
/// Position invariants: `original_start >= 1` when `original_length > 0`
/// and 0 otherwise; likewise for the updated side. The count of operations
/// touching the original file (`Delete`/`Modified`/`Untouched`) equals
/// `original_length`, and the count touching the updated file
/// (`Insert`/`Modified`/`Untouched`) equals `updated_length`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hunk {
    /// First line of the region in the original file (1-based, 0 when the
    /// original side is empty).
    pub original_start: u32,
    /// Number of original-file lines covered.
    pub original_length: u32,
    /// First line of the region in the updated file (1-based, 0 when the
    /// updated side is empty).
    pub updated_start: u32,
    /// Number of updated-file lines covered.
    pub updated_length: u32,
    /// Per-line operations in source order.
    pub diff_operations: Vec<LineDiff>,
}

/// What happened to a file in the change set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    /// Not recognized (forward compatibility).
    #[default]
    Unknown,
    /// File was added.
    Insert,
    /// File was removed.
    Delete,
    /// File contents changed.
    Modified,
}

/// One step of an object-diff path: a map key or a sequence index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathStep {
    /// Positional index into a sequence.
    Index(usize),
    /// Key into a map.
    Key(String),
}

impl From<&str> for PathStep {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<usize> for PathStep {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// Kind of a single structural change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    /// A key/element exists only in the current tree.
    Create,
    /// A key/element exists only in the previous tree.
    Remove,
    /// A value differs between the trees.
    Change,
}

/// A single entry of an object-level diff.
///
/// `Create` carries `value` only, `Remove` carries `old_value` only, and
/// `Change` carries both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectChange {
    /// Kind of change.
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    /// Key path from the tree root to the changed value.
    pub path: Vec<PathStep>,
    /// New value (`Create`/`Change`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Prior value (`Remove`/`Change`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<serde_json::Value>,
}

impl ObjectChange {
    /// A value that exists only in the current tree.
    pub fn create(path: Vec<PathStep>, value: serde_json::Value) -> Self {
        Self {
            change_type: ChangeType::Create,
            path,
            value: Some(value),
            old_value: None,
        }
    }

    /// A value that exists only in the previous tree.
    pub fn remove(path: Vec<PathStep>, old_value: serde_json::Value) -> Self {
        Self {
            change_type: ChangeType::Remove,
            path,
            value: None,
            old_value: Some(old_value),
        }
    }

    /// A value that differs between the trees.
    pub fn change(
        path: Vec<PathStep>,
        old_value: serde_json::Value,
        value: serde_json::Value,
    ) -> Self {
        Self {
            change_type: ChangeType::Change,
            path,
            value: Some(value),
            old_value: Some(old_value),
        }
    }
}

/// Object-level diff of a structured configuration file.
///
/// For an inserted file `previous` is `None` and `diff` is empty; for a
/// deleted file `current` is `None` and `diff` is empty; for a modified
/// file both trees are present and `diff` enumerates the changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDiff {
    /// Parsed tree at the base ref.
    pub previous: Option<serde_json::Value>,
    /// Parsed tree at the head ref.
    pub current: Option<serde_json::Value>,
    /// Changes that transform `previous` into `current`.
    pub diff: Vec<ObjectChange>,
}

/// One file's changes within a pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    /// Repository-relative file path.
    pub path: String,
    /// What happened to the file.
    pub op: PatchOp,
    /// Added line count as reported by the forge (0 when unavailable).
    pub additions: u32,
    /// Removed line count as reported by the forge (0 when unavailable).
    pub deletions: u32,
    /// Line-level hunks in file order.
    pub diff: Vec<Hunk>,
    /// Object-level diff, present only for recognized structured
    /// configuration files.
    pub object_diff: Option<ObjectDiff>,
}

/// A pull request referenced from the change set's front matter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedPr {
    /// Repository the linked PR lives in; empty means the same repository
    /// as the host change set.
    pub repo: String,
    /// Pull request number.
    pub pr_num: u64,
    /// Whether the linked PR has been merged.
    pub is_merged: bool,
    /// Whether the linked PR is closed (always true when merged).
    pub is_closed: bool,
}

impl LinkedPr {
    /// Construct a linked-PR record, upholding `is_merged ⇒ is_closed`.
    pub fn new(repo: impl Into<String>, pr_num: u64, is_merged: bool, is_closed: bool) -> Self {
        Self {
            repo: repo.into(),
            pr_num,
            is_merged,
            is_closed: is_closed || is_merged,
        }
    }
}

/// Branch and cross-PR metadata for a change set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSetMetadata {
    /// Branch the change set was authored on.
    pub source_branch: String,
    /// Branch the change set targets.
    pub target_branch: String,
    /// Pull requests declared as dependencies in the PR description.
    #[serde(rename = "linkedPRs")]
    pub linked_prs: Vec<LinkedPr>,
}

/// The normalized change set handed to the rule engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestPatches {
    /// Branch and linked-PR metadata.
    pub metadata: ChangeSetMetadata,
    /// One patch per changed file, in forge listing order.
    pub patch_list: Vec<Patch>,
}
