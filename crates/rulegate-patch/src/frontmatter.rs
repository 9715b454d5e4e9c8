//! Front-matter parsing for PR descriptions.
//!
//! A description may open with a `---`-delimited YAML header. When that
//! header carries a `fensak.linked` sequence, each entry names a pull
//! request the change set depends on. Resolution of those references
//! against a forge happens in the source adapters; this module only
//! extracts them.

use serde::Deserialize;

use crate::error::PatchError;

const FRONT_MATTER_DELIMITER: &str = "---";

/// An unresolved linked-PR reference from front matter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedPrRef {
    /// Pull request number (always >= 1).
    pub pr_num: u64,
    /// Repository of the linked PR; `None` means the host repository.
    pub repo: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FensakHeader {
    linked: Option<Vec<LinkedEntry>>,
}

#[derive(Debug, Deserialize)]
struct LinkedEntry {
    #[serde(rename = "prNum")]
    pr_num: u64,
    #[serde(default)]
    repo: Option<String>,
}

/// Extract the `fensak.linked` references from a PR description.
///
/// Absent front matter, front matter that is not valid YAML, and front
/// matter without a `fensak` key all yield an empty list. A `fensak` block
/// that is present but lacks a well-formed `linked` sequence fails with
/// [`PatchError::MalformedFrontMatter`].
pub fn linked_pr_refs(description: &str) -> Result<Vec<LinkedPrRef>, PatchError> {
    let Some(yaml) = extract_front_matter(description) else {
        return Ok(Vec::new());
    };

    let Ok(document) = serde_yml::from_str::<serde_yml::Value>(yaml) else {
        // An unparseable header is treated the same as no header.
        return Ok(Vec::new());
    };

    let Some(fensak) = document.get("fensak") else {
        return Ok(Vec::new());
    };

    let header: FensakHeader =
        serde_yml::from_value(fensak.clone()).map_err(|e| PatchError::MalformedFrontMatter {
            reason: e.to_string(),
        })?;

    let entries = header
        .linked
        .ok_or_else(|| PatchError::MalformedFrontMatter {
            reason: "`fensak` header is missing the `linked` sequence".into(),
        })?;

    entries
        .into_iter()
        .map(|entry| {
            if entry.pr_num == 0 {
                return Err(PatchError::MalformedFrontMatter {
                    reason: "`prNum` must be a positive integer".into(),
                });
            }
            Ok(LinkedPrRef {
                pr_num: entry.pr_num,
                repo: entry.repo,
            })
        })
        .collect()
}

fn strip_line_ending(s: &str) -> &str {
    s.strip_prefix("\r\n")
        .or_else(|| s.strip_prefix('\n'))
        .unwrap_or(s)
}

/// Return the YAML body between the leading and closing `---` lines, or
/// `None` when the description carries no front matter.
fn extract_front_matter(description: &str) -> Option<&str> {
    let trimmed = description.trim_start();
    if !trimmed.starts_with(FRONT_MATTER_DELIMITER) {
        return None;
    }

    let after_opening = strip_line_ending(&trimmed[FRONT_MATTER_DELIMITER.len()..]);

    let closing = if after_opening.starts_with(FRONT_MATTER_DELIMITER) {
        0
    } else if let Some(pos) = after_opening.find("\r\n---") {
        pos + 2
    } else if let Some(pos) = after_opening.find("\n---") {
        pos + 1
    } else {
        return None;
    };

    Some(after_opening[..closing].trim_end_matches('\r'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_linked_pr() {
        let body = "---\nfensak:\n  linked:\n    - prNum: 41\n---\nImplements the follow-up.\n";

        let refs = linked_pr_refs(body).unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].pr_num, 41);
        assert_eq!(refs[0].repo, None);
    }

    #[test]
    fn extracts_cross_repo_reference() {
        let body = "---\nfensak:\n  linked:\n    - prNum: 9\n      repo: octo/library\n    - prNum: 12\n---\n";

        let refs = linked_pr_refs(body).unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].repo.as_deref(), Some("octo/library"));
        assert_eq!(refs[1].pr_num, 12);
        assert_eq!(refs[1].repo, None);
    }

    #[test]
    fn no_front_matter_is_empty() {
        assert!(linked_pr_refs("Just a normal description.").unwrap().is_empty());
        assert!(linked_pr_refs("").unwrap().is_empty());
    }

    #[test]
    fn front_matter_without_fensak_key_is_empty() {
        let body = "---\ntitle: release notes\n---\nBody text.\n";
        assert!(linked_pr_refs(body).unwrap().is_empty());
    }

    #[test]
    fn unparseable_front_matter_is_empty() {
        let body = "---\n: [ not yaml\n---\nBody.\n";
        assert!(linked_pr_refs(body).unwrap().is_empty());
    }

    #[test]
    fn missing_closing_delimiter_is_empty() {
        let body = "---\nfensak:\n  linked:\n    - prNum: 41\nno closing line";
        assert!(linked_pr_refs(body).unwrap().is_empty());
    }

    #[test]
    fn fensak_without_linked_is_malformed() {
        let body = "---\nfensak:\n  requiredApprovals: 2\n---\n";

        let err = linked_pr_refs(body).unwrap_err();
        assert!(matches!(err, PatchError::MalformedFrontMatter { .. }));
        assert!(err.to_string().contains("linked"));
    }

    #[test]
    fn misshapen_linked_entry_is_malformed() {
        let body = "---\nfensak:\n  linked:\n    - prNum: not-a-number\n---\n";

        let err = linked_pr_refs(body).unwrap_err();
        assert!(matches!(err, PatchError::MalformedFrontMatter { .. }));
    }

    #[test]
    fn zero_pr_number_is_malformed() {
        let body = "---\nfensak:\n  linked:\n    - prNum: 0\n---\n";

        let err = linked_pr_refs(body).unwrap_err();
        assert!(matches!(err, PatchError::MalformedFrontMatter { .. }));
    }

    #[test]
    fn windows_line_endings() {
        let body = "---\r\nfensak:\r\n  linked:\r\n    - prNum: 7\r\n---\r\nBody.\r\n";

        let refs = linked_pr_refs(body).unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].pr_num, 7);
    }

    #[test]
    fn delimiter_later_in_body_is_ignored() {
        let body = "Summary first.\n---\nfensak:\n  linked:\n    - prNum: 3\n---\n";
        // Front matter must open the description.
        assert!(linked_pr_refs(body).unwrap().is_empty());
    }
}
