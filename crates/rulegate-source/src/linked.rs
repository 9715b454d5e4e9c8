//! Linked-PR resolution.
//!
//! The front-matter header of a PR description may declare pull requests
//! the change set depends on. This module resolves those references into
//! [`LinkedPr`] records by querying the forge for each one's state.

use rulegate_patch::{linked_pr_refs, LinkedPr};

use crate::error::SourceError;

/// Merge/close state of a pull request as reported by a forge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkedPrState {
    /// Whether the PR has been merged.
    pub is_merged: bool,
    /// Whether the PR is closed (merged PRs are always closed).
    pub is_closed: bool,
}

/// Looks up the state of a pull request by repository and number.
#[async_trait::async_trait]
pub trait PrLookup: Send + Sync {
    /// Return the state of `pr_num` in `repo`; an empty `repo` means the
    /// host repository of the change set being assembled.
    async fn linked_pr_state(&self, repo: &str, pr_num: u64)
        -> Result<LinkedPrState, SourceError>;
}

/// Resolve the front-matter references in `description` into linked-PR
/// records, in declaration order.
pub async fn resolve_linked_prs(
    description: &str,
    lookup: &dyn PrLookup,
) -> Result<Vec<LinkedPr>, SourceError> {
    let refs = linked_pr_refs(description)?;

    let mut linked = Vec::with_capacity(refs.len());
    for entry in refs {
        let repo = entry.repo.unwrap_or_default();
        let state = lookup.linked_pr_state(&repo, entry.pr_num).await?;
        linked.push(LinkedPr::new(
            repo,
            entry.pr_num,
            state.is_merged,
            state.is_closed,
        ));
    }

    Ok(linked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FixedLookup {
        states: HashMap<(String, u64), LinkedPrState>,
    }

    #[async_trait::async_trait]
    impl PrLookup for FixedLookup {
        async fn linked_pr_state(
            &self,
            repo: &str,
            pr_num: u64,
        ) -> Result<LinkedPrState, SourceError> {
            self.states
                .get(&(repo.to_string(), pr_num))
                .copied()
                .ok_or_else(|| SourceError::Api {
                    status: 404,
                    message: format!("no such PR: {repo}#{pr_num}"),
                })
        }
    }

    #[tokio::test]
    async fn merged_linked_pr_reports_merged_and_closed() {
        let lookup = FixedLookup {
            states: HashMap::from([(
                (String::new(), 41),
                LinkedPrState {
                    is_merged: true,
                    is_closed: true,
                },
            )]),
        };
        let body = "---\nfensak:\n  linked:\n    - prNum: 41\n---\nDepends on #41.\n";

        let linked = resolve_linked_prs(body, &lookup).await.unwrap();
        assert_eq!(linked, vec![LinkedPr::new("", 41, true, true)]);
    }

    #[tokio::test]
    async fn cross_repo_reference_keeps_repo_name() {
        let lookup = FixedLookup {
            states: HashMap::from([(
                ("octo/library".to_string(), 9),
                LinkedPrState {
                    is_merged: false,
                    is_closed: false,
                },
            )]),
        };
        let body = "---\nfensak:\n  linked:\n    - prNum: 9\n      repo: octo/library\n---\n";

        let linked = resolve_linked_prs(body, &lookup).await.unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].repo, "octo/library");
        assert!(!linked[0].is_closed);
    }

    #[tokio::test]
    async fn no_front_matter_resolves_to_empty() {
        let lookup = FixedLookup {
            states: HashMap::new(),
        };

        let linked = resolve_linked_prs("Plain description.", &lookup).await.unwrap();
        assert!(linked.is_empty());
    }

    #[tokio::test]
    async fn lookup_failure_propagates() {
        let lookup = FixedLookup {
            states: HashMap::new(),
        };
        let body = "---\nfensak:\n  linked:\n    - prNum: 404\n---\n";

        let err = resolve_linked_prs(body, &lookup).await.unwrap_err();
        assert!(matches!(err, SourceError::Api { status: 404, .. }));
    }
}
