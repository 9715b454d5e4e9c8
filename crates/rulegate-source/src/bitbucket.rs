//! Combined-diff source adapter (Bitbucket-shaped API).
//!
//! The forge returns one concatenated unified-diff blob for the whole pull
//! request. The adapter splits it at each `diff --git` boundary, harvests
//! the source/target paths from the `---`/`+++` header lines (with
//! `/dev/null` signaling an insert or delete), and fetches file contents
//! by commit hash for object diffs. Addition/deletion counts are not
//! exposed by this forge and are reported as 0.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use rulegate_patch::{
    object_diff_for, parse_unified_diff, ChangeSetMetadata, ConfigFormat, ObjectDiff, Patch,
    PatchOp, PullRequestPatches,
};

use crate::content::FileContents;
use crate::error::SourceError;
use crate::linked::{resolve_linked_prs, LinkedPrState, PrLookup};
use crate::PatchSource;

const DEV_NULL: &str = "/dev/null";

/// Source adapter for a combined-diff forge.
pub struct BitbucketSource {
    repo: String,
    api_base_url: String,
    token: Option<SecretString>,
    http: reqwest::Client,
}

impl BitbucketSource {
    /// Create an adapter against the public API endpoint.
    pub fn new(repo: impl Into<String>, token: Option<SecretString>) -> Result<Self, SourceError> {
        Self::with_api_base_url(repo, token, "https://api.bitbucket.org")
    }

    /// Create an adapter from a loaded [`crate::config::BitbucketConfig`]
    /// section.
    pub fn from_config(config: &crate::config::BitbucketConfig) -> Result<Self, SourceError> {
        let token = config.token.clone().map(SecretString::from);
        Self::with_api_base_url(config.repo.clone(), token, config.api_base_url.clone())
    }

    /// Create an adapter against an explicit API base URL.
    pub fn with_api_base_url(
        repo: impl Into<String>,
        token: Option<SecretString>,
        api_base_url: impl Into<String>,
    ) -> Result<Self, SourceError> {
        let repo = repo.into();
        if repo.split('/').filter(|part| !part.is_empty()).count() != 2 {
            return Err(SourceError::Configuration(format!(
                "repository must be 'workspace/name', got '{repo}'"
            )));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(60))
            .user_agent("rulegate-source/bitbucket")
            .build()
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        Ok(Self {
            repo,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            token,
            http,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    async fn get_text(&self, url: &str) -> Result<String, SourceError> {
        let response = self.authorize(self.http.get(url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".to_string());
            return Err(SourceError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.text().await?)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, SourceError> {
        let response = self.authorize(self.http.get(url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".to_string());
            return Err(SourceError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<T>().await?)
    }

    async fn pr_record(&self, repo: &str, pr_number: u64) -> Result<BitbucketPr, SourceError> {
        self.get_json(&format!(
            "{}/2.0/repositories/{repo}/pullrequests/{pr_number}",
            self.api_base_url
        ))
        .await
    }
}

#[async_trait::async_trait]
impl FileContents for BitbucketSource {
    async fn file_at(&self, reference: &str, path: &str) -> Result<String, SourceError> {
        self.get_text(&format!(
            "{}/2.0/repositories/{}/src/{reference}/{path}",
            self.api_base_url, self.repo
        ))
        .await
    }
}

#[async_trait::async_trait]
impl PrLookup for BitbucketSource {
    async fn linked_pr_state(
        &self,
        repo: &str,
        pr_num: u64,
    ) -> Result<LinkedPrState, SourceError> {
        let repo = if repo.is_empty() { &self.repo } else { repo };
        let record = self.pr_record(repo, pr_num).await?;
        Ok(pr_state_from_record(record.state.as_deref().unwrap_or("")))
    }
}

#[async_trait::async_trait]
impl PatchSource for BitbucketSource {
    async fn pull_request_patches(
        &self,
        pr_number: u64,
    ) -> Result<PullRequestPatches, SourceError> {
        tracing::info!(repo = %self.repo, pr = pr_number, "assembling change set (combined-diff)");

        let record = self.pr_record(&self.repo, pr_number).await?;
        let description = record
            .rendered
            .as_ref()
            .map(|r| r.description.raw.as_str())
            .unwrap_or_default();
        let linked_prs = resolve_linked_prs(description, self).await?;

        let diff_text = self.get_text(&record.links.diff.href).await?;
        let patch_list = patches_from_combined_diff(
            &diff_text,
            &record.destination.commit.hash,
            &record.source.commit.hash,
            self,
        )
        .await?;

        Ok(PullRequestPatches {
            metadata: ChangeSetMetadata {
                source_branch: record.source.branch.name,
                target_branch: record.destination.branch.name,
                linked_prs,
            },
            patch_list,
        })
    }
}

/// Merge/close state from the forge's PR state verb.
fn pr_state_from_record(state: &str) -> LinkedPrState {
    let is_merged = state == "MERGED";
    LinkedPrState {
        is_merged,
        is_closed: is_merged || state == "DECLINED" || state == "SUPERSEDED",
    }
}

/// One per-file section of a combined diff.
#[derive(Debug, PartialEq, Eq)]
struct DiffChunk {
    /// Path from the `--- a/<path>` line, `None` for `/dev/null`, falling
    /// back to the `diff --git` header for bare rename chunks.
    old_path: Option<String>,
    /// Path from the `+++ b/<path>` line, same conventions.
    new_path: Option<String>,
    /// The chunk's text, fed unchanged to the hunk parser.
    body: String,
}

/// Split a combined diff at each `diff --git a/<o> b/<t>` boundary.
fn split_combined_diff(text: &str) -> Vec<DiffChunk> {
    let mut chunks = Vec::new();
    let mut header: Option<(Option<String>, Option<String>)> = None;
    // Outer None: no `---`/`+++` line seen yet (fall back to the header);
    // inner None: the line was `/dev/null`.
    let mut old_path: Option<Option<String>> = None;
    let mut new_path: Option<Option<String>> = None;
    let mut body = String::new();
    let mut in_chunk = false;
    let mut seen_hunk = false;

    for raw in text.split('\n') {
        let line = raw.strip_suffix('\r').unwrap_or(raw);

        if let Some(rest) = line.strip_prefix("diff --git ") {
            if in_chunk {
                finish_chunk(&mut header, &mut old_path, &mut new_path, &mut body, &mut chunks);
            }
            in_chunk = true;
            seen_hunk = false;
            header = Some(parse_git_header(rest));
            continue;
        }

        if !in_chunk {
            continue;
        }

        if line.starts_with("@@") {
            seen_hunk = true;
        }

        // Path markers are only headers before the first hunk; the same
        // prefixes inside a hunk body are diff content.
        if !seen_hunk {
            if let Some(rest) = line.strip_prefix("--- ") {
                old_path = Some(strip_diff_path(rest, "a/"));
            } else if let Some(rest) = line.strip_prefix("+++ ") {
                new_path = Some(strip_diff_path(rest, "b/"));
            }
        }

        body.push_str(line);
        body.push('\n');
    }

    if in_chunk {
        finish_chunk(&mut header, &mut old_path, &mut new_path, &mut body, &mut chunks);
    }

    chunks
}

/// Close out the chunk being accumulated, falling back to the `diff
/// --git` header paths when no `---`/`+++` lines were seen.
fn finish_chunk(
    header: &mut Option<(Option<String>, Option<String>)>,
    old_path: &mut Option<Option<String>>,
    new_path: &mut Option<Option<String>>,
    body: &mut String,
    chunks: &mut Vec<DiffChunk>,
) {
    let (header_old, header_new) = header.take().unwrap_or((None, None));
    chunks.push(DiffChunk {
        old_path: old_path.take().unwrap_or(header_old),
        new_path: new_path.take().unwrap_or(header_new),
        body: std::mem::take(body),
    });
}

/// Parse `a/<old> b/<new>` from a `diff --git` header.
fn parse_git_header(rest: &str) -> (Option<String>, Option<String>) {
    let Some((old, new)) = rest.split_once(" b/") else {
        return (None, None);
    };
    let old = old.strip_prefix("a/").map(str::to_string);
    (old, Some(new.to_string()))
}

/// Interpret a `---`/`+++` header path: `/dev/null` means no file on that
/// side; otherwise strip the `a/`/`b/` prefix.
fn strip_diff_path(path: &str, prefix: &str) -> Option<String> {
    if path == DEV_NULL {
        None
    } else {
        Some(path.strip_prefix(prefix).unwrap_or(path).to_string())
    }
}

/// Compute the object diff for one chunk, fetching by commit hash only
/// when the path is recognized as structured configuration.
async fn fetch_object_diff(
    op: PatchOp,
    path: &str,
    base_path: &str,
    base_hash: &str,
    head_hash: &str,
    contents: &dyn FileContents,
) -> Result<Option<ObjectDiff>, SourceError> {
    if ConfigFormat::from_path(path).is_none() {
        return Ok(None);
    }

    let base_text = match op {
        PatchOp::Delete | PatchOp::Modified => {
            Some(contents.file_at(base_hash, base_path).await?)
        }
        _ => None,
    };
    let head_text = match op {
        PatchOp::Insert | PatchOp::Modified => Some(contents.file_at(head_hash, path).await?),
        _ => None,
    };

    Ok(object_diff_for(
        op,
        path,
        base_text.as_deref(),
        head_text.as_deref(),
    )?)
}

/// Convert a combined diff blob into patches, in blob order.
///
/// Renames expand into `Delete(old)`, `Insert(new)`, plus a third
/// `Modified(new)` record when the chunk carries hunks; the Delete/Insert
/// halves carry empty hunks and no object diff. This forge exposes no
/// addition/deletion counts, so both report 0.
async fn patches_from_combined_diff(
    diff_text: &str,
    base_hash: &str,
    head_hash: &str,
    contents: &dyn FileContents,
) -> Result<Vec<Patch>, SourceError> {
    let mut patches = Vec::new();

    for chunk in split_combined_diff(diff_text) {
        let hunks = parse_unified_diff(&chunk.body)?;

        match (chunk.old_path, chunk.new_path) {
            (None, Some(path)) => {
                let object_diff =
                    fetch_object_diff(PatchOp::Insert, &path, &path, base_hash, head_hash, contents)
                        .await?;
                patches.push(Patch {
                    path,
                    op: PatchOp::Insert,
                    additions: 0,
                    deletions: 0,
                    diff: hunks,
                    object_diff,
                });
            }
            (Some(path), None) => {
                let object_diff =
                    fetch_object_diff(PatchOp::Delete, &path, &path, base_hash, head_hash, contents)
                        .await?;
                patches.push(Patch {
                    path,
                    op: PatchOp::Delete,
                    additions: 0,
                    deletions: 0,
                    diff: hunks,
                    object_diff,
                });
            }
            (Some(old_path), Some(new_path)) if old_path != new_path => {
                patches.push(Patch {
                    path: old_path.clone(),
                    op: PatchOp::Delete,
                    additions: 0,
                    deletions: 0,
                    diff: Vec::new(),
                    object_diff: None,
                });
                patches.push(Patch {
                    path: new_path.clone(),
                    op: PatchOp::Insert,
                    additions: 0,
                    deletions: 0,
                    diff: Vec::new(),
                    object_diff: None,
                });
                if !hunks.is_empty() {
                    let object_diff = fetch_object_diff(
                        PatchOp::Modified,
                        &new_path,
                        &old_path,
                        base_hash,
                        head_hash,
                        contents,
                    )
                    .await?;
                    patches.push(Patch {
                        path: new_path,
                        op: PatchOp::Modified,
                        additions: 0,
                        deletions: 0,
                        diff: hunks,
                        object_diff,
                    });
                }
            }
            (Some(path), Some(_)) => {
                let object_diff = fetch_object_diff(
                    PatchOp::Modified,
                    &path,
                    &path,
                    base_hash,
                    head_hash,
                    contents,
                )
                .await?;
                patches.push(Patch {
                    path,
                    op: PatchOp::Modified,
                    additions: 0,
                    deletions: 0,
                    diff: hunks,
                    object_diff,
                });
            }
            (None, None) => {
                return Err(SourceError::InconsistentForgeResponse {
                    reason: "diff chunk names no file on either side".into(),
                });
            }
        }
    }

    Ok(patches)
}

#[derive(Debug, Deserialize)]
struct BitbucketBranch {
    name: String,
}

#[derive(Debug, Deserialize)]
struct BitbucketCommit {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct BitbucketEndpoint {
    branch: BitbucketBranch,
    commit: BitbucketCommit,
}

#[derive(Debug, Deserialize)]
struct BitbucketRenderedText {
    raw: String,
}

#[derive(Debug, Deserialize)]
struct BitbucketRendered {
    description: BitbucketRenderedText,
}

#[derive(Debug, Deserialize)]
struct BitbucketHref {
    href: String,
}

#[derive(Debug, Deserialize)]
struct BitbucketLinks {
    diff: BitbucketHref,
}

#[derive(Debug, Deserialize)]
struct BitbucketPr {
    source: BitbucketEndpoint,
    destination: BitbucketEndpoint,
    rendered: Option<BitbucketRendered>,
    links: BitbucketLinks,
    state: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rulegate_patch::LineOp;
    use std::collections::HashMap;

    struct MapContents {
        files: HashMap<(String, String), String>,
    }

    impl MapContents {
        fn new(entries: &[(&str, &str, &str)]) -> Self {
            Self {
                files: entries
                    .iter()
                    .map(|(r, p, text)| ((r.to_string(), p.to_string()), text.to_string()))
                    .collect(),
            }
        }
    }

    #[async_trait::async_trait]
    impl FileContents for MapContents {
        async fn file_at(&self, reference: &str, path: &str) -> Result<String, SourceError> {
            self.files
                .get(&(reference.to_string(), path.to_string()))
                .cloned()
                .ok_or_else(|| SourceError::Api {
                    status: 404,
                    message: format!("no content for {path}@{reference}"),
                })
        }
    }

    const TWO_FILE_DIFF: &str = "diff --git a/README.md b/README.md\n--- a/README.md\n+++ b/README.md\n@@ -1,3 +1,5 @@\n # Title\n \n body\n+\n+trailer\ndiff --git a/versions.toml b/versions.toml\n--- a/versions.toml\n+++ b/versions.toml\n@@ -1,3 +1,3 @@\n-coreapp = \"v0.1.0\"\n+coreapp = \"v0.2.0\"\n second = true\n third = false\n";

    #[test]
    fn splits_at_each_file_boundary() {
        let chunks = split_combined_diff(TWO_FILE_DIFF);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].old_path.as_deref(), Some("README.md"));
        assert_eq!(chunks[0].new_path.as_deref(), Some("README.md"));
        assert_eq!(chunks[1].old_path.as_deref(), Some("versions.toml"));
        assert!(chunks[0].body.contains("@@ -1,3 +1,5 @@"));
        assert!(!chunks[0].body.contains("versions.toml"));
    }

    #[test]
    fn dev_null_marks_missing_side() {
        let diff = "diff --git a/new.txt b/new.txt\n--- /dev/null\n+++ b/new.txt\n@@ -0,0 +1,1 @@\n+hello\n";

        let chunks = split_combined_diff(diff);
        assert_eq!(chunks[0].old_path, None);
        assert_eq!(chunks[0].new_path.as_deref(), Some("new.txt"));
    }

    #[test]
    fn bare_rename_falls_back_to_git_header() {
        // similarity-100% renames carry no ---/+++ lines
        let diff = "diff --git a/old/name.md b/new/name.md\nsimilarity index 100%\nrename from old/name.md\nrename to new/name.md\n";

        let chunks = split_combined_diff(diff);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].old_path.as_deref(), Some("old/name.md"));
        assert_eq!(chunks[0].new_path.as_deref(), Some("new/name.md"));
    }

    #[tokio::test]
    async fn modified_toml_first_line_change() {
        let contents = MapContents::new(&[
            (
                "base-hash",
                "versions.toml",
                "coreapp = \"v0.1.0\"\nsecond = true\nthird = false\n",
            ),
            (
                "head-hash",
                "versions.toml",
                "coreapp = \"v0.2.0\"\nsecond = true\nthird = false\n",
            ),
        ]);

        let patches =
            patches_from_combined_diff(TWO_FILE_DIFF, "base-hash", "head-hash", &contents)
                .await
                .unwrap();

        assert_eq!(patches.len(), 2);

        // Markdown append: 3 untouched + 2 inserts, no object diff, zero counts.
        let readme = &patches[0];
        assert_eq!(readme.op, PatchOp::Modified);
        assert_eq!((readme.additions, readme.deletions), (0, 0));
        let ops: Vec<LineOp> = readme.diff[0].diff_operations.iter().map(|d| d.op).collect();
        assert_eq!(
            ops,
            vec![
                LineOp::Untouched,
                LineOp::Untouched,
                LineOp::Untouched,
                LineOp::Insert,
                LineOp::Insert
            ]
        );
        assert!(readme.object_diff.is_none());

        // TOML first-line change: Modified at position 0, then 2 untouched.
        let toml_patch = &patches[1];
        let ops: Vec<LineOp> = toml_patch.diff[0]
            .diff_operations
            .iter()
            .map(|d| d.op)
            .collect();
        assert_eq!(
            ops,
            vec![LineOp::Modified, LineOp::Untouched, LineOp::Untouched]
        );
        let object_diff = toml_patch.object_diff.as_ref().unwrap();
        assert_eq!(object_diff.diff.len(), 1);
        assert_eq!(object_diff.diff[0].value, Some(serde_json::json!("v0.2.0")));
    }

    #[tokio::test]
    async fn insert_and_delete_from_dev_null() {
        let diff = "diff --git a/added.json b/added.json\n--- /dev/null\n+++ b/added.json\n@@ -0,0 +1,1 @@\n+{\"on\": true}\ndiff --git a/gone.txt b/gone.txt\n--- a/gone.txt\n+++ /dev/null\n@@ -1,1 +0,0 @@\n-bye\n";
        let contents = MapContents::new(&[("head-hash", "added.json", "{\"on\": true}\n")]);

        let patches = patches_from_combined_diff(diff, "base-hash", "head-hash", &contents)
            .await
            .unwrap();

        assert_eq!(patches.len(), 2);
        assert_eq!((patches[0].op, patches[0].path.as_str()), (PatchOp::Insert, "added.json"));
        let object_diff = patches[0].object_diff.as_ref().unwrap();
        assert!(object_diff.previous.is_none());
        assert_eq!(object_diff.current, Some(serde_json::json!({"on": true})));

        assert_eq!((patches[1].op, patches[1].path.as_str()), (PatchOp::Delete, "gone.txt"));
        assert!(patches[1].object_diff.is_none());
    }

    #[tokio::test]
    async fn rename_with_content_diff_emits_three_patches() {
        let diff = "diff --git a/app.yaml b/conf/app.yaml\n--- a/app.yaml\n+++ b/conf/app.yaml\n@@ -1,1 +1,1 @@\n-replicas: 2\n+replicas: 3\n";
        let contents = MapContents::new(&[
            ("base-hash", "app.yaml", "replicas: 2\n"),
            ("head-hash", "conf/app.yaml", "replicas: 3\n"),
        ]);

        let patches = patches_from_combined_diff(diff, "base-hash", "head-hash", &contents)
            .await
            .unwrap();

        assert_eq!(patches.len(), 3);
        assert_eq!((patches[0].op, patches[0].path.as_str()), (PatchOp::Delete, "app.yaml"));
        assert_eq!(
            (patches[1].op, patches[1].path.as_str()),
            (PatchOp::Insert, "conf/app.yaml")
        );
        assert!(patches[0].object_diff.is_none() && patches[1].object_diff.is_none());

        let modified = &patches[2];
        assert_eq!(modified.op, PatchOp::Modified);
        assert_eq!(modified.path, "conf/app.yaml");
        assert_eq!(modified.diff.len(), 1);
        let object_diff = modified.object_diff.as_ref().unwrap();
        assert_eq!(object_diff.diff.len(), 1);
        assert_eq!(object_diff.diff[0].value, Some(serde_json::json!(3)));
    }

    #[tokio::test]
    async fn pure_rename_emits_two_patches() {
        let diff = "diff --git a/old.md b/new.md\nsimilarity index 100%\nrename from old.md\nrename to new.md\n";
        let contents = MapContents::new(&[]);

        let patches = patches_from_combined_diff(diff, "b", "h", &contents).await.unwrap();
        assert_eq!(patches.len(), 2);
        assert_eq!(patches[0].op, PatchOp::Delete);
        assert_eq!(patches[1].op, PatchOp::Insert);
        assert!(patches.iter().all(|p| p.diff.is_empty()));
    }

    #[tokio::test]
    async fn empty_diff_yields_no_patches() {
        let contents = MapContents::new(&[]);
        let patches = patches_from_combined_diff("", "b", "h", &contents).await.unwrap();
        assert!(patches.is_empty());
    }

    #[test]
    fn pr_state_mapping() {
        assert_eq!(
            pr_state_from_record("MERGED"),
            LinkedPrState {
                is_merged: true,
                is_closed: true
            }
        );
        assert_eq!(
            pr_state_from_record("DECLINED"),
            LinkedPrState {
                is_merged: false,
                is_closed: true
            }
        );
        assert_eq!(
            pr_state_from_record("OPEN"),
            LinkedPrState {
                is_merged: false,
                is_closed: false
            }
        );
    }

    #[test]
    fn pr_record_wire_shape_deserializes() {
        let record: BitbucketPr = serde_json::from_value(serde_json::json!({
            "source": {"branch": {"name": "feature"}, "commit": {"hash": "abc123"}},
            "destination": {"branch": {"name": "main"}, "commit": {"hash": "def456"}},
            "rendered": {"description": {"raw": "---\nfensak:\n  linked:\n    - prNum: 41\n---\n"}},
            "links": {"diff": {"href": "https://example.test/diff"}},
            "state": "OPEN"
        }))
        .unwrap();

        assert_eq!(record.source.branch.name, "feature");
        assert_eq!(record.destination.commit.hash, "def456");
        assert_eq!(record.links.diff.href, "https://example.test/diff");
    }
}
