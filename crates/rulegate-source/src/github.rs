//! REST-per-file source adapter (GitHub-shaped API).
//!
//! The forge lists changed files with an embedded per-file unified diff.
//! The adapter pages through that listing, maps the forge's file-status
//! vocabulary onto [`PatchOp`], parses each embedded diff, and fetches
//! file contents at the base/head refs to compute object diffs for
//! structured configuration files.

use std::time::Duration;

use base64::Engine;
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

const GITHUB_API_VERSION: &str = "2022-11-28";
const PAGE_SIZE: u32 = 100;

/// Source adapter for a REST-per-file forge.
pub struct GitHubSource {
    repo: String,
    api_base_url: String,
    token: Option<SecretString>,
    http: reqwest::Client,
}

impl GitHubSource {
    /// Create an adapter against the public API endpoint.
    pub fn new(repo: impl Into<String>, token: Option<SecretString>) -> Result<Self, SourceError> {
        Self::with_api_base_url(repo, token, "https://api.github.com")
    }

    /// Create an adapter from a loaded [`crate::config::GitHubConfig`]
    /// section.
    pub fn from_config(config: &crate::config::GitHubConfig) -> Result<Self, SourceError> {
        let token = config.token.clone().map(SecretString::from);
        Self::with_api_base_url(config.repo.clone(), token, config.api_base_url.clone())
    }

    /// Create an adapter against an explicit API base URL (enterprise
    /// installs, test servers).
    pub fn with_api_base_url(
        repo: impl Into<String>,
        token: Option<SecretString>,
        api_base_url: impl Into<String>,
    ) -> Result<Self, SourceError> {
        let repo = repo.into();
        if repo.split('/').filter(|part| !part.is_empty()).count() != 2 {
            return Err(SourceError::Configuration(format!(
                "repository must be 'owner/name', got '{repo}'"
            )));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(60))
            .user_agent("rulegate-source/github")
            .build()
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        Ok(Self {
            repo,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            token,
            http,
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, endpoint: &str) -> Result<T, SourceError> {
        let mut request = self
            .http
            .get(format!("{}{}", self.api_base_url, endpoint))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await?;
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

    async fn pr_record(&self, repo: &str, pr_number: u64) -> Result<GithubPr, SourceError> {
        self.get_json(&format!("/repos/{repo}/pulls/{pr_number}"))
            .await
    }

    /// Page through the changed-file listing, preserving listing order.
    async fn changed_files(&self, pr_number: u64) -> Result<Vec<GithubChangedFile>, SourceError> {
        let mut files = Vec::new();
        for page in 1.. {
            let endpoint = format!(
                "/repos/{}/pulls/{pr_number}/files?per_page={PAGE_SIZE}&page={page}",
                self.repo
            );
            let batch: Vec<GithubChangedFile> = self.get_json(&endpoint).await?;
            let last_page = (batch.len() as u32) < PAGE_SIZE;
            files.extend(batch);
            if last_page {
                break;
            }
        }
        tracing::debug!(pr = pr_number, files = files.len(), "listed changed files");
        Ok(files)
    }
}

#[async_trait::async_trait]
impl FileContents for GitHubSource {
    async fn file_at(&self, reference: &str, path: &str) -> Result<String, SourceError> {
        let record: GithubContent = self
            .get_json(&format!(
                "/repos/{}/contents/{path}?ref={reference}",
                self.repo
            ))
            .await?;

        if record.kind != "file" {
            return Err(SourceError::InconsistentForgeResponse {
                reason: format!("contents of '{path}' is a '{}', expected a file", record.kind),
            });
        }

        let encoded: String = record
            .content
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| SourceError::Decode(format!("contents of '{path}': {e}")))?;
        String::from_utf8(bytes)
            .map_err(|e| SourceError::Decode(format!("contents of '{path}': {e}")))
    }
}

#[async_trait::async_trait]
impl PrLookup for GitHubSource {
    async fn linked_pr_state(
        &self,
        repo: &str,
        pr_num: u64,
    ) -> Result<LinkedPrState, SourceError> {
        let repo = if repo.is_empty() { &self.repo } else { repo };
        let record = self.pr_record(repo, pr_num).await?;
        Ok(LinkedPrState {
            is_merged: record.merged_at.is_some(),
            is_closed: record.state == "closed" || record.merged_at.is_some(),
        })
    }
}

#[async_trait::async_trait]
impl PatchSource for GitHubSource {
    async fn pull_request_patches(
        &self,
        pr_number: u64,
    ) -> Result<PullRequestPatches, SourceError> {
        tracing::info!(repo = %self.repo, pr = pr_number, "assembling change set (rest-per-file)");

        let record = self.pr_record(&self.repo, pr_number).await?;
        let linked_prs =
            resolve_linked_prs(record.body.as_deref().unwrap_or_default(), self).await?;

        let files = self.changed_files(pr_number).await?;
        let patch_list =
            patches_from_files(files, &record.base.sha, &record.head.sha, self).await?;

        Ok(PullRequestPatches {
            metadata: ChangeSetMetadata {
                source_branch: record.head.reference,
                target_branch: record.base.reference,
                linked_prs,
            },
            patch_list,
        })
    }
}

/// Map the forge's file-status vocabulary to a patch op. Renames are
/// handled separately by the caller.
fn patch_op_for_status(status: &str) -> Result<PatchOp, SourceError> {
    match status {
        "added" | "copied" => Ok(PatchOp::Insert),
        "removed" => Ok(PatchOp::Delete),
        "changed" | "modified" => Ok(PatchOp::Modified),
        other => Err(SourceError::UnknownFileStatus {
            status: other.to_string(),
        }),
    }
}

/// Compute the object diff for one file, fetching only the side(s) the op
/// needs. `base_path` differs from `path` for the modified half of a
/// rename.
async fn fetch_object_diff(
    op: PatchOp,
    path: &str,
    base_path: &str,
    base_ref: &str,
    head_ref: &str,
    contents: &dyn FileContents,
) -> Result<Option<ObjectDiff>, SourceError> {
    if ConfigFormat::from_path(path).is_none() {
        return Ok(None);
    }

    let base_text = match op {
        PatchOp::Delete | PatchOp::Modified => {
            Some(contents.file_at(base_ref, base_path).await?)
        }
        _ => None,
    };
    let head_text = match op {
        PatchOp::Insert | PatchOp::Modified => Some(contents.file_at(head_ref, path).await?),
        _ => None,
    };

    Ok(object_diff_for(
        op,
        path,
        base_text.as_deref(),
        head_text.as_deref(),
    )?)
}

/// Convert the changed-file listing into patches, in listing order.
///
/// Renames expand into `Delete(old)`, `Insert(new)`, plus a third
/// `Modified(new)` record when the forge supplied a content diff for the
/// rename; the Delete/Insert halves carry empty hunks and no object diff.
async fn patches_from_files(
    files: Vec<GithubChangedFile>,
    base_ref: &str,
    head_ref: &str,
    contents: &dyn FileContents,
) -> Result<Vec<Patch>, SourceError> {
    let mut patches = Vec::with_capacity(files.len());

    for file in files {
        if file.status == "renamed" {
            let old_path =
                file.previous_filename
                    .ok_or_else(|| SourceError::InconsistentForgeResponse {
                        reason: format!(
                            "renamed file '{}' is missing previous_filename",
                            file.filename
                        ),
                    })?;

            patches.push(Patch {
                path: old_path.clone(),
                op: PatchOp::Delete,
                additions: 0,
                deletions: 0,
                diff: Vec::new(),
                object_diff: None,
            });
            patches.push(Patch {
                path: file.filename.clone(),
                op: PatchOp::Insert,
                additions: 0,
                deletions: 0,
                diff: Vec::new(),
                object_diff: None,
            });

            if let Some(diff_text) = file.patch.as_deref().filter(|p| !p.is_empty()) {
                let object_diff = fetch_object_diff(
                    PatchOp::Modified,
                    &file.filename,
                    &old_path,
                    base_ref,
                    head_ref,
                    contents,
                )
                .await?;
                patches.push(Patch {
                    path: file.filename,
                    op: PatchOp::Modified,
                    additions: file.additions,
                    deletions: file.deletions,
                    diff: parse_unified_diff(diff_text)?,
                    object_diff,
                });
            }
            continue;
        }

        let op = patch_op_for_status(&file.status)?;
        let diff = match file.patch.as_deref() {
            Some(text) => parse_unified_diff(text)?,
            None => Vec::new(),
        };
        let object_diff = fetch_object_diff(
            op,
            &file.filename,
            &file.filename,
            base_ref,
            head_ref,
            contents,
        )
        .await?;

        patches.push(Patch {
            path: file.filename,
            op,
            additions: file.additions,
            deletions: file.deletions,
            diff,
            object_diff,
        });
    }

    Ok(patches)
}

#[derive(Debug, Deserialize)]
struct GithubBranchRef {
    #[serde(rename = "ref")]
    reference: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GithubPr {
    head: GithubBranchRef,
    base: GithubBranchRef,
    body: Option<String>,
    state: String,
    merged_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubChangedFile {
    filename: String,
    previous_filename: Option<String>,
    status: String,
    #[serde(default)]
    additions: u32,
    #[serde(default)]
    deletions: u32,
    patch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubContent {
    #[serde(rename = "type")]
    kind: String,
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rulegate_patch::{ChangeType, LineOp};
    use std::collections::HashMap;

    /// Serves file contents from an in-memory (ref, path) map.
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

    fn file(json: serde_json::Value) -> GithubChangedFile {
        serde_json::from_value(json).unwrap()
    }

    #[tokio::test]
    async fn modified_json_file_gets_object_diff() {
        let diff_text = "@@ -1,5 +1,5 @@\n {\n   \"app\": \"core\",\n-  \"subapp\": \"v1.1.0\",\n+  \"subapp\": \"v1.2.0\",\n   \"extra\": true\n }\n";
        let files = vec![file(serde_json::json!({
            "filename": "deploy.json",
            "status": "modified",
            "additions": 1,
            "deletions": 1,
            "patch": diff_text,
        }))];
        let contents = MapContents::new(&[
            (
                "base-sha",
                "deploy.json",
                "{\n  \"app\": \"core\",\n  \"subapp\": \"v1.1.0\",\n  \"extra\": true\n}\n",
            ),
            (
                "head-sha",
                "deploy.json",
                "{\n  \"app\": \"core\",\n  \"subapp\": \"v1.2.0\",\n  \"extra\": true\n}\n",
            ),
        ]);

        let patches = patches_from_files(files, "base-sha", "head-sha", &contents)
            .await
            .unwrap();

        assert_eq!(patches.len(), 1);
        let patch = &patches[0];
        assert_eq!(patch.op, PatchOp::Modified);
        assert_eq!((patch.additions, patch.deletions), (1, 1));
        assert_eq!(patch.diff.len(), 1);
        let ops: Vec<LineOp> = patch.diff[0].diff_operations.iter().map(|d| d.op).collect();
        assert_eq!(
            ops,
            vec![
                LineOp::Untouched,
                LineOp::Untouched,
                LineOp::Modified,
                LineOp::Untouched,
                LineOp::Untouched
            ]
        );

        let object_diff = patch.object_diff.as_ref().expect("object diff for .json");
        assert_eq!(object_diff.diff.len(), 1);
        let change = &object_diff.diff[0];
        assert_eq!(change.change_type, ChangeType::Change);
        assert_eq!(change.old_value, Some(serde_json::json!("v1.1.0")));
        assert_eq!(change.value, Some(serde_json::json!("v1.2.0")));
    }

    #[tokio::test]
    async fn added_file_maps_to_insert_with_head_only_tree() {
        let files = vec![file(serde_json::json!({
            "filename": "new.yaml",
            "status": "added",
            "additions": 2,
            "deletions": 0,
            "patch": "@@ -0,0 +1,2 @@\n+svc:\n+  replicas: 2\n",
        }))];
        let contents = MapContents::new(&[("head-sha", "new.yaml", "svc:\n  replicas: 2\n")]);

        let patches = patches_from_files(files, "base-sha", "head-sha", &contents)
            .await
            .unwrap();

        assert_eq!(patches[0].op, PatchOp::Insert);
        let object_diff = patches[0].object_diff.as_ref().unwrap();
        assert!(object_diff.previous.is_none());
        assert!(object_diff.current.is_some());
        assert!(object_diff.diff.is_empty());
    }

    #[tokio::test]
    async fn removed_file_maps_to_delete_with_base_only_tree() {
        let files = vec![file(serde_json::json!({
            "filename": "legacy.toml",
            "status": "removed",
            "additions": 0,
            "deletions": 1,
            "patch": "@@ -1,1 +0,0 @@\n-old = true\n",
        }))];
        let contents = MapContents::new(&[("base-sha", "legacy.toml", "old = true\n")]);

        let patches = patches_from_files(files, "base-sha", "head-sha", &contents)
            .await
            .unwrap();

        assert_eq!(patches[0].op, PatchOp::Delete);
        let object_diff = patches[0].object_diff.as_ref().unwrap();
        assert!(object_diff.previous.is_some());
        assert!(object_diff.current.is_none());
    }

    #[tokio::test]
    async fn copied_file_maps_to_insert() {
        let files = vec![file(serde_json::json!({
            "filename": "copy.md",
            "status": "copied",
            "additions": 0,
            "deletions": 0,
        }))];
        let contents = MapContents::new(&[]);

        let patches = patches_from_files(files, "b", "h", &contents).await.unwrap();
        assert_eq!(patches[0].op, PatchOp::Insert);
        assert!(patches[0].diff.is_empty());
        assert!(patches[0].object_diff.is_none());
    }

    #[tokio::test]
    async fn rename_emits_delete_insert_modified() {
        let files = vec![file(serde_json::json!({
            "filename": "conf/app.json",
            "previous_filename": "app.json",
            "status": "renamed",
            "additions": 1,
            "deletions": 1,
            "patch": "@@ -1,1 +1,1 @@\n-{\"v\": 1}\n+{\"v\": 2}\n",
        }))];
        let contents = MapContents::new(&[
            ("base-sha", "app.json", "{\"v\": 1}\n"),
            ("head-sha", "conf/app.json", "{\"v\": 2}\n"),
        ]);

        let patches = patches_from_files(files, "base-sha", "head-sha", &contents)
            .await
            .unwrap();

        assert_eq!(patches.len(), 3, "rename expands to delete+insert+modified");
        assert_eq!((patches[0].op, patches[0].path.as_str()), (PatchOp::Delete, "app.json"));
        assert_eq!(
            (patches[1].op, patches[1].path.as_str()),
            (PatchOp::Insert, "conf/app.json")
        );
        assert!(patches[0].diff.is_empty() && patches[0].object_diff.is_none());
        assert!(patches[1].diff.is_empty() && patches[1].object_diff.is_none());

        let modified = &patches[2];
        assert_eq!((modified.op, modified.path.as_str()), (PatchOp::Modified, "conf/app.json"));
        assert_eq!(modified.diff.len(), 1);
        let object_diff = modified.object_diff.as_ref().expect("content diff on rename");
        assert_eq!(object_diff.diff.len(), 1);
        assert_eq!(object_diff.diff[0].value, Some(serde_json::json!(2)));
    }

    #[tokio::test]
    async fn pure_rename_emits_only_delete_and_insert() {
        let files = vec![file(serde_json::json!({
            "filename": "docs/renamed.md",
            "previous_filename": "renamed.md",
            "status": "renamed",
            "additions": 0,
            "deletions": 0,
        }))];
        let contents = MapContents::new(&[]);

        let patches = patches_from_files(files, "b", "h", &contents).await.unwrap();
        assert_eq!(patches.len(), 2);
        assert_eq!(patches[0].op, PatchOp::Delete);
        assert_eq!(patches[1].op, PatchOp::Insert);
    }

    #[tokio::test]
    async fn rename_without_previous_filename_is_inconsistent() {
        let files = vec![file(serde_json::json!({
            "filename": "moved.rs",
            "status": "renamed",
        }))];
        let contents = MapContents::new(&[]);

        let err = patches_from_files(files, "b", "h", &contents)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::InconsistentForgeResponse { .. }));
        assert!(err.to_string().contains("moved.rs"));
    }

    #[tokio::test]
    async fn unknown_status_is_rejected() {
        let files = vec![file(serde_json::json!({
            "filename": "weird.txt",
            "status": "transmuted",
        }))];
        let contents = MapContents::new(&[]);

        let err = patches_from_files(files, "b", "h", &contents)
            .await
            .unwrap_err();
        match err {
            SourceError::UnknownFileStatus { status } => assert_eq!(status, "transmuted"),
            other => panic!("expected UnknownFileStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn structured_parse_failure_fails_assembly() {
        let files = vec![file(serde_json::json!({
            "filename": "broken.json",
            "status": "modified",
            "patch": "@@ -1,1 +1,1 @@\n-a\n+b\n",
        }))];
        let contents = MapContents::new(&[
            ("b", "broken.json", "{not json"),
            ("h", "broken.json", "{}"),
        ]);

        let err = patches_from_files(files, "b", "h", &contents)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SourceError::Patch(rulegate_patch::PatchError::ParseFailure { .. })
        ));
    }

    #[tokio::test]
    async fn non_config_files_skip_content_fetches() {
        // No contents registered: assembly must not ask for any.
        let files = vec![file(serde_json::json!({
            "filename": "src/main.rs",
            "status": "modified",
            "additions": 1,
            "deletions": 0,
            "patch": "@@ -1,1 +1,2 @@\n fn main() {}\n+// note\n",
        }))];
        let contents = MapContents::new(&[]);

        let patches = patches_from_files(files, "b", "h", &contents).await.unwrap();
        assert!(patches[0].object_diff.is_none());
    }

    #[test]
    fn repo_shape_is_validated() {
        assert!(GitHubSource::new("not-a-repo", None).is_err());
        assert!(GitHubSource::new("owner/name", None).is_ok());
    }

    #[test]
    fn from_config_builds_adapter() {
        let config = crate::config::GitHubConfig {
            repo: "octo/widgets".into(),
            api_base_url: "https://github.example.test".into(),
            token: Some("token-value".into()),
        };
        assert!(GitHubSource::from_config(&config).is_ok());
    }
}
