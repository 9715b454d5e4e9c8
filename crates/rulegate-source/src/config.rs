//! Adapter configuration loading.
//!
//! Supports TOML configuration with `${ENV_VAR}` expansion so tokens can
//! stay out of checked-in files:
//!
//! ```toml
//! [github]
//! repo = "octo/widgets"
//! token = "${GITHUB_TOKEN}"
//!
//! [bitbucket]
//! repo = "octo/widgets"
//! api_base_url = "https://api.bitbucket.org"
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::SourceError;

/// Top-level source configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceConfig {
    /// REST-per-file forge settings.
    #[serde(default)]
    pub github: Option<GitHubConfig>,

    /// Combined-diff forge settings.
    #[serde(default)]
    pub bitbucket: Option<BitbucketConfig>,
}

/// Settings for the REST-per-file adapter.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubConfig {
    /// Repository as `owner/name`.
    pub repo: String,

    /// API base URL.
    #[serde(default = "default_github_api")]
    pub api_base_url: String,

    /// Bearer token; usually an `${ENV_VAR}` reference.
    #[serde(default)]
    pub token: Option<String>,
}

/// Settings for the combined-diff adapter.
#[derive(Debug, Clone, Deserialize)]
pub struct BitbucketConfig {
    /// Repository as `workspace/name`.
    pub repo: String,

    /// API base URL.
    #[serde(default = "default_bitbucket_api")]
    pub api_base_url: String,

    /// Bearer token; usually an `${ENV_VAR}` reference.
    #[serde(default)]
    pub token: Option<String>,
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

fn default_bitbucket_api() -> String {
    "https://api.bitbucket.org".to_string()
}

impl SourceConfig {
    /// Parse a config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, SourceError> {
        let config: SourceConfig =
            toml::from_str(toml_str).map_err(|e| SourceError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config from a TOML string, expanding `${ENV_VAR}` references.
    pub fn from_toml_with_env(toml_str: &str) -> Result<Self, SourceError> {
        Self::from_toml(&expand_env_vars(toml_str))
    }

    /// Load config from a file path, expanding environment variables.
    pub fn from_file_with_env(path: &Path) -> Result<Self, SourceError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SourceError::Configuration(format!("{}: {e}", path.display())))?;
        Self::from_toml_with_env(&content)
    }

    fn validate(&self) -> Result<(), SourceError> {
        if let Some(github) = &self.github {
            validate_forge("github", &github.repo, &github.api_base_url)?;
        }
        if let Some(bitbucket) = &self.bitbucket {
            validate_forge("bitbucket", &bitbucket.repo, &bitbucket.api_base_url)?;
        }
        Ok(())
    }
}

fn validate_forge(section: &str, repo: &str, api_base_url: &str) -> Result<(), SourceError> {
    if repo.split('/').filter(|part| !part.is_empty()).count() != 2 {
        return Err(SourceError::Configuration(format!(
            "[{section}]: repo must be 'owner/name', got '{repo}'"
        )));
    }
    if !api_base_url.starts_with("http://") && !api_base_url.starts_with("https://") {
        return Err(SourceError::Configuration(format!(
            "[{section}]: api_base_url must be an http(s) URL, got '{api_base_url}'"
        )));
    }
    Ok(())
}

/// Expand `${ENV_VAR}` patterns in a string using environment variables.
/// Unset variables leave the placeholder intact.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(value) => result.push_str(&value),
                Err(_) => {
                    result.push_str(&format!("${{{var_name}}}"));
                }
            }
        } else {
            result.push(ch);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_github_section() {
        let toml = r#"
            [github]
            repo = "octo/widgets"
        "#;

        let config = SourceConfig::from_toml(toml).unwrap();
        let github = config.github.unwrap();
        assert_eq!(github.repo, "octo/widgets");
        assert_eq!(github.api_base_url, "https://api.github.com");
        assert!(github.token.is_none());
        assert!(config.bitbucket.is_none());
    }

    #[test]
    fn parses_both_forges() {
        let toml = r#"
            [github]
            repo = "octo/widgets"

            [bitbucket]
            repo = "octo/widgets"
            api_base_url = "https://bitbucket.example.test"
        "#;

        let config = SourceConfig::from_toml(toml).unwrap();
        assert!(config.github.is_some());
        assert_eq!(
            config.bitbucket.unwrap().api_base_url,
            "https://bitbucket.example.test"
        );
    }

    #[test]
    fn expands_environment_variables() {
        std::env::set_var("RULEGATE_TEST_TOKEN", "secret123");
        let toml = r#"
            [github]
            repo = "octo/widgets"
            token = "${RULEGATE_TEST_TOKEN}"
        "#;

        let config = SourceConfig::from_toml_with_env(toml).unwrap();
        assert_eq!(config.github.unwrap().token.as_deref(), Some("secret123"));
        std::env::remove_var("RULEGATE_TEST_TOKEN");
    }

    #[test]
    fn unset_variable_keeps_placeholder() {
        let toml = r#"
            [github]
            repo = "octo/widgets"
            token = "${RULEGATE_DEFINITELY_UNSET}"
        "#;

        let config = SourceConfig::from_toml_with_env(toml).unwrap();
        assert_eq!(
            config.github.unwrap().token.as_deref(),
            Some("${RULEGATE_DEFINITELY_UNSET}")
        );
    }

    #[test]
    fn rejects_malformed_repo() {
        let toml = r#"
            [github]
            repo = "not-a-repo"
        "#;

        let err = SourceConfig::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("owner/name"));
    }

    #[test]
    fn rejects_non_http_base_url() {
        let toml = r#"
            [bitbucket]
            repo = "octo/widgets"
            api_base_url = "ftp://mirror.example"
        "#;

        let err = SourceConfig::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("http"));
    }

    #[test]
    fn empty_config_is_valid() {
        let config = SourceConfig::from_toml("").unwrap();
        assert!(config.github.is_none());
        assert!(config.bitbucket.is_none());
    }
}
