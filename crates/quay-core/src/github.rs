//! GitHub repository driver.
//!
//! Resolves `{"kind": "github", "owner": ..., "project": ...}` descriptors
//! against the GitHub REST API.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::repository::{RepoRef, Repository, RepositoryProvider};

/// GitHub API configuration.
#[derive(Debug, Clone)]
pub struct GithubConfig {
    /// API base URL, without a trailing slash.
    pub api_url: String,
    /// Personal access token; anonymous access is heavily rate-limited.
    pub auth_token: Option<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        GithubConfig {
            api_url: std::env::var("GITHUB_API_URL")
                .unwrap_or_else(|_| "https://api.github.com".to_string()),
            auth_token: std::env::var("GITHUB_TOKEN").ok(),
        }
    }
}

impl GithubConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_string());
        self
    }
}

/// Driver for one GitHub-hosted repository.
pub struct GithubRepository {
    owner: String,
    project: String,
    config: GithubConfig,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct RefEntry {
    name: String,
    commit: RefCommit,
}

#[derive(Deserialize)]
struct RefCommit {
    sha: String,
}

#[derive(Deserialize)]
struct CommitEntry {
    commit: CommitDetail,
}

#[derive(Deserialize)]
struct CommitDetail {
    committer: CommitSignature,
}

#[derive(Deserialize)]
struct CommitSignature {
    date: DateTime<Utc>,
}

impl GithubRepository {
    pub fn new(owner: &str, project: &str, config: GithubConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("quay-registry/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(GithubRepository {
            owner: owner.to_string(),
            project: project.to_string(),
            config,
            client,
        })
    }

    fn api(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.config.api_url, self.owner, self.project, path
        )
    }

    fn request(&self, url: &str, accept: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.get(url).header("Accept", accept.to_string());
        if let Some(token) = &self.config.auth_token {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(url, "GitHub API request");
        let response = self
            .request(url, "application/vnd.github+json")
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn commit_date(&self, sha: &str) -> Result<DateTime<Utc>> {
        let commit: CommitEntry = self.get_json(&self.api(&format!("/commits/{sha}"))).await?;
        Ok(commit.commit.committer.date)
    }

    async fn get_refs(&self, path: &str) -> Result<Vec<RepoRef>> {
        let entries: Vec<RefEntry> = self.get_json(&self.api(path)).await?;
        let mut refs = Vec::with_capacity(entries.len());
        for entry in entries {
            let date = self.commit_date(&entry.commit.sha).await?;
            refs.push(RepoRef {
                name: entry.name,
                sha: entry.commit.sha,
                date,
            });
        }
        Ok(refs)
    }

    /// The git ref behind a version ref: branches lose their `~` marker.
    fn git_ref(version_ref: &str) -> &str {
        version_ref.strip_prefix('~').unwrap_or(version_ref)
    }
}

#[async_trait]
impl Repository for GithubRepository {
    async fn get_tags(&self) -> Result<Vec<RepoRef>> {
        self.get_refs("/tags?per_page=100").await
    }

    async fn get_branches(&self) -> Result<Vec<RepoRef>> {
        self.get_refs("/branches?per_page=100").await
    }

    async fn read_file(&self, sha: &str, path: &str) -> Result<Vec<u8>> {
        let url = self.api(&format!("/contents{path}?ref={sha}"));
        let response = self
            .request(&url, "application/vnd.github.raw+json")
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(RegistryError::FileNotFound(path.to_string()));
        }
        let response = response.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn download(&self, version_ref: &str) -> Result<Vec<u8>> {
        let url = self.download_url(version_ref);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    fn download_url(&self, version_ref: &str) -> String {
        format!(
            "https://github.com/{}/{}/archive/{}.zip",
            self.owner,
            self.project,
            Self::git_ref(version_ref)
        )
    }
}

/// Provider resolving `github` descriptors.
#[derive(Default)]
pub struct GithubProvider {
    config: GithubConfig,
}

impl GithubProvider {
    pub fn new(config: GithubConfig) -> Self {
        GithubProvider { config }
    }
}

impl RepositoryProvider for GithubProvider {
    fn get_repository(&self, descriptor: &Value) -> Result<Arc<dyn Repository>> {
        let kind = descriptor.get("kind").and_then(|k| k.as_str());
        if kind != Some("github") {
            return Err(RegistryError::Repository(format!(
                "unsupported repository kind: {kind:?}"
            )));
        }
        let field = |key: &str| {
            descriptor
                .get(key)
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    RegistryError::Repository(format!("descriptor is missing \"{key}\""))
                })
        };
        let repo = GithubRepository::new(field("owner")?, field("project")?, self.config.clone())?;
        Ok(Arc::new(repo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn repo() -> GithubRepository {
        let config = GithubConfig {
            api_url: "https://api.github.invalid".to_string(),
            auth_token: None,
        };
        GithubRepository::new("alice", "widget", config).unwrap()
    }

    #[test]
    fn download_url_strips_branch_marker() {
        let repo = repo();
        assert_eq!(
            repo.download_url("~master"),
            "https://github.com/alice/widget/archive/master.zip"
        );
        assert_eq!(
            repo.download_url("v1.2.3"),
            "https://github.com/alice/widget/archive/v1.2.3.zip"
        );
    }

    #[test]
    fn provider_rejects_foreign_and_incomplete_descriptors() {
        let provider = GithubProvider::default();
        assert!(provider
            .get_repository(&json!({"kind": "gitlab", "owner": "a", "project": "b"}))
            .is_err());
        assert!(provider
            .get_repository(&json!({"kind": "github", "owner": "a"}))
            .is_err());
        assert!(provider
            .get_repository(&json!({"kind": "github", "owner": "a", "project": "b"}))
            .is_ok());
    }
}
