//! In-memory repository fakes (testing only).
//!
//! `FakeRepository` satisfies the `Repository` contract without any network;
//! tests script its tags, branches, files, and failure modes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use crate::error::{RegistryError, Result};
use crate::repository::{RepoRef, Repository, RepositoryProvider};

#[derive(Debug, Default)]
struct FakeRepoState {
    tags: Vec<RepoRef>,
    branches: Vec<RepoRef>,
    /// (sha, path) -> content
    files: HashMap<(String, String), Vec<u8>>,
    /// When set, `get_tags`/`get_branches` fail with this message.
    refs_error: Option<String>,
}

/// Scriptable in-memory repository.
#[derive(Debug, Default)]
pub struct FakeRepository {
    state: Mutex<FakeRepoState>,
}

impl FakeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn make_ref(name: &str, sha: &str) -> RepoRef {
        RepoRef {
            name: name.to_string(),
            sha: sha.to_string(),
            date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    pub fn add_tag(&self, name: &str, sha: &str) {
        let mut state = self.state.lock().unwrap();
        state.tags.push(Self::make_ref(name, sha));
    }

    pub fn remove_tag(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.tags.retain(|t| t.name != name);
    }

    pub fn add_branch(&self, name: &str, sha: &str) {
        let mut state = self.state.lock().unwrap();
        state.branches.push(Self::make_ref(name, sha));
    }

    pub fn put_file(&self, sha: &str, path: &str, content: impl Into<Vec<u8>>) {
        let mut state = self.state.lock().unwrap();
        state
            .files
            .insert((sha.to_string(), path.to_string()), content.into());
    }

    pub fn remove_file(&self, sha: &str, path: &str) {
        let mut state = self.state.lock().unwrap();
        state.files.remove(&(sha.to_string(), path.to_string()));
    }

    /// Make `get_tags`/`get_branches` fail, or clear the failure with `None`.
    pub fn set_refs_error(&self, message: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        state.refs_error = message.map(|m| m.to_string());
    }

    /// Test helper: the `RepoRef` of a scripted branch. Panics if absent.
    pub fn branch_ref(&self, name: &str) -> RepoRef {
        let state = self.state.lock().unwrap();
        state
            .branches
            .iter()
            .find(|b| b.name == name)
            .cloned()
            .expect("branch not scripted")
    }
}

#[async_trait]
impl Repository for FakeRepository {
    async fn get_tags(&self) -> Result<Vec<RepoRef>> {
        let state = self.state.lock().unwrap();
        if let Some(msg) = &state.refs_error {
            return Err(RegistryError::Repository(msg.clone()));
        }
        Ok(state.tags.clone())
    }

    async fn get_branches(&self) -> Result<Vec<RepoRef>> {
        let state = self.state.lock().unwrap();
        if let Some(msg) = &state.refs_error {
            return Err(RegistryError::Repository(msg.clone()));
        }
        Ok(state.branches.clone())
    }

    async fn read_file(&self, sha: &str, path: &str) -> Result<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state
            .files
            .get(&(sha.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| RegistryError::FileNotFound(path.to_string()))
    }

    async fn download(&self, version_ref: &str) -> Result<Vec<u8>> {
        Ok(format!("archive:{version_ref}").into_bytes())
    }

    fn download_url(&self, version_ref: &str) -> String {
        format!("https://repo.invalid/archive/{version_ref}.zip")
    }
}

/// Provider resolving `{"kind": "fake", "name": ...}` descriptors to
/// registered fake repositories.
#[derive(Default)]
pub struct FakeRepositoryProvider {
    repos: Mutex<HashMap<String, Arc<FakeRepository>>>,
}

impl FakeRepositoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, repo: Arc<FakeRepository>) {
        let mut repos = self.repos.lock().unwrap();
        repos.insert(name.to_string(), repo);
    }

    /// The descriptor that resolves to the repository registered as `name`.
    pub fn descriptor(name: &str) -> Value {
        json!({"kind": "fake", "name": name})
    }
}

impl RepositoryProvider for FakeRepositoryProvider {
    fn get_repository(&self, descriptor: &Value) -> Result<Arc<dyn Repository>> {
        let kind = descriptor.get("kind").and_then(|k| k.as_str());
        if kind != Some("fake") {
            return Err(RegistryError::Repository(format!(
                "unsupported repository kind: {kind:?}"
            )));
        }
        let name = descriptor
            .get("name")
            .and_then(|n| n.as_str())
            .ok_or_else(|| {
                RegistryError::Repository("descriptor is missing \"name\"".to_string())
            })?;
        let repos = self.repos.lock().unwrap();
        repos
            .get(name)
            .cloned()
            .map(|r| r as Arc<dyn Repository>)
            .ok_or_else(|| RegistryError::Repository(format!("unknown repository: {name}")))
    }
}
