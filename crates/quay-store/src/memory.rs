//! In-memory `PackageStore` implementation.
//!
//! Backs the test suites and the demo daemon. No durability; state lives in
//! a `Mutex<HashMap>` keyed by package name.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::schema::{DownloadStats, PackageId, PackageRecord, UserId, VersionRecord};
use crate::store::PackageStore;

#[derive(Debug, Default)]
struct MemoryState {
    packages: HashMap<String, PackageRecord>,
    /// (package id, version string) per recorded download.
    downloads: Vec<(PackageId, String)>,
}

/// In-memory package store backed by a `HashMap<name, PackageRecord>`.
#[derive(Debug, Default)]
pub struct MemoryPackageStore {
    state: Mutex<MemoryState>,
}

impl MemoryPackageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn parse_release(version: &str) -> Option<semver::Version> {
    if version.starts_with('~') {
        return None;
    }
    semver::Version::parse(version).ok()
}

fn description_of(record: &PackageRecord) -> String {
    record
        .versions
        .last()
        .and_then(|v| v.recipe.get("description"))
        .and_then(|d| d.as_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

#[async_trait]
impl PackageStore for MemoryPackageStore {
    async fn get_all_packages(&self) -> StoreResult<Vec<PackageRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state.packages.values().cloned().collect())
    }

    async fn get_all_package_ids(&self) -> StoreResult<Vec<PackageId>> {
        let state = self.state.lock().unwrap();
        Ok(state.packages.values().map(|p| p.id.clone()).collect())
    }

    async fn get_package(&self, name: &str) -> StoreResult<PackageRecord> {
        let state = self.state.lock().unwrap();
        state
            .packages
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::PackageNotFound(name.to_string()))
    }

    async fn get_package_by_id(&self, id: &PackageId) -> StoreResult<PackageRecord> {
        let state = self.state.lock().unwrap();
        state
            .packages
            .values()
            .find(|p| p.id == *id)
            .cloned()
            .ok_or_else(|| StoreError::PackageNotFound(id.to_string()))
    }

    async fn get_package_dump(&self) -> StoreResult<Vec<PackageRecord>> {
        self.get_all_packages().await
    }

    async fn add_package(&self, record: PackageRecord) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.packages.contains_key(&record.name) {
            return Err(StoreError::PackageExists(record.name));
        }
        state.packages.insert(record.name.clone(), record);
        Ok(())
    }

    async fn add_or_set_package(&self, record: PackageRecord) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        // Upsert by id: a rename upstream replaces the old name entry.
        if let Some(old_name) = state
            .packages
            .values()
            .find(|p| p.id == record.id && p.name != record.name)
            .map(|p| p.name.clone())
        {
            state.packages.remove(&old_name);
        }
        state.packages.insert(record.name.clone(), record);
        Ok(())
    }

    async fn remove_package(&self, name: &str, owner: &UserId) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        let record = state
            .packages
            .get(name)
            .ok_or_else(|| StoreError::PackageNotFound(name.to_string()))?;
        if record.owner != *owner {
            return Err(StoreError::NotOwner {
                package: name.to_string(),
                owner: owner.to_string(),
            });
        }
        state.packages.remove(name);
        Ok(())
    }

    async fn set_package_categories(&self, name: &str, categories: Vec<String>) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        let record = state
            .packages
            .get_mut(name)
            .ok_or_else(|| StoreError::PackageNotFound(name.to_string()))?;
        record.categories = categories;
        Ok(())
    }

    async fn set_package_repository(&self, name: &str, repository: Value) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        let record = state
            .packages
            .get_mut(name)
            .ok_or_else(|| StoreError::PackageNotFound(name.to_string()))?;
        record.repository = repository;
        Ok(())
    }

    async fn set_package_errors(&self, name: &str, errors: Vec<String>) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        let record = state
            .packages
            .get_mut(name)
            .ok_or_else(|| StoreError::PackageNotFound(name.to_string()))?;
        record.errors = errors;
        Ok(())
    }

    async fn add_version(&self, name: &str, version: VersionRecord) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        let record = state
            .packages
            .get_mut(name)
            .ok_or_else(|| StoreError::PackageNotFound(name.to_string()))?;
        if record.version(&version.version).is_some() {
            return Err(StoreError::VersionExists {
                package: name.to_string(),
                version: version.version,
            });
        }
        record.versions.push(version);
        Ok(())
    }

    async fn update_version(&self, name: &str, version: VersionRecord) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        let record = state
            .packages
            .get_mut(name)
            .ok_or_else(|| StoreError::PackageNotFound(name.to_string()))?;
        let slot = record
            .versions
            .iter_mut()
            .find(|v| v.version == version.version)
            .ok_or_else(|| StoreError::VersionNotFound {
                package: name.to_string(),
                version: version.version.clone(),
            })?;
        *slot = version;
        Ok(())
    }

    async fn remove_version(&self, name: &str, version: &str) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        let record = state
            .packages
            .get_mut(name)
            .ok_or_else(|| StoreError::PackageNotFound(name.to_string()))?;
        let before = record.versions.len();
        record.versions.retain(|v| v.version != version);
        if record.versions.len() == before {
            return Err(StoreError::VersionNotFound {
                package: name.to_string(),
                version: version.to_string(),
            });
        }
        Ok(())
    }

    async fn has_version(&self, name: &str, version: &str) -> StoreResult<bool> {
        let state = self.state.lock().unwrap();
        let record = state
            .packages
            .get(name)
            .ok_or_else(|| StoreError::PackageNotFound(name.to_string()))?;
        Ok(record.version(version).is_some())
    }

    async fn get_version_info(&self, name: &str, version: &str) -> StoreResult<VersionRecord> {
        let state = self.state.lock().unwrap();
        let record = state
            .packages
            .get(name)
            .ok_or_else(|| StoreError::PackageNotFound(name.to_string()))?;
        record
            .version(version)
            .cloned()
            .ok_or_else(|| StoreError::VersionNotFound {
                package: name.to_string(),
                version: version.to_string(),
            })
    }

    async fn get_latest_version(&self, name: &str) -> StoreResult<Option<String>> {
        let state = self.state.lock().unwrap();
        let record = state
            .packages
            .get(name)
            .ok_or_else(|| StoreError::PackageNotFound(name.to_string()))?;
        Ok(record
            .versions
            .iter()
            .filter_map(|v| parse_release(&v.version))
            .max()
            .map(|v| v.to_string()))
    }

    async fn search_packages(&self, query: &str) -> StoreResult<Vec<PackageRecord>> {
        let state = self.state.lock().unwrap();
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_ascii_lowercase())
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let mut hits: Vec<PackageRecord> = state
            .packages
            .values()
            .filter(|p| {
                let name = p.name.to_ascii_lowercase();
                let description = description_of(p);
                terms
                    .iter()
                    .all(|t| name.contains(t) || description.contains(t))
            })
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(hits)
    }

    async fn get_user_packages(&self, owner: &UserId) -> StoreResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        let mut names: Vec<String> = state
            .packages
            .values()
            .filter(|p| p.owner == *owner)
            .map(|p| p.name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn is_user_package(&self, owner: &UserId, name: &str) -> StoreResult<bool> {
        let state = self.state.lock().unwrap();
        Ok(state
            .packages
            .get(name)
            .map(|p| p.owner == *owner)
            .unwrap_or(false))
    }

    async fn add_download(&self, id: &PackageId, version: &str) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state.downloads.push((id.clone(), version.to_string()));
        Ok(())
    }

    async fn get_download_stats(
        &self,
        id: &PackageId,
        version: Option<&str>,
    ) -> StoreResult<DownloadStats> {
        let state = self.state.lock().unwrap();
        let downloads = state
            .downloads
            .iter()
            .filter(|(did, dver)| did == id && version.map_or(true, |v| dver == v))
            .count() as u64;
        Ok(DownloadStats { downloads })
    }
}
