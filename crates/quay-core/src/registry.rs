//! The registry facade: public operations over packages and the serialized
//! view cache.
//!
//! Every write path to a package or its versions invalidates the cached
//! view for that package before returning, which keeps the cache a pure
//! function of store state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::SecondsFormat;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use quay_store::{DownloadStats, PackageRecord, PackageStore, UserId, VersionRecord};

use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::queue::{UpdateHandler, UpdateQueue};
use crate::repository::{validate_repository, RepositoryProvider};
use crate::version::VersionSpec;

/// Coordination layer over the store, the repository drivers, and the
/// update queue.
pub struct Registry {
    pub(crate) config: RegistryConfig,
    pub(crate) store: Arc<dyn PackageStore>,
    pub(crate) provider: Arc<dyn RepositoryProvider>,
    pub(crate) queue: Arc<UpdateQueue>,
    /// Serialized package views, keyed by package name.
    pub(crate) view_cache: Mutex<HashMap<String, Value>>,
}

impl Registry {
    pub fn new(
        config: RegistryConfig,
        store: Arc<dyn PackageStore>,
        provider: Arc<dyn RepositoryProvider>,
    ) -> Arc<Self> {
        let queue = UpdateQueue::new(config.queue_capacity, config.worker_stale_after);
        Arc::new(Registry {
            config,
            store,
            provider,
            queue,
            view_cache: Mutex::new(HashMap::new()),
        })
    }

    /// Direct store access for drivers that converge state wholesale (the
    /// mirror reconciler).
    pub fn store(&self) -> &Arc<dyn PackageStore> {
        &self.store
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Drop the cached view for a package. Called by every write path.
    pub(crate) fn invalidate_cached_view(&self, name: &str) {
        self.view_cache.lock().unwrap().remove(name);
    }

    // -----------------------------------------------------------------------
    // Write operations
    // -----------------------------------------------------------------------

    /// Register a new package from a repository descriptor.
    ///
    /// Validates the repository, derives the canonical package name from its
    /// recipe, inserts an empty package record, and queues the first
    /// reconciliation.
    pub async fn add_package(self: &Arc<Self>, repository: Value, owner: UserId) -> Result<String> {
        let repo = self.provider.get_repository(&repository)?;
        let name = validate_repository(repo.as_ref(), &self.config).await?;

        let record = PackageRecord::new(owner, name.clone(), repository);
        self.store.add_package(record).await?;
        self.invalidate_cached_view(&name);
        info!(package = %name, "registered new package");

        self.trigger_package_update(&name).await?;
        Ok(name)
    }

    pub async fn remove_package(&self, name: &str, owner: &UserId) -> Result<()> {
        self.store.remove_package(name, owner).await?;
        self.invalidate_cached_view(name);
        info!(package = name, "removed package");
        Ok(())
    }

    /// Upsert a complete package record, keyed by its internal id. Used by
    /// the mirror reconciler.
    pub async fn add_or_set_package(&self, record: PackageRecord) -> Result<()> {
        // An upstream rename replaces the record under a new name; drop the
        // stale view cached under the old one as well.
        if let Ok(existing) = self.store.get_package_by_id(&record.id).await {
            if existing.name != record.name {
                self.invalidate_cached_view(&existing.name);
            }
        }
        let name = record.name.clone();
        self.store.add_or_set_package(record).await?;
        self.invalidate_cached_view(&name);
        Ok(())
    }

    pub async fn set_package_categories(&self, name: &str, categories: Vec<String>) -> Result<()> {
        self.store.set_package_categories(name, categories).await?;
        self.invalidate_cached_view(name);
        Ok(())
    }

    /// Point a package at a different repository descriptor.
    ///
    /// The new repository is validated like a fresh submission and must
    /// declare the same package name; renames are not supported.
    pub async fn set_package_repository(&self, name: &str, repository: Value) -> Result<()> {
        let repo = self.provider.get_repository(&repository)?;
        let derived = validate_repository(repo.as_ref(), &self.config).await?;
        if derived != name {
            return Err(RegistryError::NameMismatch {
                expected: name.to_string(),
                actual: derived,
            });
        }
        self.store.set_package_repository(name, repository).await?;
        self.invalidate_cached_view(name);
        Ok(())
    }

    /// Count one download of a version.
    pub async fn add_download(&self, name: &str, version: &str) -> Result<()> {
        let record = self.store.get_package(name).await?;
        self.store.add_download(&record.id, version).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Names of the packages owned by a user.
    pub async fn get_packages(&self, owner: &UserId) -> Result<Vec<String>> {
        Ok(self.store.get_user_packages(owner).await?)
    }

    pub async fn is_user_package(&self, owner: &UserId, name: &str) -> Result<bool> {
        Ok(self.store.is_user_package(owner, name).await?)
    }

    pub async fn search_packages(&self, query: &str) -> Result<Vec<PackageRecord>> {
        Ok(self.store.search_packages(query).await?)
    }

    /// The serialized package view.
    ///
    /// Views without errors are cached until the next write to the package;
    /// views with errors are built fresh every time and never cached.
    pub async fn get_package_info(&self, name: &str, include_errors: bool) -> Result<Value> {
        if !include_errors {
            if let Some(view) = self.view_cache.lock().unwrap().get(name) {
                return Ok(view.clone());
            }
        }

        let record = self.store.get_package(name).await?;
        let view = self.render_package(&record, include_errors).await?;

        if !include_errors {
            debug!(package = name, "caching package view");
            self.view_cache
                .lock()
                .unwrap()
                .insert(name.to_string(), view.clone());
        }
        Ok(view)
    }

    /// Download counts for a package, one version, or `"latest"`.
    ///
    /// Returns `None` when `"latest"` is requested and the package has no
    /// released version yet.
    pub async fn get_package_stats(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<Option<DownloadStats>> {
        let record = self.store.get_package(name).await?;
        let resolved = match version {
            Some("latest") => match self.store.get_latest_version(name).await? {
                Some(latest) => Some(latest),
                None => return Ok(None),
            },
            Some(v) => Some(v.to_string()),
            None => None,
        };
        let stats = self
            .store
            .get_download_stats(&record.id, resolved.as_deref())
            .await?;
        Ok(Some(stats))
    }

    pub async fn get_package_version_info(
        &self,
        name: &str,
        version: &str,
    ) -> Result<VersionRecord> {
        Ok(self.store.get_version_info(name, version).await?)
    }

    pub async fn get_latest_version(&self, name: &str) -> Result<Option<String>> {
        Ok(self.store.get_latest_version(name).await?)
    }

    /// Fetch the archive for a version (or `"latest"`) and count the
    /// download.
    pub async fn download_package_zip(&self, name: &str, version: &str) -> Result<Vec<u8>> {
        let record = self.store.get_package(name).await?;
        let version = if version == "latest" {
            self.store.get_latest_version(name).await?.ok_or_else(|| {
                RegistryError::VersionNotFound {
                    package: name.to_string(),
                    version: "latest".to_string(),
                }
            })?
        } else {
            version.to_string()
        };
        if !self.store.has_version(name, &version).await? {
            return Err(RegistryError::VersionNotFound {
                package: name.to_string(),
                version,
            });
        }

        let spec = VersionSpec::parse(&version)?;
        let repo = self.provider.get_repository(&record.repository)?;
        let bytes = repo.download(&spec.download_ref()).await?;
        self.store.add_download(&record.id, &version).await?;
        Ok(bytes)
    }

    // -----------------------------------------------------------------------
    // Update scheduling
    // -----------------------------------------------------------------------

    /// Queue a package for reconciliation.
    pub async fn trigger_package_update(self: &Arc<Self>, name: &str) -> Result<()> {
        let handler: Arc<dyn UpdateHandler> = Arc::clone(self) as Arc<dyn UpdateHandler>;
        self.queue.trigger(name, handler).await
    }

    /// Whether the package is waiting in the update queue.
    pub async fn is_package_scheduled_for_update(&self, name: &str) -> bool {
        self.queue.is_queued(name).await
    }

    /// 0 while being processed, 1-based queue index while waiting, −1
    /// otherwise.
    pub async fn get_update_queue_position(&self, name: &str) -> isize {
        self.queue.position(name).await
    }

    /// Reconcile every stored package, sequentially. Used after a restart
    /// (the queue is purely in-memory) and by operator command.
    pub async fn check_for_new_versions_all(&self) -> Result<()> {
        let packages = self.store.get_all_packages().await?;
        info!(count = packages.len(), "rescanning all packages");
        for pack in packages {
            if let Err(err) = self.check_for_new_versions(&pack.name).await {
                warn!(package = %pack.name, error = %err, "rescan failed");
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // View rendering
    // -----------------------------------------------------------------------

    async fn render_package(&self, record: &PackageRecord, include_errors: bool) -> Result<Value> {
        let repo = self.provider.get_repository(&record.repository)?;

        let mut versions = Vec::with_capacity(record.versions.len());
        for version in &record.versions {
            let spec = VersionSpec::parse(&version.version)?;
            let mut entry = version.recipe.clone();
            let obj = entry
                .as_object_mut()
                .ok_or_else(|| RegistryError::Repository("stored recipe is not an object".into()))?;
            obj.insert("version".to_string(), json!(version.version));
            obj.insert(
                "date".to_string(),
                json!(version.date.to_rfc3339_opts(SecondsFormat::Secs, true)),
            );
            obj.insert(
                "url".to_string(),
                json!(repo.download_url(&spec.download_ref())),
            );
            if let Some(path) = &version.readme_path {
                if path.starts_with('/') && path.len() < 256 {
                    if let Ok(bytes) = repo.read_file(&version.commit_sha, path).await {
                        if let Ok(text) = String::from_utf8(bytes) {
                            obj.insert("readme".to_string(), json!(text));
                        }
                    }
                }
            }
            versions.push(entry);
        }

        let mut view = json!({
            "id": record.id.as_str(),
            "dateAdded": record
                .id
                .created_at()
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            "owner": record.owner.as_str(),
            "name": record.name,
            "versions": versions,
            "repository": record.repository,
            "categories": record.categories,
        });
        if include_errors {
            view["errors"] = json!(record.errors);
        }
        Ok(view)
    }
}
