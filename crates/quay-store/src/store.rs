//! The `PackageStore` trait: everything the registry engine asks of its
//! persistence backend.
//!
//! All methods are async and backend-agnostic. An in-memory implementation
//! for tests and demos lives in the `memory` module.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreResult;
use crate::schema::{DownloadStats, PackageId, PackageRecord, UserId, VersionRecord};

/// Document store holding packages, versions, and download statistics.
///
/// Guarantees:
/// - Package names are unique; `add_package` fails on a name collision.
/// - `add_or_set_package` upserts keyed by the record's internal id.
/// - Version strings are unique within a package; `add_version` fails on a
///   collision and `update_version` fails when the version is absent.
/// - `remove_package` verifies ownership before deleting.
#[async_trait]
pub trait PackageStore: Send + Sync {
    /// All package records, in unspecified order.
    async fn get_all_packages(&self) -> StoreResult<Vec<PackageRecord>>;

    /// Internal ids of all packages.
    async fn get_all_package_ids(&self) -> StoreResult<Vec<PackageId>>;

    /// Look up one package by name.
    async fn get_package(&self, name: &str) -> StoreResult<PackageRecord>;

    /// Look up one package by internal id.
    async fn get_package_by_id(&self, id: &PackageId) -> StoreResult<PackageRecord>;

    /// Complete dump of all package records, suitable for mirroring.
    async fn get_package_dump(&self) -> StoreResult<Vec<PackageRecord>>;

    /// Insert a new package. Fails if the name is taken.
    async fn add_package(&self, record: PackageRecord) -> StoreResult<()>;

    /// Upsert a package keyed by its internal id.
    async fn add_or_set_package(&self, record: PackageRecord) -> StoreResult<()>;

    /// Delete a package after verifying the owner.
    async fn remove_package(&self, name: &str, owner: &UserId) -> StoreResult<()>;

    async fn set_package_categories(&self, name: &str, categories: Vec<String>) -> StoreResult<()>;

    async fn set_package_repository(&self, name: &str, repository: Value) -> StoreResult<()>;

    /// Replace the package's diagnostics with those of the latest run.
    async fn set_package_errors(&self, name: &str, errors: Vec<String>) -> StoreResult<()>;

    /// Insert a new version record. Fails if the version string exists.
    async fn add_version(&self, name: &str, version: VersionRecord) -> StoreResult<()>;

    /// Replace an existing version record in place.
    async fn update_version(&self, name: &str, version: VersionRecord) -> StoreResult<()>;

    async fn remove_version(&self, name: &str, version: &str) -> StoreResult<()>;

    async fn has_version(&self, name: &str, version: &str) -> StoreResult<bool>;

    async fn get_version_info(&self, name: &str, version: &str) -> StoreResult<VersionRecord>;

    /// Highest released (non-branch) version by SemVer precedence, if any.
    async fn get_latest_version(&self, name: &str) -> StoreResult<Option<String>>;

    /// Case-insensitive text search over names and descriptions.
    async fn search_packages(&self, query: &str) -> StoreResult<Vec<PackageRecord>>;

    /// Names of the packages owned by a user.
    async fn get_user_packages(&self, owner: &UserId) -> StoreResult<Vec<String>>;

    async fn is_user_package(&self, owner: &UserId, name: &str) -> StoreResult<bool>;

    /// Count one download of the given version.
    async fn add_download(&self, id: &PackageId, version: &str) -> StoreResult<()>;

    /// Download counts for the whole package or a single version.
    async fn get_download_stats(
        &self,
        id: &PackageId,
        version: Option<&str>,
    ) -> StoreResult<DownloadStats>;
}
