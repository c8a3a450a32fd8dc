//! Record types persisted by the registry.
//!
//! These are semantic types, not a storage schema: every backend maps them
//! however it likes, but the invariants documented here hold everywhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

// ---------------------------------------------------------------------------
// PackageId
// ---------------------------------------------------------------------------

/// Internal package identifier (24 lowercase hex chars).
///
/// The first 8 hex chars encode the creation time as unix seconds; the
/// remaining 16 are random. The inner field is private so an id is always
/// either freshly generated or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageId(String);

impl PackageId {
    /// Generate a new id stamped with the current time.
    pub fn generate() -> Self {
        Self::generate_at(Utc::now())
    }

    /// Generate a new id stamped with the given creation time.
    pub fn generate_at(when: DateTime<Utc>) -> Self {
        let random = uuid::Uuid::new_v4().simple().to_string();
        PackageId(format!("{:08x}{}", when.timestamp() as u32, &random[..16]))
    }

    /// The creation time embedded in the id.
    pub fn created_at(&self) -> DateTime<Utc> {
        let secs = u32::from_str_radix(&self.0[..8], 16).unwrap_or(0);
        DateTime::from_timestamp(i64::from(secs), 0).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PackageId {
    type Error = StoreError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 24 || !s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()) {
            return Err(StoreError::InvalidId(s));
        }
        Ok(PackageId(s))
    }
}

impl From<PackageId> for String {
    fn from(id: PackageId) -> String {
        id.0
    }
}

impl std::fmt::Display for PackageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// UserId
// ---------------------------------------------------------------------------

/// Opaque reference to a user account (owner of a package).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// VersionRecord
// ---------------------------------------------------------------------------

/// One release or branch snapshot of a package.
///
/// `version` is either a SemVer string ("1.2.3-rc.1") for a tagged release or
/// `"~NAME"` for the tip of branch NAME. Within a package, version strings
/// are unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: String,
    /// Commit the version points at, as reported by the repository driver.
    pub commit_sha: String,
    pub date: DateTime<Utc>,
    /// Normalized recipe document, including the `packageDescriptionFile` key.
    pub recipe: serde_json::Value,
    /// Repository-relative path of the README, when one was found.
    pub readme_path: Option<String>,
}

// ---------------------------------------------------------------------------
// PackageRecord
// ---------------------------------------------------------------------------

/// A registry-visible package.
///
/// The canonical lowercase `name` is the external identity and is unique
/// across the registry; `id` is internal and only used to key mirror upserts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub id: PackageId,
    pub owner: UserId,
    pub name: String,
    /// Opaque repository descriptor understood by the repository driver.
    pub repository: serde_json::Value,
    pub categories: Vec<String>,
    pub versions: Vec<VersionRecord>,
    /// Diagnostics from the latest reconciliation run.
    pub errors: Vec<String>,
}

impl PackageRecord {
    /// Create an empty record for a freshly registered package.
    pub fn new(owner: UserId, name: impl Into<String>, repository: serde_json::Value) -> Self {
        PackageRecord {
            id: PackageId::generate(),
            owner,
            name: name.into(),
            repository,
            categories: Vec::new(),
            versions: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Find a stored version by its version string.
    pub fn version(&self, version: &str) -> Option<&VersionRecord> {
        self.versions.iter().find(|v| v.version == version)
    }
}

// ---------------------------------------------------------------------------
// DownloadStats
// ---------------------------------------------------------------------------

/// Aggregated download counts for a package or a single version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadStats {
    pub downloads: u64,
}
