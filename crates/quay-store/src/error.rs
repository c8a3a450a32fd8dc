//! Error types for quay-store

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in the persistence layer
#[derive(Error, Debug)]
pub enum StoreError {
    /// Package lookup failed
    #[error("package not found: {0}")]
    PackageNotFound(String),

    /// Version lookup failed within a package
    #[error("package {package} has no version {version}")]
    VersionNotFound { package: String, version: String },

    /// Insert collided with an existing package name
    #[error("package already exists: {0}")]
    PackageExists(String),

    /// Insert collided with an existing version string
    #[error("package {package} already has version {version}")]
    VersionExists { package: String, version: String },

    /// Caller does not own the package
    #[error("package {package} is not owned by {owner}")]
    NotOwner { package: String, owner: String },

    /// Malformed package id
    #[error("invalid package id: {0}")]
    InvalidId(String),

    /// Backend connection error
    #[error("store connection failed: {0}")]
    Connection(String),

    /// Backend query error
    #[error("store query failed: {0}")]
    Query(String),

    /// Record (de)serialization error
    #[error("store serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
