//! Domain-level error taxonomy for the registry engine.

use quay_store::StoreError;

/// Errors produced by package-name and recipe validation.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid package name \"{name}\": {reason}")]
    PackageName { name: String, reason: String },

    #[error("{filename}: {message}")]
    Recipe { filename: String, message: String },
}

/// Registry engine errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("repository error: {0}")]
    Repository(String),

    /// A repository file read missed. The version-info resolver treats this
    /// as "try the next candidate"; everything else propagates it.
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("Found no package description file in the repository.")]
    RecipeNotFound,

    #[error("invalid version string \"{0}\"")]
    InvalidVersion(String),

    #[error("package name ({actual}) does not match the registered package name ({expected})")]
    NameMismatch { expected: String, actual: String },

    #[error("the update queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("mirror validation failed: {0}")]
    Mirror(String),

    #[error("no version {version} for package {package}")]
    VersionNotFound { package: String, version: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type for registry engine operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipe_not_found_message_is_stable() {
        // Callers and operators grep for this exact wording.
        assert_eq!(
            RegistryError::RecipeNotFound.to_string(),
            "Found no package description file in the repository."
        );
    }

    #[test]
    fn validation_error_carries_filename() {
        let err = ValidationError::Recipe {
            filename: "/quay.json".to_string(),
            message: "missing \"license\" field".to_string(),
        };
        assert!(err.to_string().starts_with("/quay.json:"));
    }
}
