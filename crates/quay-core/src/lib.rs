//! quay-core: the package update engine and coordination layer of the
//! quay registry.
//!
//! Re-exports the engine's building blocks:
//! - validators for package names and recipe documents,
//! - the repository driver abstraction and the GitHub driver,
//! - the per-package reconciler and the update queue,
//! - the registry facade with its view cache,
//! - the mirror reconciler.

pub mod config;
pub mod error;
pub mod fakes;
pub mod github;
pub mod mirror;
pub mod queue;
pub mod recipe;
pub mod reconciler;
pub mod registry;
pub mod repository;
pub mod telemetry;
pub mod validation;
pub mod version;

pub use config::{RegistryConfig, DEFAULT_RECIPE_FILENAMES};
pub use error::{RegistryError, Result, ValidationError};
pub use github::{GithubConfig, GithubProvider, GithubRepository};
pub use mirror::{converge_dump, mirror_registry, MirrorClient};
pub use queue::{UpdateHandler, UpdateQueue};
pub use recipe::{parse_recipe, DESCRIPTION_FILE_KEY};
pub use registry::Registry;
pub use repository::{
    resolve_version_info, validate_repository, RepoRef, Repository, RepositoryProvider,
    VersionInfo,
};
pub use telemetry::init_tracing;
pub use validation::{check_dependency_path, check_package_name, validate_recipe};
pub use version::{tag_semver, VersionSpec};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
