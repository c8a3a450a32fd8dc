//! Repository driver abstraction.
//!
//! A `Repository` resolves a hosted source repository: its tags and
//! branches, file contents at a commit, and download URLs. The engine
//! obtains one from a [`RepositoryProvider`] given the opaque descriptor
//! stored on a package. On top of the driver primitives this module builds
//! the version-info resolver and the submission-time repository validator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::recipe::{parse_recipe, recipe_name, DESCRIPTION_FILE_KEY};
use crate::validation::validate_recipe;
use crate::version::tag_semver;

/// A named pointer into a repository (tag or branch).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub name: String,
    pub sha: String,
    pub date: DateTime<Utc>,
}

/// Resolved metadata for one tag or branch.
#[derive(Debug, Clone)]
pub struct VersionInfo {
    pub date: DateTime<Utc>,
    pub sha: String,
    /// Normalized recipe document with `packageDescriptionFile` recorded.
    pub recipe: Value,
}

/// Driver for one upstream repository.
///
/// Implementations are assumed safe for concurrent reads of distinct
/// repositories. `read_file` fails with `RegistryError::FileNotFound` when
/// the path is absent at the commit; all other failures are transport
/// errors.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_tags(&self) -> Result<Vec<RepoRef>>;

    async fn get_branches(&self) -> Result<Vec<RepoRef>>;

    /// Read a file at a commit. `path` is repository-absolute ("/quay.json").
    async fn read_file(&self, sha: &str, path: &str) -> Result<Vec<u8>>;

    /// Archive download for a version ref ("~branch" or "vX.Y.Z").
    async fn download(&self, version_ref: &str) -> Result<Vec<u8>>;

    /// Direct archive URL for a version ref ("~branch" or "vX.Y.Z").
    fn download_url(&self, version_ref: &str) -> String;

    /// Resolve normalized version metadata for a tag or branch.
    ///
    /// `preferred_filename` is the recipe filename recorded on a previous
    /// update of the same version; trying it first keeps the common case at
    /// one repository read.
    async fn version_info(
        &self,
        reference: &RepoRef,
        preferred_filename: Option<&str>,
        candidates: &[String],
    ) -> Result<VersionInfo> {
        resolve_version_info(self, reference, preferred_filename, candidates).await
    }
}

/// Resolves opaque repository descriptors to drivers.
pub trait RepositoryProvider: Send + Sync {
    fn get_repository(&self, descriptor: &Value) -> Result<std::sync::Arc<dyn Repository>>;
}

/// The version-info resolution algorithm shared by all drivers.
///
/// Tries the preferred filename first, then the configured candidates in
/// order (skipping the preferred one). A missing candidate is skipped
/// silently; any other read error propagates. Exhausting all candidates
/// fails with [`RegistryError::RecipeNotFound`].
pub async fn resolve_version_info<R: Repository + ?Sized>(
    repo: &R,
    reference: &RepoRef,
    preferred_filename: Option<&str>,
    candidates: &[String],
) -> Result<VersionInfo> {
    let preferred = preferred_filename.filter(|p| !p.is_empty());
    let mut order: Vec<&str> = Vec::with_capacity(candidates.len() + 1);
    if let Some(p) = preferred {
        order.push(p);
    }
    order.extend(
        candidates
            .iter()
            .map(String::as_str)
            .filter(|c| Some(*c) != preferred),
    );

    for path in order {
        let bytes = match repo.read_file(&reference.sha, path).await {
            Ok(bytes) => bytes,
            Err(RegistryError::FileNotFound(_)) => continue,
            Err(e) => return Err(e),
        };
        let text = String::from_utf8(bytes).map_err(|_| {
            RegistryError::Repository(format!("{path} is not valid UTF-8"))
        })?;
        let mut doc = parse_recipe(&text, path)?;
        doc[DESCRIPTION_FILE_KEY] = Value::String(path.to_string());
        return Ok(VersionInfo {
            date: reference.date,
            sha: reference.sha.clone(),
            recipe: doc,
        });
    }

    Err(RegistryError::RecipeNotFound)
}

/// Validate a newly submitted repository and derive its canonical package
/// name.
///
/// Checks, in order:
/// 1. the repository has at least one branch,
/// 2. some branch (with `master` preferred) yields a recipe that passes
///    validation, and the first such branch wins,
/// 3. the repository has at least one `v`-prefixed SemVer tag.
///
/// Returns the recipe's declared name.
pub async fn validate_repository<R: Repository + ?Sized>(
    repo: &R,
    config: &RegistryConfig,
) -> Result<String> {
    let mut branches = repo.get_branches().await?;
    if branches.is_empty() {
        return Err(RegistryError::Repository(
            "the repository contains no branches".to_string(),
        ));
    }
    if let Some(pos) = branches.iter().position(|b| b.name == "master") {
        let master = branches.remove(pos);
        branches.insert(0, master);
    }

    let mut branch_errors = Vec::new();
    let mut package_name = None;
    for branch in &branches {
        let outcome = match repo
            .version_info(branch, None, &config.recipe_filenames)
            .await
        {
            Ok(info) => {
                let filename = info
                    .recipe
                    .get(DESCRIPTION_FILE_KEY)
                    .and_then(|f| f.as_str())
                    .unwrap_or_default()
                    .to_string();
                validate_recipe(&info.recipe, &filename, config.max_name_length)
                    .map_err(RegistryError::from)
                    .map(|()| recipe_name(&info.recipe).unwrap_or_default().to_string())
            }
            Err(e) => Err(e),
        };
        match outcome {
            Ok(name) => {
                package_name = Some(name);
                break;
            }
            Err(e) => branch_errors.push(format!("{}: {}", branch.name, e)),
        }
    }

    let Some(name) = package_name else {
        return Err(RegistryError::Repository(format!(
            "no branch yielded a valid package recipe:\n{}",
            branch_errors.join("\n")
        )));
    };

    let tags = repo.get_tags().await?;
    if !tags.iter().any(|t| tag_semver(&t.name).is_some()) {
        return Err(RegistryError::Repository(
            "the repository must have at least one tagged version of the form v1.2.3"
                .to_string(),
        ));
    }

    Ok(name)
}
