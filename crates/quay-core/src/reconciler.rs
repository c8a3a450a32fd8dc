//! Per-package reconciliation: make the stored versions agree with the
//! upstream repository's tags and branches.
//!
//! `check_for_new_versions` is total with respect to upstream trouble:
//! every per-tag and per-branch failure is captured into the package's
//! diagnostics and the run continues. Versions are only pruned after a
//! fully successful enumeration, so a flaky upstream can never trigger a
//! mass deletion.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, error, info, warn};

use quay_store::VersionRecord;

use crate::error::{RegistryError, Result};
use crate::queue::UpdateHandler;
use crate::recipe::{recipe_name, DESCRIPTION_FILE_KEY};
use crate::registry::Registry;
use crate::repository::{RepoRef, Repository};
use crate::validation::validate_recipe;
use crate::version::{tag_semver, VersionSpec};

/// Branch whose per-version errors are suppressed (a hosting convention:
/// the branch carries a website, not code).
const GH_PAGES: &str = "gh-pages";

impl Registry {
    /// Reconcile one package against its upstream repository.
    ///
    /// Returns `Err` only when the final diagnostics write fails; every
    /// upstream problem ends up in the package's error list instead.
    pub async fn check_for_new_versions(&self, name: &str) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        let package = match self.store.get_package(name).await {
            Ok(p) => p,
            Err(e) => {
                errors.push(format!("Error getting package info: {e}"));
                return self.finish_update(name, errors).await;
            }
        };

        let repo = match self.provider.get_repository(&package.repository) {
            Ok(r) => r,
            Err(e) => {
                errors.push(format!("Error accessing repository: {e}"));
                return self.finish_update(name, errors).await;
            }
        };

        // Enumerate tags and branches. Pruning below is only allowed when
        // this succeeded in full.
        let mut got_all = true;
        let mut tags = Vec::new();
        let mut branches = Vec::new();
        let refs = async {
            let tags = repo.get_tags().await?;
            let branches = repo.get_branches().await?;
            Ok::<_, RegistryError>((tags, branches))
        };
        match refs.await {
            Ok((t, b)) => {
                tags = t;
                branches = b;
            }
            Err(e) => {
                errors.push(format!("Failed to get GIT tags/branches: {e}"));
                got_all = false;
            }
        }

        // Tags: keep v-prefixed SemVer only, process in SemVer order.
        let mut releases: Vec<(semver::Version, RepoRef)> = tags
            .into_iter()
            .filter_map(|t| tag_semver(&t.name).map(|v| (v, t)))
            .collect();
        releases.sort_by(|a, b| a.0.cmp(&b.0));

        let mut existing: HashSet<String> = HashSet::new();

        for (_, tag) in &releases {
            let version = tag.name[1..].to_string();
            existing.insert(version.clone());
            match self
                .add_version_from_ref(name, &version, repo.as_ref(), tag)
                .await
            {
                Ok(true) => info!(package = name, version = %version, "added version"),
                Ok(false) => {}
                Err(e) => errors.push(format!("Version {version}: {e}")),
            }
        }

        for branch in &branches {
            if branch.name == GH_PAGES && self.config.skip_gh_pages {
                continue;
            }
            let version = format!("~{}", branch.name);
            existing.insert(version.clone());
            match self
                .add_version_from_ref(name, &version, repo.as_ref(), branch)
                .await
            {
                Ok(true) => info!(package = name, version = %version, "added branch version"),
                Ok(false) => {}
                Err(e) => {
                    if branch.name != GH_PAGES {
                        errors.push(format!("Branch {version}: {e}"));
                    }
                }
            }
        }

        // Prune versions that disappeared upstream, but never on partial
        // enumeration data.
        if got_all {
            for version in &package.versions {
                if !existing.contains(&version.version) {
                    match self.store.remove_version(name, &version.version).await {
                        Ok(()) => {
                            self.invalidate_cached_view(name);
                            info!(package = name, version = %version.version, "removed version");
                        }
                        Err(e) => errors.push(format!("Version {}: {e}", version.version)),
                    }
                }
            }
        }

        self.finish_update(name, errors).await
    }

    /// Replace the package's diagnostics with this run's and drop the
    /// cached view.
    async fn finish_update(&self, name: &str, errors: Vec<String>) -> Result<()> {
        if !errors.is_empty() {
            warn!(
                package = name,
                diagnostics = errors.len(),
                "update completed with diagnostics"
            );
        }
        self.store.set_package_errors(name, errors).await?;
        self.invalidate_cached_view(name);
        Ok(())
    }

    /// Add or refresh one version from a tag or branch ref.
    ///
    /// Returns `true` when the version is new, `false` when an existing
    /// record was updated in place.
    pub(crate) async fn add_version_from_ref(
        &self,
        name: &str,
        version: &str,
        repo: &dyn Repository,
        reference: &RepoRef,
    ) -> Result<bool> {
        debug!(package = name, version = version, "resolving version");
        VersionSpec::parse(version)?;

        // Reuse the recipe filename found on the previous update of this
        // version, if any, to keep the common case at one repository read.
        let package = self.store.get_package(name).await?;
        let preferred = package
            .version(version)
            .and_then(|v| v.recipe.get(DESCRIPTION_FILE_KEY))
            .and_then(|f| f.as_str())
            .map(str::to_string);

        // Anything cached for this package is stale from here on.
        self.invalidate_cached_view(name);

        let info = repo
            .version_info(reference, preferred.as_deref(), &self.config.recipe_filenames)
            .await?;
        let mut recipe = info.recipe;

        let declared = recipe_name(&recipe).unwrap_or_default().to_lowercase();
        recipe["name"] = json!(declared);
        if declared != name {
            return Err(RegistryError::NameMismatch {
                expected: name.to_string(),
                actual: declared,
            });
        }

        let filename = recipe
            .get(DESCRIPTION_FILE_KEY)
            .and_then(|f| f.as_str())
            .unwrap_or_default()
            .to_string();
        validate_recipe(&recipe, &filename, self.config.max_name_length)?;

        if let Some(inline) = recipe.get("version") {
            if inline.as_str() != Some(version) {
                return Err(RegistryError::Repository(format!(
                    "the recipe contains an obsolete \"version\" field ({inline}) \
                     that does not match the tag or branch name ({version})"
                )));
            }
        }

        // README probe; absence (or any read trouble) is silent.
        let readme_path = match repo.read_file(&info.sha, "/README.md").await {
            Ok(_) => Some("/README.md".to_string()),
            Err(_) => None,
        };

        let record = VersionRecord {
            version: version.to_string(),
            commit_sha: info.sha,
            date: info.date,
            recipe,
            readme_path,
        };

        if self.store.has_version(name, version).await? {
            self.store.update_version(name, record).await?;
            Ok(false)
        } else {
            self.store.add_version(name, record).await?;
            Ok(true)
        }
    }
}

#[async_trait]
impl UpdateHandler for Registry {
    async fn process(&self, name: &str) {
        if let Err(err) = self.check_for_new_versions(name).await {
            error!(package = name, error = %err, "package update failed");
        }
    }
}
