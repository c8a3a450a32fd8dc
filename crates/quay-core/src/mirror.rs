//! Mirror mode: converge the local package set against an upstream
//! registry's dump.
//!
//! A secondary registry bootstraps and refreshes itself by fetching
//! `api/packages/dump` from a primary. The dump is authoritative: packages
//! absent from it are deleted locally. Deletions run before upserts so a
//! renamed package cannot collide with its own old name.

use std::collections::HashSet;

use tracing::{info, warn};

use quay_store::{PackageId, PackageRecord};

use crate::error::{RegistryError, Result};
use crate::registry::Registry;

const PROBE_ENDPOINTS: &[&str] = &["packages/index.json", "api/packages/search?q=foobar"];

/// HTTP client for one upstream registry.
pub struct MirrorClient {
    base_url: String,
    client: reqwest::Client,
}

impl MirrorClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("quay-mirror/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(MirrorClient {
            base_url: base_url.into(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Validate the mirror URL: it must end with a slash and the upstream
    /// must answer HEAD probes on the well-known endpoints with a
    /// non-error status.
    pub async fn validate(&self) -> Result<()> {
        if !self.base_url.ends_with('/') {
            return Err(RegistryError::Mirror(
                "the mirror URL must end with a slash".to_string(),
            ));
        }
        for probe in PROBE_ENDPOINTS {
            let url = format!("{}{}", self.base_url, probe);
            let response = self
                .client
                .head(&url)
                .send()
                .await
                .map_err(|e| RegistryError::Mirror(format!("{url}: {e}")))?;
            if response.status().as_u16() >= 400 {
                return Err(RegistryError::Mirror(format!(
                    "{url} responded with status {}",
                    response.status()
                )));
            }
        }
        Ok(())
    }

    /// Fetch the complete package dump.
    pub async fn fetch_dump(&self) -> Result<Vec<PackageRecord>> {
        let url = format!("{}api/packages/dump", self.base_url);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

/// Run one mirror pull cycle.
///
/// Transport or decode failures abort the cycle; per-package failures are
/// logged and skipped.
pub async fn mirror_registry(registry: &Registry, client: &MirrorClient) -> Result<()> {
    let dump = client.fetch_dump().await?;
    info!(
        mirror = client.base_url(),
        packages = dump.len(),
        "fetched package dump"
    );
    converge_dump(registry, dump).await
}

/// Converge local state against an already-fetched dump.
pub async fn converge_dump(registry: &Registry, dump: Vec<PackageRecord>) -> Result<()> {
    let upstream: HashSet<PackageId> = dump.iter().map(|p| p.id.clone()).collect();

    // Pass 1: deletions first, to free names for the upserts below.
    for local in registry.store().get_all_packages().await? {
        if !upstream.contains(&local.id) {
            match registry.remove_package(&local.name, &local.owner).await {
                Ok(()) => info!(package = %local.name, "removed package absent upstream"),
                Err(e) => {
                    warn!(package = %local.name, error = %e, "failed to remove package")
                }
            }
        }
    }

    // Pass 2: upsert every upstream record, keyed by id.
    for record in dump {
        let name = record.name.clone();
        if let Err(e) = registry.add_or_set_package(record).await {
            warn!(package = %name, error = %e, "failed to upsert package");
        }
    }

    Ok(())
}
