//! quayd: operator driver for the quay package registry.
//!
//! ## Commands
//!
//! - `validate-url`: probe an upstream registry before configuring it as a
//!   mirror source
//! - `mirror`: pull the upstream package dump and converge local state,
//!   once or on an interval
//! - `add`: register a GitHub repository as a new package
//! - `rescan`: reconcile every known package against its repository
//!
//! State lives in the in-memory store; wire a persistent `PackageStore`
//! implementation here when deploying for real.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use quay_core::{
    mirror_registry, GithubConfig, GithubProvider, MirrorClient, Registry, RegistryConfig,
};
use quay_store::{MemoryPackageStore, UserId};

#[derive(Parser)]
#[command(name = "quayd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Package registry update engine", long_about = None)]
struct Cli {
    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe an upstream registry's mirror endpoints
    ValidateUrl {
        /// Base URL of the upstream registry (must end with a slash)
        url: String,
    },

    /// Pull the upstream dump and converge local state
    Mirror {
        /// Base URL of the upstream registry (must end with a slash)
        url: String,

        /// Repeat the pull on this interval (seconds) instead of once
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Register a GitHub repository as a new package
    Add {
        /// Repository owner (user or organization)
        owner: String,

        /// Repository name
        project: String,

        /// Registry account to own the package
        #[arg(long, default_value = "operator")]
        user: String,
    },

    /// Reconcile every known package against its repository
    Rescan,
}

fn make_registry() -> Arc<Registry> {
    let config = RegistryConfig::from_env();
    let store = Arc::new(MemoryPackageStore::new());
    let provider = Arc::new(GithubProvider::new(GithubConfig::from_env()));
    Registry::new(config, store, provider)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    quay_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::ValidateUrl { url } => {
            let client = MirrorClient::new(url)?;
            client.validate().await.context("mirror validation failed")?;
            info!(mirror = client.base_url(), "mirror URL is usable");
        }

        Commands::Mirror { url, interval } => {
            let client = MirrorClient::new(url)?;
            client.validate().await.context("mirror validation failed")?;
            let registry = make_registry();
            match interval {
                None => mirror_registry(&registry, &client).await?,
                Some(secs) => loop {
                    if let Err(err) = mirror_registry(&registry, &client).await {
                        tracing::error!(error = %err, "mirror cycle failed");
                    }
                    tokio::time::sleep(Duration::from_secs(secs)).await;
                },
            }
        }

        Commands::Add {
            owner,
            project,
            user,
        } => {
            let registry = make_registry();
            let descriptor = serde_json::json!({
                "kind": "github",
                "owner": owner,
                "project": project,
            });
            let name = registry
                .add_package(descriptor, UserId::new(user))
                .await
                .context("package registration failed")?;
            info!(package = %name, "package registered and queued for update");
        }

        Commands::Rescan => {
            let registry = make_registry();
            registry.check_for_new_versions_all().await?;
        }
    }

    Ok(())
}
