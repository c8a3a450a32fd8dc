//! quay-store: persistence abstraction for the quay package registry.
//!
//! The registry engine never talks to a database directly; everything goes
//! through the [`PackageStore`] trait defined here. The crate ships:
//! - the record types shared across the workspace (`schema` module),
//! - the `PackageStore` trait (`store` module),
//! - an in-memory implementation (`memory` module) used by tests and the
//!   demo daemon.

pub mod error;
pub mod memory;
pub mod schema;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryPackageStore;
pub use schema::{DownloadStats, PackageId, PackageRecord, UserId, VersionRecord};
pub use store::PackageStore;
