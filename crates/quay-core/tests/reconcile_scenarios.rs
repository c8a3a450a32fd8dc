//! End-to-end reconciliation scenarios over the in-memory store and the
//! fake repository driver: registration, tag/branch version tracking,
//! pruning rules, per-version diagnostics, and the view cache discipline.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::{sleep, timeout};

use quay_core::fakes::{FakeRepository, FakeRepositoryProvider};
use quay_core::{Registry, RegistryConfig};
use quay_store::{MemoryPackageStore, PackageRecord, PackageStore, UserId};

fn recipe(name: &str) -> String {
    json!({"name": name, "description": "a demo package", "license": "MIT"}).to_string()
}

fn setup(config: RegistryConfig) -> (Arc<Registry>, Arc<MemoryPackageStore>, Arc<FakeRepository>) {
    let store = Arc::new(MemoryPackageStore::new());
    let repo = Arc::new(FakeRepository::new());
    let provider = FakeRepositoryProvider::new();
    provider.register("upstream", repo.clone());
    let registry = Registry::new(config, store.clone(), Arc::new(provider));
    (registry, store, repo)
}

fn descriptor() -> Value {
    FakeRepositoryProvider::descriptor("upstream")
}

async fn seed_package(store: &MemoryPackageStore, name: &str) {
    store
        .add_package(PackageRecord::new(UserId::new("u1"), name, descriptor()))
        .await
        .unwrap();
}

fn version_strings(record: &PackageRecord) -> Vec<String> {
    let mut versions: Vec<String> = record.versions.iter().map(|v| v.version.clone()).collect();
    versions.sort();
    versions
}

async fn wait_for_version_count(store: &MemoryPackageStore, name: &str, count: usize) {
    timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(pack) = store.get_package(name).await {
                if pack.versions.len() == count {
                    return;
                }
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("package never reached the expected version count");
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s1_submission_enqueues_and_drain_adds_tag_and_branch() {
    let (registry, store, repo) = setup(RegistryConfig::default());
    repo.add_branch("master", "sha1");
    repo.add_tag("v1.0.0", "sha1");
    repo.put_file("sha1", "/quay.json", recipe("foo"));

    let name = registry
        .add_package(descriptor(), UserId::new("u1"))
        .await
        .unwrap();
    assert_eq!(name, "foo");

    // add_package queues the first reconciliation; the drain worker picks
    // it up in the background.
    wait_for_version_count(&store, "foo", 2).await;
    let pack = store.get_package("foo").await.unwrap();
    assert_eq!(version_strings(&pack), vec!["1.0.0", "~master"]);
    assert!(pack.errors.is_empty());
}

#[tokio::test]
async fn s2_non_semver_tags_are_ignored() {
    let (registry, store, repo) = setup(RegistryConfig::default());
    repo.add_branch("master", "sha1");
    repo.add_tag("v1.0.0", "sha1");
    repo.add_tag("vbogus", "sha1");
    repo.put_file("sha1", "/quay.json", recipe("foo"));
    seed_package(&store, "foo").await;

    registry.check_for_new_versions("foo").await.unwrap();

    let pack = store.get_package("foo").await.unwrap();
    assert_eq!(version_strings(&pack), vec!["1.0.0", "~master"]);
    assert!(pack.errors.is_empty());
}

#[tokio::test]
async fn s3_submission_without_semver_tag_creates_nothing() {
    let (registry, store, repo) = setup(RegistryConfig::default());
    repo.add_branch("master", "sha1");
    repo.put_file("sha1", "/quay.json", recipe("foo"));

    let err = registry
        .add_package(descriptor(), UserId::new("u1"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("must have at least one tagged version"));
    assert!(store.get_package("foo").await.is_err());
}

#[tokio::test]
async fn s4_deleted_tag_is_pruned_after_successful_enumeration() {
    let (registry, store, repo) = setup(RegistryConfig::default());
    repo.add_branch("master", "sha1");
    repo.add_tag("v1.0.0", "sha1");
    repo.put_file("sha1", "/quay.json", recipe("foo"));
    seed_package(&store, "foo").await;

    registry.check_for_new_versions("foo").await.unwrap();
    assert_eq!(
        version_strings(&store.get_package("foo").await.unwrap()),
        vec!["1.0.0", "~master"]
    );

    repo.remove_tag("v1.0.0");
    registry.check_for_new_versions("foo").await.unwrap();

    let pack = store.get_package("foo").await.unwrap();
    assert_eq!(version_strings(&pack), vec!["~master"]);
    assert!(pack.errors.is_empty());
}

#[tokio::test]
async fn s5_failed_enumeration_never_prunes() {
    let (registry, store, repo) = setup(RegistryConfig::default());
    repo.add_branch("master", "sha1");
    repo.add_tag("v1.0.0", "sha1");
    repo.put_file("sha1", "/quay.json", recipe("foo"));
    seed_package(&store, "foo").await;

    registry.check_for_new_versions("foo").await.unwrap();
    assert_eq!(store.get_package("foo").await.unwrap().versions.len(), 2);

    repo.set_refs_error(Some("connection reset by peer"));
    registry.check_for_new_versions("foo").await.unwrap();

    let pack = store.get_package("foo").await.unwrap();
    // Last-known versions survive the partial run.
    assert_eq!(version_strings(&pack), vec!["1.0.0", "~master"]);
    assert_eq!(pack.errors.len(), 1);
    assert!(pack.errors[0].starts_with("Failed to get GIT tags/branches"));

    // The view still exposes them.
    let view = registry.get_package_info("foo", false).await.unwrap();
    assert_eq!(view["versions"].as_array().unwrap().len(), 2);
}

// ---------------------------------------------------------------------------
// Per-version diagnostics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn broken_tag_is_reported_without_aborting_the_run() {
    let (registry, store, repo) = setup(RegistryConfig::default());
    repo.add_branch("master", "sha1");
    repo.add_tag("v1.0.0", "sha1");
    repo.add_tag("v2.0.0", "sha2"); // no recipe at sha2
    repo.put_file("sha1", "/quay.json", recipe("foo"));
    seed_package(&store, "foo").await;

    registry.check_for_new_versions("foo").await.unwrap();

    let pack = store.get_package("foo").await.unwrap();
    assert_eq!(version_strings(&pack), vec!["1.0.0", "~master"]);
    assert_eq!(pack.errors.len(), 1);
    assert!(pack.errors[0].starts_with("Version 2.0.0:"));
    assert!(pack.errors[0].contains("Found no package description file"));
}

#[tokio::test]
async fn recipe_name_mismatch_rejects_the_version() {
    let (registry, store, repo) = setup(RegistryConfig::default());
    repo.add_branch("master", "sha1");
    repo.add_tag("v1.0.0", "sha1");
    repo.put_file("sha1", "/quay.json", recipe("bar"));
    seed_package(&store, "foo").await;

    registry.check_for_new_versions("foo").await.unwrap();

    let pack = store.get_package("foo").await.unwrap();
    assert!(pack.versions.is_empty());
    assert!(pack
        .errors
        .iter()
        .any(|e| e.starts_with("Version 1.0.0:") && e.contains("does not match")));
}

#[tokio::test]
async fn inline_version_field_must_match_the_tag() {
    let (registry, store, repo) = setup(RegistryConfig::default());
    repo.add_branch("master", "sha1");
    repo.add_tag("v1.0.0", "sha1");
    let doc = json!({
        "name": "foo",
        "description": "d",
        "license": "MIT",
        "version": "0.9.0"
    });
    repo.put_file("sha1", "/quay.json", doc.to_string());
    seed_package(&store, "foo").await;

    registry.check_for_new_versions("foo").await.unwrap();

    let pack = store.get_package("foo").await.unwrap();
    assert!(!pack.versions.iter().any(|v| v.version == "1.0.0"));
    assert!(pack
        .errors
        .iter()
        .any(|e| e.starts_with("Version 1.0.0:") && e.contains("obsolete")));
}

#[tokio::test]
async fn same_tag_updates_in_place() {
    let (registry, store, repo) = setup(RegistryConfig::default());
    repo.add_branch("master", "sha1");
    repo.add_tag("v1.0.0", "sha1");
    repo.put_file("sha1", "/quay.json", recipe("foo"));
    seed_package(&store, "foo").await;

    registry.check_for_new_versions("foo").await.unwrap();

    let doc = json!({"name": "foo", "description": "rewritten", "license": "MIT"});
    repo.put_file("sha1", "/quay.json", doc.to_string());
    registry.check_for_new_versions("foo").await.unwrap();

    let pack = store.get_package("foo").await.unwrap();
    let ver = pack.version("1.0.0").unwrap();
    assert_eq!(ver.recipe["description"], "rewritten");
    assert_eq!(
        pack.versions.iter().filter(|v| v.version == "1.0.0").count(),
        1
    );
}

// ---------------------------------------------------------------------------
// gh-pages carve-out
// ---------------------------------------------------------------------------

#[tokio::test]
async fn gh_pages_errors_are_suppressed_but_addition_is_attempted() {
    let (registry, store, repo) = setup(RegistryConfig::default());
    repo.add_branch("master", "sha1");
    repo.add_branch("gh-pages", "sha-pages"); // no recipe on the pages branch
    repo.add_tag("v1.0.0", "sha1");
    repo.put_file("sha1", "/quay.json", recipe("foo"));
    seed_package(&store, "foo").await;

    registry.check_for_new_versions("foo").await.unwrap();

    let pack = store.get_package("foo").await.unwrap();
    assert_eq!(version_strings(&pack), vec!["1.0.0", "~master"]);
    assert!(pack.errors.is_empty(), "gh-pages errors must be dropped");
}

#[tokio::test]
async fn gh_pages_with_valid_recipe_is_added_as_a_version() {
    let (registry, store, repo) = setup(RegistryConfig::default());
    repo.add_branch("master", "sha1");
    repo.add_branch("gh-pages", "sha1");
    repo.add_tag("v1.0.0", "sha1");
    repo.put_file("sha1", "/quay.json", recipe("foo"));
    seed_package(&store, "foo").await;

    registry.check_for_new_versions("foo").await.unwrap();

    let pack = store.get_package("foo").await.unwrap();
    assert!(pack.versions.iter().any(|v| v.version == "~gh-pages"));
}

#[tokio::test]
async fn gh_pages_can_be_skipped_entirely_by_config() {
    let config = RegistryConfig::default().with_skip_gh_pages(true);
    let (registry, store, repo) = setup(config);
    repo.add_branch("master", "sha1");
    repo.add_branch("gh-pages", "sha1");
    repo.add_tag("v1.0.0", "sha1");
    repo.put_file("sha1", "/quay.json", recipe("foo"));
    seed_package(&store, "foo").await;

    registry.check_for_new_versions("foo").await.unwrap();

    let pack = store.get_package("foo").await.unwrap();
    assert_eq!(version_strings(&pack), vec!["1.0.0", "~master"]);
    assert!(pack.errors.is_empty());
}

// ---------------------------------------------------------------------------
// Facade & cache discipline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn view_shape_includes_stable_fields_and_download_urls() {
    let (registry, store, repo) = setup(RegistryConfig::default());
    repo.add_branch("master", "sha1");
    repo.add_tag("v1.0.0", "sha1");
    repo.put_file("sha1", "/quay.json", recipe("foo"));
    repo.put_file("sha1", "/README.md", "# foo\n");
    seed_package(&store, "foo").await;
    registry.check_for_new_versions("foo").await.unwrap();

    let view = registry.get_package_info("foo", false).await.unwrap();
    assert_eq!(view["name"], "foo");
    assert_eq!(view["owner"], "u1");
    assert!(view["id"].is_string());
    assert!(view["dateAdded"].is_string());
    assert_eq!(view["repository"], descriptor());
    assert!(view.get("errors").is_none());

    let versions = view["versions"].as_array().unwrap();
    let tagged = versions
        .iter()
        .find(|v| v["version"] == "1.0.0")
        .expect("tagged version in view");
    assert_eq!(tagged["url"], "https://repo.invalid/archive/v1.0.0.zip");
    assert_eq!(tagged["packageDescriptionFile"], "/quay.json");
    assert_eq!(tagged["readme"], "# foo\n");
    assert!(tagged["date"].is_string());

    let branch = versions
        .iter()
        .find(|v| v["version"] == "~master")
        .expect("branch version in view");
    assert_eq!(branch["url"], "https://repo.invalid/archive/~master.zip");
}

#[tokio::test]
async fn error_views_are_fresh_and_never_cached() {
    let (registry, store, repo) = setup(RegistryConfig::default());
    repo.add_branch("master", "sha1");
    repo.add_tag("v1.0.0", "sha1");
    repo.put_file("sha1", "/quay.json", recipe("foo"));
    seed_package(&store, "foo").await;
    registry.check_for_new_versions("foo").await.unwrap();

    let view = registry.get_package_info("foo", true).await.unwrap();
    assert_eq!(view["errors"], json!([]));

    store
        .set_package_errors("foo", vec!["Version 1.0.0: boom".to_string()])
        .await
        .unwrap();
    let view = registry.get_package_info("foo", true).await.unwrap();
    assert_eq!(view["errors"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn writes_invalidate_the_cached_view() {
    let (registry, store, repo) = setup(RegistryConfig::default());
    repo.add_branch("master", "sha1");
    repo.add_tag("v1.0.0", "sha1");
    repo.put_file("sha1", "/quay.json", recipe("foo"));
    seed_package(&store, "foo").await;
    registry.check_for_new_versions("foo").await.unwrap();

    let before = registry.get_package_info("foo", false).await.unwrap();
    assert_eq!(before["categories"], json!([]));

    registry
        .set_package_categories("foo", vec!["web".to_string()])
        .await
        .unwrap();
    let after = registry.get_package_info("foo", false).await.unwrap();
    assert_eq!(after["categories"], json!(["web"]));
}

#[tokio::test]
async fn reconciliation_invalidates_the_cached_view() {
    let (registry, store, repo) = setup(RegistryConfig::default());
    repo.add_branch("master", "sha1");
    repo.add_tag("v1.0.0", "sha1");
    repo.put_file("sha1", "/quay.json", recipe("foo"));
    seed_package(&store, "foo").await;
    registry.check_for_new_versions("foo").await.unwrap();

    let before = registry.get_package_info("foo", false).await.unwrap();
    assert_eq!(before["versions"].as_array().unwrap().len(), 2);

    repo.add_tag("v1.1.0", "sha1");
    registry.check_for_new_versions("foo").await.unwrap();

    let after = registry.get_package_info("foo", false).await.unwrap();
    assert_eq!(after["versions"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn set_package_repository_rejects_renames() {
    let (registry, store, repo) = setup(RegistryConfig::default());
    repo.add_branch("master", "sha1");
    repo.add_tag("v1.0.0", "sha1");
    repo.put_file("sha1", "/quay.json", recipe("bar"));
    seed_package(&store, "foo").await;

    let err = registry
        .set_package_repository("foo", descriptor())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("does not match"));
}

#[tokio::test]
async fn stats_resolve_latest_and_count_downloads() {
    let (registry, store, repo) = setup(RegistryConfig::default());
    repo.add_branch("master", "sha1");
    repo.add_tag("v1.0.0", "sha1");
    repo.add_tag("v1.1.0", "sha1");
    repo.put_file("sha1", "/quay.json", recipe("foo"));
    seed_package(&store, "foo").await;
    registry.check_for_new_versions("foo").await.unwrap();

    let archive = registry.download_package_zip("foo", "latest").await.unwrap();
    assert_eq!(archive, b"archive:v1.1.0");
    registry.download_package_zip("foo", "~master").await.unwrap();

    let latest = registry
        .get_package_stats("foo", Some("latest"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.downloads, 1);
    let total = registry.get_package_stats("foo", None).await.unwrap().unwrap();
    assert_eq!(total.downloads, 2);
}

#[tokio::test]
async fn stats_for_latest_are_none_without_releases() {
    let (registry, store, repo) = setup(RegistryConfig::default());
    repo.add_branch("master", "sha1");
    repo.put_file("sha1", "/quay.json", recipe("foo"));
    seed_package(&store, "foo").await;
    registry.check_for_new_versions("foo").await.unwrap();

    let stats = registry.get_package_stats("foo", Some("latest")).await.unwrap();
    assert!(stats.is_none());
}
