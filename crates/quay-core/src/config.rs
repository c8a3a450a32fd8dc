//! Registry engine configuration.
//!
//! The historical constants of the reference deployment (60-char name cap,
//! 10,000-entry update queue, two-hour worker watchdog) are defaults here,
//! not hard-coded values.

use std::time::Duration;

/// Recipe filenames probed by the version-info resolver, in order.
pub const DEFAULT_RECIPE_FILENAMES: &[&str] = &["/quay.json", "/package.json"];

/// Tunables for the registry engine.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum length of a package name.
    pub max_name_length: usize,
    /// Maximum number of packages waiting in the update queue.
    pub queue_capacity: usize,
    /// Age of the drain worker's liveness beacon after which an enqueue
    /// interrupts and restarts the worker.
    pub worker_stale_after: Duration,
    /// Recipe filename candidates, probed in order.
    pub recipe_filenames: Vec<String>,
    /// Skip the `gh-pages` branch entirely instead of adding it with
    /// suppressed errors.
    pub skip_gh_pages: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            max_name_length: 60,
            queue_capacity: 10_000,
            worker_stale_after: Duration::from_secs(2 * 60 * 60),
            recipe_filenames: DEFAULT_RECIPE_FILENAMES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            skip_gh_pages: false,
        }
    }
}

impl RegistryConfig {
    /// Build a config from `QUAY_*` environment variables, falling back to
    /// the defaults for anything unset or unparseable.
    ///
    /// Reads:
    /// - `QUAY_MAX_NAME_LENGTH`
    /// - `QUAY_QUEUE_CAPACITY`
    /// - `QUAY_WORKER_STALE_SECS`
    /// - `QUAY_SKIP_GH_PAGES` ("1" or "true")
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = env_parse("QUAY_MAX_NAME_LENGTH") {
            config.max_name_length = n;
        }
        if let Some(n) = env_parse("QUAY_QUEUE_CAPACITY") {
            config.queue_capacity = n;
        }
        if let Some(secs) = env_parse("QUAY_WORKER_STALE_SECS") {
            config.worker_stale_after = Duration::from_secs(secs);
        }
        if let Ok(v) = std::env::var("QUAY_SKIP_GH_PAGES") {
            config.skip_gh_pages = v == "1" || v.eq_ignore_ascii_case("true");
        }
        config
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_worker_stale_after(mut self, age: Duration) -> Self {
        self.worker_stale_after = age;
        self
    }

    pub fn with_skip_gh_pages(mut self, skip: bool) -> Self {
        self.skip_gh_pages = skip;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
