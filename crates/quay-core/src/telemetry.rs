//! Tracing initialisation for registry binaries.
//!
//! Call [`init_tracing`] once at startup. Honors `RUST_LOG` for filtering;
//! the supplied level is the fallback when it is unset. Repeated calls are
//! no-ops (the global subscriber can only be installed once per process).

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber.
///
/// With `json` set, log lines are emitted as newline-delimited JSON for
/// aggregation pipelines; otherwise the human-readable format is used.
pub fn init_tracing(json: bool, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let base = tracing_subscriber::registry().with(filter);
    if json {
        base.with(fmt::layer().with_target(false).json()).try_init().ok();
    } else {
        base.with(fmt::layer().with_target(false)).try_init().ok();
    }
}
