//! The package update queue and its single drain worker.
//!
//! A bounded FIFO of package names with set-like membership: a name waits in
//! the queue at most once, though a name currently being processed may be
//! re-enqueued. One long-lived Tokio task drains the queue, one package at a
//! time. A liveness beacon stamped before each dequeue lets `trigger` detect
//! a stuck worker and restart it.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{RegistryError, Result};

/// Consumer of drained package names.
///
/// `process` must be total: reconciliation failures are recorded on the
/// package, not surfaced here. If an implementation panics, the worker task
/// dies and is respawned on the next trigger.
#[async_trait]
pub trait UpdateHandler: Send + Sync + 'static {
    async fn process(&self, name: &str);
}

#[derive(Debug)]
struct QueueState {
    queue: VecDeque<String>,
    /// Name the worker is processing right now.
    current: Option<String>,
    /// Stamped by the worker before each dequeue.
    beacon: Instant,
    worker: Option<JoinHandle<()>>,
}

/// Bounded FIFO of package names with a single drain worker.
pub struct UpdateQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
    stale_after: Duration,
}

impl UpdateQueue {
    pub fn new(capacity: usize, stale_after: Duration) -> Arc<Self> {
        Arc::new(UpdateQueue {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                current: None,
                beacon: Instant::now(),
                worker: None,
            }),
            notify: Notify::new(),
            capacity,
            stale_after,
        })
    }

    /// Enqueue a package for reconciliation.
    ///
    /// Suppresses duplicates already waiting in the queue, restarts the
    /// worker if its beacon is older than the configured staleness window,
    /// spawns the worker if none is running, and signals it.
    pub async fn trigger(
        self: &Arc<Self>,
        name: &str,
        handler: Arc<dyn UpdateHandler>,
    ) -> Result<()> {
        {
            let mut state = self.state.lock().await;

            if !state.queue.iter().any(|n| n == name) {
                if state.queue.len() >= self.capacity {
                    return Err(RegistryError::QueueFull {
                        capacity: self.capacity,
                    });
                }
                state.queue.push_back(name.to_string());
                debug!(package = name, "queued for update");
            }

            let stuck = state
                .worker
                .as_ref()
                .is_some_and(|h| !h.is_finished() && state.beacon.elapsed() > self.stale_after);
            if stuck {
                warn!(
                    stale_for_secs = state.beacon.elapsed().as_secs(),
                    "update worker unresponsive, interrupting"
                );
                if let Some(handle) = state.worker.take() {
                    handle.abort();
                }
                // The in-flight package is lost; it will be picked up by
                // the next full rescan or an explicit re-trigger.
                state.current = None;
            }

            let need_spawn = state.worker.as_ref().map_or(true, |h| h.is_finished());
            if need_spawn {
                state.beacon = Instant::now();
                state.current = None;
                let queue = Arc::clone(self);
                state.worker = Some(tokio::spawn(queue.drain(handler)));
            }
        }
        self.notify.notify_one();
        Ok(())
    }

    /// 0 if `name` is being processed, its 1-based queue index if waiting,
    /// −1 otherwise.
    pub async fn position(&self, name: &str) -> isize {
        let state = self.state.lock().await;
        if state.current.as_deref() == Some(name) {
            return 0;
        }
        match state.queue.iter().position(|n| n == name) {
            Some(idx) => (idx + 1) as isize,
            None => -1,
        }
    }

    /// Whether `name` is waiting in the queue (not counting the one
    /// currently being processed).
    pub async fn is_queued(&self, name: &str) -> bool {
        let state = self.state.lock().await;
        state.queue.iter().any(|n| n == name)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.queue.is_empty()
    }

    async fn drain(self: Arc<Self>, handler: Arc<dyn UpdateHandler>) {
        loop {
            let name = loop {
                // Arm the wakeup before checking the queue so a concurrent
                // trigger between unlock and await is not lost.
                let notified = self.notify.notified();
                {
                    let mut state = self.state.lock().await;
                    state.beacon = Instant::now();
                    if let Some(name) = state.queue.pop_front() {
                        state.current = Some(name.clone());
                        break name;
                    }
                }
                notified.await;
            };

            debug!(package = %name, "processing update");
            handler.process(&name).await;

            let mut state = self.state.lock().await;
            state.current = None;
        }
    }
}
