//! Server lifecycle: health state plus admission and draining of batches.
//!
//! Health state lives in an `ArcSwap` so probes read it without locking.
//! Every admitted batch holds a [`BatchGuard`]; shutdown waits on a `Notify`
//! that the last guard to drop fires.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::{watch, Notify};

/// Server health state.
///
/// State machine: Starting -> Ready -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Listener not yet serving.
    Starting,
    /// Accepting batches.
    Ready,
    /// Refusing new batches, finishing the ones in flight.
    Draining,
    /// Every admitted batch has finished.
    Stopped,
}

impl HealthState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }

    /// Whether new batches may start in this state.
    #[must_use]
    pub fn admits_batches(self) -> bool {
        matches!(self, Self::Starting | Self::Ready)
    }
}

#[derive(Debug, Default)]
struct BatchCounters {
    in_flight: AtomicU64,
    completed: AtomicU64,
    idle: Notify,
}

/// Coordinates batch admission with graceful shutdown.
///
/// 1. The batch handler calls [`admit_batch`](Self::admit_batch) and holds
///    the guard for the lifetime of the batch
/// 2. [`trigger_shutdown`](Self::trigger_shutdown) flips to `Draining`, after
///    which admission fails
/// 3. [`wait_for_drain`](Self::wait_for_drain) resolves once the last guard
///    drops, or gives up at the deadline
#[derive(Debug)]
pub struct ShutdownController {
    shutdown_signal: watch::Sender<bool>,
    counters: Arc<BatchCounters>,
    health_state: Arc<ArcSwap<HealthState>>,
}

impl ShutdownController {
    /// Creates a controller in the `Starting` state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            shutdown_signal: tx,
            counters: Arc::new(BatchCounters::default()),
            health_state: Arc::new(ArcSwap::from_pointee(HealthState::Starting)),
        }
    }

    pub fn set_ready(&self) {
        self.health_state.store(Arc::new(HealthState::Ready));
    }

    /// Returns a receiver that flips to `true` when shutdown is triggered.
    #[must_use]
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_signal.subscribe()
    }

    /// Moves to `Draining` and notifies every shutdown receiver.
    pub fn trigger_shutdown(&self) {
        self.health_state.store(Arc::new(HealthState::Draining));
        // Receivers may already be gone.
        let _ = self.shutdown_signal.send(true);
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.health_state.load()
    }

    /// Admits a batch, or returns `None` once the server is draining.
    ///
    /// A batch admitted just before `trigger_shutdown` is still counted, so
    /// the drain waits for it.
    #[must_use]
    pub fn admit_batch(&self) -> Option<BatchGuard> {
        if !self.health_state().admits_batches() {
            return None;
        }
        self.counters.in_flight.fetch_add(1, Ordering::AcqRel);
        Some(BatchGuard {
            counters: Arc::clone(&self.counters),
        })
    }

    /// Number of batches currently executing.
    #[must_use]
    pub fn batches_in_flight(&self) -> u64 {
        self.counters.in_flight.load(Ordering::Acquire)
    }

    /// Number of batches that have finished since startup.
    #[must_use]
    pub fn batches_completed(&self) -> u64 {
        self.counters.completed.load(Ordering::Relaxed)
    }

    /// Waits for in-flight batches to finish, up to `timeout`.
    ///
    /// Returns `true` and moves to `Stopped` when everything drained.
    /// Returns `false` on timeout, leaving the state at `Draining`.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let drained = tokio::time::timeout(timeout, async {
            loop {
                let idle = self.counters.idle.notified();
                if self.batches_in_flight() == 0 {
                    return;
                }
                idle.await;
            }
        })
        .await
        .is_ok();

        if drained {
            self.health_state.store(Arc::new(HealthState::Stopped));
        }
        drained
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks one batch as in flight until dropped.
///
/// Drop runs during unwinding too, so a panicking handler still releases it.
#[derive(Debug)]
pub struct BatchGuard {
    counters: Arc<BatchCounters>,
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.counters.completed.fetch_add(1, Ordering::Relaxed);
        if self.counters.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.counters.idle.notify_waiters();
        }
    }
}
