//! HTTP handler definitions for the batch server.
//!
//! Defines `AppState` (the shared state carried through axum extractors) and
//! re-exports the handlers used when building the router.

pub mod batch;
pub mod health;

pub use batch::batch_handler;
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use axum::Router;

use super::{NetworkConfig, ShutdownController};
use crate::service::BatchConfig;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references and a `Router` (itself reference-counted), so
/// cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Graceful shutdown controller with health state and batch tracking.
    pub shutdown: Arc<ShutdownController>,
    /// The application that batch operations are dispatched into.
    pub app: Router,
    /// Batch endpoint limits.
    pub batch: Arc<BatchConfig>,
    /// Network configuration (bind address, body limits, timeouts).
    pub config: Arc<NetworkConfig>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(app: Router, batch: BatchConfig, config: NetworkConfig) -> Self {
        Self {
            shutdown: Arc::new(ShutdownController::new()),
            app,
            batch: Arc::new(batch),
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }
}
