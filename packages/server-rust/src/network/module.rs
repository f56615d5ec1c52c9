//! Network module with deferred startup lifecycle.
//!
//! `new()` assembles shared state, `start()` binds the TCP listener, and
//! `serve()` accepts connections. The bound port is known between `start()`
//! and `serve()`, which lets callers log or publish it first.

use std::future::Future;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{batch_handler, health_handler, liveness_handler, readiness_handler, AppState};
use super::middleware::with_http_layers;
use super::shutdown::ShutdownController;
use crate::service::{BatchConfig, LoadShedLayer};

/// Serves an application together with its batch endpoint.
///
/// 1. `new()` -- allocates shared state (shutdown controller, configs)
/// 2. `start()` -- binds TCP listener to the configured address
/// 3. `serve()` -- accepts connections until shutdown is signalled, then
///    drains in-flight batches
pub struct NetworkModule {
    state: AppState,
    listener: Option<TcpListener>,
}

impl NetworkModule {
    /// Creates a module serving `app`, without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, batch: BatchConfig, app: Router) -> Self {
        Self {
            state: AppState::new(app, batch, config),
            listener: None,
        }
    }

    /// Returns a shared reference to the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.state.shutdown)
    }

    /// Assembles the public router.
    ///
    /// Routes:
    /// - `GET /health` -- detailed health JSON
    /// - `GET /health/live` -- liveness probe
    /// - `GET /health/ready` -- readiness probe
    /// - `POST {batch.endpoint}` -- batch endpoint, load-shed
    /// - everything else -- the application itself
    ///
    /// Sub-requests only reach the application, never the batch endpoint, so
    /// batches cannot nest.
    pub fn build_router(&self) -> Router {
        let state = self.state.clone();

        let batch_routes = Router::new()
            .route(&state.batch.endpoint, post(batch_handler))
            .route_layer(LoadShedLayer::new(state.batch.max_concurrent_batches));

        let router = Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .merge(batch_routes)
            .with_state(state.clone())
            .merge(state.app.clone())
            .layer(DefaultBodyLimit::max(state.config.max_body_bytes));

        with_http_layers(router, &state.config)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the bound port, which differs from the configured one when
    /// port 0 asks for an OS-assigned port.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.state.config.host, self.state.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.state.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves connections until `shutdown` resolves.
    ///
    /// After the shutdown signal the health state moves to `Draining`, new
    /// batches are refused, and in-flight batches get `drain_timeout` to
    /// finish.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called, or if the server hits a
    /// fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let router = self.build_router();
        let controller = self.shutdown_controller();
        let drain_timeout = self.state.config.drain_timeout;

        controller.set_ready();
        info!(endpoint = %self.state.batch.endpoint, "serving batch endpoint");

        let signal_controller = Arc::clone(&controller);
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                signal_controller.trigger_shutdown();
            })
            .await?;

        drain_batches(&controller, drain_timeout).await;
        Ok(())
    }
}

async fn drain_batches(controller: &ShutdownController, timeout: std::time::Duration) {
    controller.trigger_shutdown();

    let pending = controller.batches_in_flight();
    if pending > 0 {
        info!("Draining {} in-flight batches", pending);
    }

    if controller.wait_for_drain(timeout).await {
        info!("All batches drained");
    } else {
        warn!(
            remaining = controller.batches_in_flight(),
            "Drain timeout expired with batches still running"
        );
    }
}
