//! Batch execution services.
//!
//! This module connects the core processor to an axum application:
//!
//! 1. **Configuration** (`config`): endpoint path, batch size and dispatch limits
//! 2. **Dispatch** (`dispatch`): `ResolvedOperation` -> in-process HTTP request
//! 3. **Middleware** (`middleware`): Tower layers (metrics, timeout, load-shedding)
//! 4. **Errors** (`error`): batch-level rejections and their HTTP responses

pub mod config;
pub mod dispatch;
pub mod error;
pub mod middleware;

pub use config::BatchConfig;
pub use dispatch::{build_request, RequestBuildError, RouterDispatcher};
pub use error::BatchApiError;
pub use middleware::{build_dispatch_pipeline, DispatchPipeline, LoadShedLayer, MetricsLayer};
