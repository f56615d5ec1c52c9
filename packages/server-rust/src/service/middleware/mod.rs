//! Tower middleware layers for batch processing.
//!
//! - [`metrics`]: Sub-request timing and counting via `tracing` spans and `metrics`
//! - [`load_shed`]: Semaphore-based limit on concurrent batches
//! - [`pipeline`]: Composes the per-operation layers around the application router

pub mod load_shed;
pub mod metrics;
pub mod pipeline;

pub use load_shed::LoadShedLayer;
pub use metrics::MetricsLayer;
pub use pipeline::{build_dispatch_pipeline, DispatchPipeline};
