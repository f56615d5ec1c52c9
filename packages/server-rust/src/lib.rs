//! Batchwire server: an axum batch endpoint that runs operations in-process
//! against an application router.

pub mod demo;
pub mod network;
pub mod service;

pub use network::{NetworkConfig, NetworkModule};
pub use service::BatchConfig;
