//! Runs the batch server in front of the in-memory demo application.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use batchwire_server::demo::demo_app;
use batchwire_server::network::{NetworkConfig, NetworkModule};
use batchwire_server::service::BatchConfig;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "batchwire-test-server")]
#[command(about = "Batch endpoint over an in-memory demo app", long_about = None)]
struct Cli {
    #[arg(long, env = "BATCHWIRE_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(long, env = "BATCHWIRE_PORT", default_value_t = 8080)]
    port: u16,

    /// Path the batch endpoint is mounted at.
    #[arg(long, env = "BATCHWIRE_ENDPOINT", default_value = "/batch")]
    endpoint: String,

    #[arg(long, env = "BATCHWIRE_MAX_OPERATIONS", default_value_t = batchwire_core::DEFAULT_MAX_OPERATIONS)]
    max_operations: usize,

    /// Per-operation timeout in milliseconds.
    #[arg(long, env = "BATCHWIRE_OPERATION_TIMEOUT_MS", default_value_t = 30_000)]
    operation_timeout_ms: u64,

    #[arg(long, env = "BATCHWIRE_MAX_CONCURRENT_BATCHES", default_value_t = 1000)]
    max_concurrent_batches: u32,

    /// Expose Prometheus metrics on this port.
    #[arg(long, env = "BATCHWIRE_METRICS_PORT")]
    metrics_port: Option<u16>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    if let Some(port) = cli.metrics_port {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!(%addr, "metrics exporter listening");
    }

    let network = NetworkConfig {
        host: cli.host,
        port: cli.port,
        drain_timeout: Duration::from_secs(30),
        ..NetworkConfig::default()
    };
    let batch = BatchConfig {
        endpoint: cli.endpoint,
        max_operations: cli.max_operations,
        operation_timeout_ms: cli.operation_timeout_ms,
        max_concurrent_batches: cli.max_concurrent_batches,
        ..BatchConfig::default()
    };

    let mut module = NetworkModule::new(network, batch, demo_app());
    let port = module.start().await?;
    info!(port, "batch server started");

    module
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
}
