use std::net::IpAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mock_satellite::{DEFAULT_QUEUE_CAPACITY, MockSatellite};
use tracing_subscriber::{EnvFilter, fmt};

/// Mock trace satellite for exercising tracer clients.
#[derive(Parser)]
#[command(name = "mock-satellite", about)]
struct Cli {
    /// Port to listen on.
    port: u16,

    /// Address to bind to.
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Reports that may queue before request handlers block.
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Delay before each streamed span while throttling is enabled.
    #[arg(long, default_value_t = 100)]
    throttle_delay_ms: u64,

    /// Logging verbosity level (trace, debug, info, warn, error). RUST_LOG wins if set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cli.log_level)
            .with_context(|| format!("invalid log level: {}", cli.log_level))?,
    };
    fmt().with_env_filter(filter).with_target(true).init();

    abort_on_panic();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let server = MockSatellite::builder()
        .host(cli.host)
        .port(cli.port)
        .queue_capacity(cli.queue_capacity)
        .throttle_delay(Duration::from_millis(cli.throttle_delay_ms))
        .start()
        .await
        .context("starting mock satellite")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("listening for SIGINT")?;
            tracing::info!("received SIGINT, shutting down");
        }
        _ = server.stopped() => {
            tracing::warn!("listener closed, shutting down");
        }
    }

    let stored = server.shutdown().await.context("shutting down")?;
    tracing::info!(stored, "mock satellite exited");
    Ok(())
}

/// A protocol violation in any request takes the whole process down.
///
/// Connections dropped by fault injection unwind without invoking the hook.
fn abort_on_panic() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_hook(info);
        std::process::abort();
    }));
}
