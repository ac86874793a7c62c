use clap::Parser;
use mock_service::MockConfig;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// In-memory pull request service for load testing.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "0.0.0.0:8080")]
    addr: SocketAddr,

    /// Mean added latency, e.g. `20ms`.
    #[arg(long, default_value = "5ms", value_parser = humantime_duration)]
    latency: Duration,

    /// Standard deviation of the added latency.
    #[arg(long, default_value = "0ms", value_parser = humantime_duration)]
    jitter: Duration,

    /// Fraction of create/merge requests that fail with a 500.
    #[arg(long, default_value_t = 0.)]
    failure_ratio: f64,
}

fn humantime_duration(s: &str) -> Result<Duration, String> {
    s.parse::<humantime::Duration>()
        .map(Into::into)
        .map_err(|err| err.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mock_service=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();
    let config = MockConfig {
        latency: args.latency,
        jitter: args.jitter,
        failure_ratio: args.failure_ratio,
    };

    mock_service::run(args.addr, config).await
}
