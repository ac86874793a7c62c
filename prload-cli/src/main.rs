use anyhow::Context;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use prload::{ConfigError, RunConfig};
use prload::{HttpTransport, LoadTest, RunReport};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::process::ExitCode;
#[allow(unused)]
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Ramp virtual users through a create-then-merge pull request workflow and check the
/// results against thresholds.
#[derive(Parser, Debug)]
#[command(name = "prload", version)]
struct Args {
    /// Service under test.
    #[arg(long, default_value = "http://localhost:8080")]
    base_url: String,

    /// JSON run configuration; omitted fields keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed for pacing, user selection and identifiers.
    #[arg(long)]
    seed: Option<u64>,

    /// Cap on load-phase requests per second across all virtual users.
    #[arg(long)]
    max_rps: Option<NonZeroU32>,

    /// Expose metrics for Prometheus scraping on this address.
    #[arg(long)]
    prometheus: Option<SocketAddr>,

    /// Log filter directives.
    #[arg(long, default_value = "prload=info")]
    log: String,
}

const EXIT_THRESHOLDS_FAILED: u8 = 1;
const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(&args.log))
        .init();

    match run(args).await {
        Ok(report) => {
            println!("{report}");
            if report.passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_THRESHOLDS_FAILED)
            }
        }
        Err(err) => {
            match err.downcast_ref::<ConfigError>() {
                Some(config) => error!("Invalid configuration: {config}"),
                None => error!("{err:#}"),
            }
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<RunReport> {
    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            RunConfig::from_json(&json)?
        }
        None => RunConfig::default(),
    };

    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if args.max_rps.is_some() {
        config.max_rps = args.max_rps;
    }
    config.validate()?;

    if let Some(addr) = args.prometheus {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("installing Prometheus exporter")?;
        info!("Serving metrics on http://{addr}/metrics");
    }

    let transport = HttpTransport::new(&args.base_url)?;
    info!("Target {}", transport.base_url());

    let report = LoadTest::with_config(transport, config).await?;
    Ok(report)
}
