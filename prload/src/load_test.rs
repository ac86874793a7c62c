//! The top-level run: validate, seed, ramp, drain, judge.
use crate::aggregator::{MetricsAggregator, Summary};
use crate::scenario::StepSettings;
use crate::scheduler::{run_ramp, VirtualUserPool};
use crate::setup::run_setup;
use crate::thresholds::{evaluate, ThresholdOutcome};
use crate::transaction::TransactionData;
use crate::transport::Transport;
use crate::vu::{DriverSettings, DriverShared};
use prload_core::{ConfigError, RunConfig, SetupSummary, Stage};
use std::{
    fmt,
    future::Future,
    num::NonZeroU32,
    pin::Pin,
    sync::{atomic::AtomicUsize, Arc},
    task::{Context, Poll},
    time::Duration,
};
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

/// A configured load test. Awaiting it runs the whole thing and resolves to a [`RunReport`],
/// or to a [`ConfigError`] before any request is sent if the configuration is invalid.
///
/// # Example
/// ```no_run
/// use prload::prelude::*;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let transport = HttpTransport::new("http://localhost:8080").unwrap();
///     let report = LoadTest::new(transport)
///         .stages(vec![Stage::new(Duration::from_secs(30), 50)])
///         .seed(42)
///         .await
///         .unwrap();
///     println!("{report}");
/// }
/// ```
#[pin_project::pin_project]
pub struct LoadTest<T> {
    transport: Arc<T>,
    config: RunConfig,
    runner_fut: Option<Pin<Box<dyn Future<Output = Result<RunReport, ConfigError>> + Send>>>,
}

impl<T> LoadTest<T> {
    /// A load test with the default profile: 5s ramp to 10 VUs, then a one minute hold.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, RunConfig::default())
    }

    pub fn with_config(transport: T, config: RunConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            config,
            runner_fut: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn stages(mut self, stages: Vec<Stage>) -> Self {
        self.config.stages = stages;
        self
    }

    /// Add a threshold on top of those already configured.
    pub fn threshold(mut self, metric: &str, expression: &str) -> Self {
        self.config
            .thresholds
            .entry(metric.to_string())
            .or_default()
            .push(expression.to_string());
        self
    }

    /// Drop every configured threshold, including the defaults.
    pub fn clear_thresholds(mut self) -> Self {
        self.config.thresholds.clear();
        self
    }

    pub fn teams<I, S>(mut self, teams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.teams = teams.into_iter().map(Into::into).collect();
        self
    }

    pub fn users_per_team(mut self, users: u32) -> Self {
        self.config.users_per_team = users;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Cap load-phase requests across all virtual users.
    pub fn max_rps(mut self, max_rps: NonZeroU32) -> Self {
        self.config.max_rps = Some(max_rps);
        self
    }

    pub fn pacing(mut self, min: Duration, max: Duration) -> Self {
        self.config.pacing_min = min;
        self.config.pacing_max = max;
        self
    }

    pub fn latency_sli(mut self, sli: Duration) -> Self {
        self.config.latency_sli = sli;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn setup_timeout(mut self, timeout: Duration) -> Self {
        self.config.setup_timeout = timeout;
        self
    }

    /// Check the configuration without running anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.config.validate()
    }
}

impl<T> Future for LoadTest<T>
where
    T: Transport + Send + Sync + 'static,
{
    type Output = Result<RunReport, ConfigError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        if this.runner_fut.is_none() {
            let transport = this.transport.clone();
            let config = this.config.clone();
            *this.runner_fut = Some(Box::pin(async move {
                run_load_test(transport, config).await
            }));
        }

        if let Some(runner) = this.runner_fut {
            runner.as_mut().poll(cx)
        } else {
            unreachable!()
        }
    }
}

#[instrument(name = "load_test", skip_all)]
async fn run_load_test<T>(transport: Arc<T>, config: RunConfig) -> Result<RunReport, ConfigError>
where
    T: Transport + Send + Sync + 'static,
{
    config.validate()?;
    let profile = config.profile()?;
    let thresholds = config.parsed_thresholds()?;

    info!(
        "Running {profile} over {}",
        humantime::format_duration(profile.total_duration())
    );

    let (context, setup) = run_setup(
        transport.as_ref(),
        &config.teams,
        config.users_per_team,
        config.setup_timeout,
    )
    .await;

    let metrics = Arc::new(MetricsAggregator::with_builtin());
    let start = Instant::now();
    let shared = Arc::new(DriverShared {
        transport,
        hook: TransactionData::new(metrics.clone(), config.max_rps),
        context: Arc::new(context),
        settings: DriverSettings {
            step: StepSettings {
                timeout: config.request_timeout,
                latency_sli: config.latency_sli,
            },
            pacing_min: config.pacing_min,
            pacing_max: config.pacing_max,
            seed: config.seed,
        },
        target: AtomicUsize::new(0),
        deadline: start + profile.total_duration(),
    });

    let vus_max = run_ramp(&profile, start, VirtualUserPool::new(shared)).await;

    let summary = metrics.snapshot(start.elapsed());
    let outcomes = evaluate(&thresholds, &summary);
    let report = RunReport {
        summary,
        thresholds: outcomes,
        setup,
        vus_max,
    };

    if report.passed() {
        info!("Load test finished; all thresholds passed");
    } else {
        for failed in report.thresholds.iter().filter(|o| !o.passed) {
            warn!("Threshold failed: {failed}");
        }
    }

    Ok(report)
}

/// Everything a finished run produced.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub summary: Summary,
    pub thresholds: Vec<ThresholdOutcome>,
    pub setup: SetupSummary,
    /// Peak number of concurrently active virtual users.
    pub vus_max: usize,
}

impl RunReport {
    /// True when every threshold held.
    pub fn passed(&self) -> bool {
        self.thresholds.iter().all(|o| o.passed)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "setup: {}", self.setup)?;
        writeln!(
            f,
            "duration: {}, vus_max: {}",
            humantime::format_duration(self.summary.elapsed),
            self.vus_max
        )?;
        writeln!(f, "metrics:")?;
        write!(f, "{}", self.summary)?;
        writeln!(f, "thresholds:")?;
        for outcome in &self.thresholds {
            writeln!(f, "  {outcome}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{CREATE_PATH, MERGE_PATH};
    use crate::setup::TEAM_ADD_PATH;
    use crate::transport::testing::{healthy, MockTransport};
    use crate::transport::{Request, Response};
    use prload_core::{CHECKS, FAILURE_COUNT, ITERATIONS, SUCCESS_COUNT, SUCCESS_RATE};
    use tracing_test::traced_test;

    #[traced_test]
    #[tokio::test(start_paused = true)]
    async fn healthy_service_passes_default_thresholds() {
        let transport = MockTransport::new(healthy(
            Duration::from_millis(120),
            Duration::from_millis(150),
        ));

        let report = LoadTest::new(transport).seed(3).await.unwrap();

        assert!(report.passed(), "{report}");
        assert_eq!(report.thresholds.len(), 3);
        assert_eq!(report.vus_max, 10);
        assert!(report.to_string().contains("vus_max: 10"));
        assert_eq!(
            report.setup,
            SetupSummary {
                registered: 10,
                failed: 0
            }
        );

        let summary = &report.summary;
        let iterations = summary.counter(ITERATIONS);
        assert!(iterations > 0);
        assert_eq!(
            summary.counter(SUCCESS_COUNT) + summary.counter(FAILURE_COUNT),
            iterations
        );
        assert_eq!(summary.rate(SUCCESS_RATE), Some(1.));
        assert_eq!(summary.rate(CHECKS), Some(1.));
        assert!(logs_contain("Team backend: 201"));
    }

    #[tokio::test(start_paused = true)]
    async fn failing_creates_fail_the_run() {
        let transport = Arc::new(MockTransport::new(|req: &Request| match req.path {
            TEAM_ADD_PATH => (Ok(Response::new(201)), Duration::from_millis(5)),
            _ => (Ok(Response::new(500)), Duration::from_millis(20)),
        }));

        let report = LoadTest::with_config(transport.clone(), RunConfig::default())
            .stages(vec![Stage::new(Duration::from_secs(5), 3)])
            .await
            .unwrap();

        assert!(!report.passed());
        let summary = &report.summary;
        assert_eq!(summary.counter(SUCCESS_COUNT), 0);
        assert_eq!(summary.counter(FAILURE_COUNT), summary.counter(ITERATIONS));
        assert_eq!(summary.rate(SUCCESS_RATE), Some(0.));
        assert_eq!(transport.calls_to(MERGE_PATH), 0);
        assert!(transport.calls_to(CREATE_PATH) > 0);

        let failed: Vec<_> = report
            .thresholds
            .iter()
            .filter(|o| !o.passed)
            .map(|o| o.threshold.metric.as_str())
            .collect();
        assert_eq!(failed, vec!["http_req_failed", "success_rate"]);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_config_sends_nothing() {
        let transport = Arc::new(MockTransport::new(healthy(
            Duration::from_millis(1),
            Duration::from_millis(1),
        )));

        let res = LoadTest::with_config(transport.clone(), RunConfig::default())
            .threshold("not_a_metric", "rate<1")
            .await;

        assert_eq!(
            res.unwrap_err(),
            ConfigError::UnknownMetric("not_a_metric".to_string())
        );
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn builder_accumulates_thresholds() {
        let test = LoadTest::new(())
            .clear_thresholds()
            .threshold("checks", "rate>0.99")
            .threshold("checks", "rate<=1");
        assert_eq!(test.config.thresholds["checks"].len(), 2);
        assert!(test.validate().is_ok());
    }

    #[test]
    fn cleared_defaults_are_not_repeated() {
        let test = LoadTest::new(())
            .clear_thresholds()
            .threshold("http_req_duration", "p(99)<500")
            .threshold("success_rate", "rate>0.99");
        let parsed = test.config.parsed_thresholds().unwrap();
        let sources: Vec<_> = parsed.iter().map(ToString::to_string).collect();
        assert_eq!(
            sources,
            vec!["http_req_duration: p(99)<500", "success_rate: rate>0.99"]
        );

        let stacked = LoadTest::new(()).threshold("success_rate", "rate>0.99");
        assert_eq!(stacked.config.thresholds["success_rate"].len(), 2);
    }
}
