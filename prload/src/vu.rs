use crate::aggregator::MetricsAggregator;
use crate::scenario::{PullRequestKey, Scenario, StepSettings};
use crate::setup::{user_id, Context};
use crate::transaction::TransactionData;
use crate::transport::Transport;
use prload_core::{
    ScenarioResult, FAILURE_COUNT, ITERATIONS, ITERATION_DURATION, SUCCESS_COUNT, SUCCESS_RATE,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 9;

#[derive(Clone, Copy, Debug)]
pub(crate) struct DriverSettings {
    pub step: StepSettings,
    pub pacing_min: Duration,
    pub pacing_max: Duration,
    pub seed: Option<u64>,
}

/// State shared by every virtual user of a run.
pub(crate) struct DriverShared<T> {
    pub transport: Arc<T>,
    pub hook: TransactionData,
    pub context: Arc<Context>,
    pub settings: DriverSettings,
    /// Slots at or above this index retire after their current iteration.
    pub target: AtomicUsize,
    pub deadline: Instant,
}

pub(crate) struct VirtualUser<T> {
    vu_id: u32,
    shared: Arc<DriverShared<T>>,
    iterations: Arc<AtomicU64>,
    rng: SmallRng,
}

impl<T> VirtualUser<T>
where
    T: Transport + Send + Sync + 'static,
{
    /// `iterations` belongs to the slot, so a refilled slot keeps counting where it left off.
    pub fn new(vu_id: u32, shared: Arc<DriverShared<T>>, iterations: Arc<AtomicU64>) -> Self {
        let rng = match shared.settings.seed {
            Some(seed) => {
                let restart = iterations.load(Ordering::Relaxed);
                SmallRng::seed_from_u64(mix(seed, vu_id, restart))
            }
            None => SmallRng::from_entropy(),
        };

        Self {
            vu_id,
            shared,
            iterations,
            rng,
        }
    }

    pub async fn run(mut self) {
        trace!("VU {} started", self.vu_id);

        while self.is_active() {
            let iteration = self.iterations.fetch_add(1, Ordering::Relaxed);
            self.iterate(iteration).await;
            self.pace().await;
        }

        trace!("VU {} stopped", self.vu_id);
    }

    fn is_active(&self) -> bool {
        let slot = self.vu_id as usize - 1;
        slot < self.shared.target.load(Ordering::Acquire) && Instant::now() < self.shared.deadline
    }

    async fn iterate(&mut self, iteration: u64) {
        let context = &self.shared.context;
        let team = &context.teams[team_index(self.vu_id, context.teams.len())];
        let user = self.rng.gen_range(1..=context.users_per_team);
        let author = user_id(team, user);
        let id = iteration_id(&mut self.rng, self.vu_id, iteration);

        let key = PullRequestKey::new(&id);
        let scenario = Scenario::create_then_merge(&key, &author, &self.shared.settings.step);

        let start = Instant::now();
        let result = scenario
            .run(&self.shared.hook, self.shared.transport.as_ref())
            .await;
        record_result(&self.shared.hook.metrics, result, start.elapsed());
    }

    async fn pace(&mut self) {
        let DriverSettings {
            pacing_min,
            pacing_max,
            ..
        } = self.shared.settings;
        let pacing = self.rng.gen_range(pacing_min..=pacing_max);
        let remaining = self
            .shared
            .deadline
            .saturating_duration_since(Instant::now());
        tokio::time::sleep(pacing.min(remaining)).await;
    }
}

fn mix(seed: u64, vu_id: u32, restart: u64) -> u64 {
    seed ^ (u64::from(vu_id) << 32) ^ restart.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Teams are assigned round-robin by VU id, so every team is covered once there are at least
/// as many VUs as teams.
pub(crate) fn team_index(vu_id: u32, team_count: usize) -> usize {
    (vu_id as usize - 1) % team_count
}

/// `{unix_millis}-{9 base36 chars}-{vu_id}-{iteration}`
pub(crate) fn iteration_id<R: Rng>(rng: &mut R, vu_id: u32, iteration: u64) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| char::from(BASE36[rng.gen_range(0..BASE36.len())]))
        .collect();

    format!("{millis}-{suffix}-{vu_id}-{iteration}")
}

/// Fold one iteration into the run's series: exactly one of success/failure, exactly one
/// `success_rate` sample.
pub(crate) fn record_result(metrics: &MetricsAggregator, result: ScenarioResult, elapsed: Duration) {
    if result.succeeded {
        metrics.increment(SUCCESS_COUNT);
    } else {
        metrics.increment(FAILURE_COUNT);
    }
    metrics.observe(SUCCESS_RATE, result.succeeded);
    metrics.increment(ITERATIONS);
    metrics.record(ITERATION_DURATION, elapsed);
}
