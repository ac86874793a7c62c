use pdatastructs::tdigest::{TDigest, K1};
use std::fmt;
use std::time::Duration;
use tracing::error;

const TDIGEST_BACKLOG_SIZE: usize = 100;
const TDIGEST_COMPRESSION: f64 = 100.;

/// Final shape of a trend series: exact count/avg/min/max plus a t-digest for percentiles.
#[derive(Debug, Clone)]
pub struct TrendSummary {
    count: u64,
    total: Duration,
    min: Duration,
    max: Duration,
    latency: TDigest<K1>,
}

impl TrendSummary {
    pub(crate) fn new() -> Self {
        Self {
            count: 0,
            total: Duration::ZERO,
            min: Duration::MAX,
            max: Duration::ZERO,
            latency: default_tdigest(),
        }
    }

    pub(crate) fn populate(&mut self, samples: &[Duration]) {
        for sample in samples {
            self.count += 1;
            self.total += *sample;
            self.min = self.min.min(*sample);
            self.max = self.max.max(*sample);
            self.latency.insert(sample.as_secs_f64());
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn avg(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos((self.total.as_nanos() / u128::from(self.count)) as u64)
        }
    }

    pub fn min(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.min
        }
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn median(&self) -> Duration {
        self.quantile(0.5)
    }

    /// `quantile` in `0.0..=1.0`; zero for an empty series.
    pub fn quantile(&self, quantile: f64) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }

        let secs = self.latency.quantile(quantile);

        // NOTE: TDigest occasionally yields NaN for sparse digests.
        let secs = if secs.is_finite() {
            secs.clamp(self.min.as_secs_f64(), self.max.as_secs_f64())
        } else {
            error!("NaN quantile calculation; reporting zero.");
            0.
        };

        Duration::from_secs_f64(secs)
    }
}

impl fmt::Display for TrendSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "avg={:?} min={:?} med={:?} max={:?} p(90)={:?} p(95)={:?}",
            self.avg(),
            self.min(),
            self.median(),
            self.max(),
            self.quantile(0.90),
            self.quantile(0.95),
        )
    }
}

fn default_tdigest() -> TDigest<K1> {
    TDigest::new(K1::new(TDIGEST_COMPRESSION), TDIGEST_BACKLOG_SIZE)
}
