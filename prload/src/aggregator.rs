//! Run-owned metric series.
use crate::measurement::TrendSummary;
use metrics_util::AtomicBucket;
use prload_core::{Aggregation, MetricKind, BUILTIN_METRICS};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
#[allow(unused_imports)]
use tracing::{debug, error, trace};

enum Series {
    Counter(AtomicU64),
    Rate { trues: AtomicU64, total: AtomicU64 },
    Trend(AtomicBucket<Duration>),
}

impl Series {
    fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Series::Counter(AtomicU64::new(0)),
            MetricKind::Rate => Series::Rate {
                trues: AtomicU64::new(0),
                total: AtomicU64::new(0),
            },
            MetricKind::Trend => Series::Trend(AtomicBucket::new()),
        }
    }

    fn kind(&self) -> MetricKind {
        match self {
            Series::Counter(_) => MetricKind::Counter,
            Series::Rate { .. } => MetricKind::Rate,
            Series::Trend(_) => MetricKind::Trend,
        }
    }
}

/// Collector of named counters, rates and trends shared by every virtual user of a run.
///
/// Writes are lock-free atomics once a series exists; the name registry is only write-locked
/// the first time a name is seen.
pub struct MetricsAggregator {
    series: RwLock<HashMap<String, Series>>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
        }
    }

    /// Aggregator with every series the engine records already registered.
    pub fn with_builtin() -> Self {
        let aggregator = Self::new();
        for (name, kind) in BUILTIN_METRICS {
            aggregator.register(name, kind);
        }
        aggregator
    }

    pub fn register(&self, name: &str, kind: MetricKind) {
        let mut series = self.series.write().unwrap_or_else(PoisonError::into_inner);
        series
            .entry(name.to_string())
            .or_insert_with(|| Series::new(kind));
    }

    pub fn increment(&self, counter: &str) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: &str, n: u64) {
        self.with_series(counter, MetricKind::Counter, |series| {
            if let Series::Counter(count) = series {
                count.fetch_add(n, Ordering::Relaxed);
            }
        });

        #[cfg(feature = "metrics")]
        metrics::counter!(counter.to_string()).increment(n);
    }

    pub fn observe(&self, rate: &str, value: bool) {
        self.with_series(rate, MetricKind::Rate, |series| {
            if let Series::Rate { trues, total } = series {
                if value {
                    trues.fetch_add(1, Ordering::Relaxed);
                }
                total.fetch_add(1, Ordering::Relaxed);
            }
        });

        #[cfg(feature = "metrics")]
        {
            metrics::counter!(format!("{rate}_total")).increment(1);
            if value {
                metrics::counter!(format!("{rate}_passes")).increment(1);
            }
        }
    }

    pub fn record(&self, trend: &str, sample: Duration) {
        self.with_series(trend, MetricKind::Trend, |series| {
            if let Series::Trend(bucket) = series {
                bucket.push(sample);
            }
        });

        #[cfg(feature = "metrics")]
        metrics::histogram!(trend.to_string()).record(sample.as_secs_f64());
    }

    /// Point-in-time copy of every series. `elapsed` is the run time used for per-second rates.
    ///
    /// NOTE: Taken while writers are active a rate may be one sample behind its total; once all
    /// virtual users have stopped the snapshot is exact.
    pub fn snapshot(&self, elapsed: Duration) -> Summary {
        let series = self.series.read().unwrap_or_else(PoisonError::into_inner);

        let metrics = series
            .iter()
            .map(|(name, series)| {
                let summary = match series {
                    Series::Counter(count) => MetricSummary::Counter {
                        count: count.load(Ordering::Relaxed),
                        elapsed,
                    },
                    Series::Rate { trues, total } => MetricSummary::Rate {
                        passes: trues.load(Ordering::Relaxed),
                        total: total.load(Ordering::Relaxed),
                    },
                    Series::Trend(bucket) => {
                        let mut trend = TrendSummary::new();
                        bucket.data_with(|samples| trend.populate(samples));
                        MetricSummary::Trend(trend)
                    }
                };
                (name.clone(), summary)
            })
            .collect();

        Summary { elapsed, metrics }
    }

    fn with_series(&self, name: &str, kind: MetricKind, f: impl FnOnce(&Series)) {
        {
            let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = series.get(name) {
                if existing.kind() == kind {
                    f(existing);
                } else {
                    error!(
                        "Dropping {kind} sample for `{name}`, which is a {} series.",
                        existing.kind()
                    );
                }
                return;
            }
        }

        trace!("Registering {kind} series `{name}`");
        let mut series = self.series.write().unwrap_or_else(PoisonError::into_inner);
        let entry = series
            .entry(name.to_string())
            .or_insert_with(|| Series::new(kind));
        if entry.kind() == kind {
            f(entry);
        } else {
            error!(
                "Dropping {kind} sample for `{name}`, which is a {} series.",
                entry.kind()
            );
        }
    }
}

/// Final (or interim) value of one series.
#[derive(Debug, Clone)]
pub enum MetricSummary {
    Counter { count: u64, elapsed: Duration },
    Rate { passes: u64, total: u64 },
    Trend(TrendSummary),
}

impl MetricSummary {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricSummary::Counter { .. } => MetricKind::Counter,
            MetricSummary::Rate { .. } => MetricKind::Rate,
            MetricSummary::Trend(_) => MetricKind::Trend,
        }
    }

    /// Reduce the series with `aggregation`. Trend values are in milliseconds. Returns `None`
    /// when the aggregation does not apply to this kind of series.
    pub fn aggregate(&self, aggregation: Aggregation) -> Option<f64> {
        match (self, aggregation) {
            (MetricSummary::Counter { count, .. }, Aggregation::Count) => Some(*count as f64),
            (MetricSummary::Counter { count, elapsed }, Aggregation::Rate) => {
                let secs = elapsed.as_secs_f64();
                Some(if secs > 0. { *count as f64 / secs } else { 0. })
            }
            (MetricSummary::Rate { .. }, Aggregation::Rate) => self.rate(),
            (MetricSummary::Trend(trend), agg) => {
                let value = match agg {
                    Aggregation::Avg => trend.avg(),
                    Aggregation::Min => trend.min(),
                    Aggregation::Max => trend.max(),
                    Aggregation::Med => trend.median(),
                    Aggregation::Percentile(p) => trend.quantile(p / 100.),
                    Aggregation::Count | Aggregation::Rate => return None,
                };
                Some(value.as_nanos() as f64 / 1e6)
            }
            _ => None,
        }
    }

    /// Fraction of true observations for a rate series; zero when nothing was observed.
    pub fn rate(&self) -> Option<f64> {
        match self {
            MetricSummary::Rate { passes, total } => Some(if *total == 0 {
                0.
            } else {
                *passes as f64 / *total as f64
            }),
            _ => None,
        }
    }

    pub fn count(&self) -> Option<u64> {
        match self {
            MetricSummary::Counter { count, .. } => Some(*count),
            MetricSummary::Rate { total, .. } => Some(*total),
            MetricSummary::Trend(trend) => Some(trend.count()),
        }
    }
}

impl fmt::Display for MetricSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricSummary::Counter { count, elapsed } => {
                let secs = elapsed.as_secs_f64();
                let per_sec = if secs > 0. { *count as f64 / secs } else { 0. };
                write!(f, "{count} ({per_sec:.2}/s)")
            }
            MetricSummary::Rate { passes, total } => write!(
                f,
                "{:.2}% ({passes} of {total})",
                self.rate().unwrap_or(0.) * 100.
            ),
            MetricSummary::Trend(trend) => write!(f, "{trend}"),
        }
    }
}

/// Every series of a run, keyed by name.
#[derive(Debug, Clone)]
pub struct Summary {
    pub elapsed: Duration,
    pub metrics: BTreeMap<String, MetricSummary>,
}

impl Summary {
    pub fn get(&self, name: &str) -> Option<&MetricSummary> {
        self.metrics.get(name)
    }

    /// Counter total, or zero if the series does not exist.
    pub fn counter(&self, name: &str) -> u64 {
        match self.metrics.get(name) {
            Some(MetricSummary::Counter { count, .. }) => *count,
            _ => 0,
        }
    }

    pub fn rate(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).and_then(MetricSummary::rate)
    }

    pub fn trend(&self, name: &str) -> Option<&TrendSummary> {
        match self.metrics.get(name) {
            Some(MetricSummary::Trend(trend)) => Some(trend),
            _ => None,
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.metrics.keys().map(String::len).max().unwrap_or(0);
        for (name, metric) in &self.metrics {
            writeln!(f, "  {name:.<width$}: {metric}", width = width + 2)?;
        }
        Ok(())
    }
}
