use std::fmt;

/// The shape of a metric series, which determines the aggregations a threshold may use on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Monotonically increasing total.
    Counter,
    /// Fraction of `true` observations over all observations.
    Rate,
    /// Duration samples summarised by percentiles.
    Trend,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricKind::Counter => "counter",
            MetricKind::Rate => "rate",
            MetricKind::Trend => "trend",
        };
        f.write_str(name)
    }
}

/// Outcome of a single scenario iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScenarioResult {
    pub succeeded: bool,
    pub steps_completed: u32,
}

/// Tally of the one-time team registration requests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SetupSummary {
    pub registered: usize,
    pub failed: usize,
}

impl fmt::Display for SetupSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "teams registered={}, failed={}",
            self.registered, self.failed
        )
    }
}
