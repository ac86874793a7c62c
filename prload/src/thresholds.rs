use crate::aggregator::Summary;
use prload_core::Threshold;
use std::fmt;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

/// The verdict on one threshold, with the value it was judged on.
#[derive(Clone, Debug, PartialEq)]
pub struct ThresholdOutcome {
    pub threshold: Threshold,
    pub observed: Option<f64>,
    pub passed: bool,
}

impl fmt::Display for ThresholdOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.passed { "✓" } else { "✗" };
        match self.observed {
            Some(value) => write!(f, "{mark} {} (observed {value:.4})", self.threshold),
            None => write!(f, "{mark} {} (no data)", self.threshold),
        }
    }
}

/// Judge every threshold against the final snapshot. A threshold on a series missing from the
/// snapshot fails.
pub fn evaluate(thresholds: &[Threshold], summary: &Summary) -> Vec<ThresholdOutcome> {
    thresholds
        .iter()
        .map(|threshold| {
            let observed = summary
                .get(&threshold.metric)
                .and_then(|metric| metric.aggregate(threshold.expr.aggregation));

            let passed = match observed {
                Some(value) => threshold.expr.comparison.holds(value, threshold.expr.bound),
                None => {
                    warn!("No value for threshold {threshold}");
                    false
                }
            };
            debug!("Threshold {threshold}: observed={observed:?}, passed={passed}");

            ThresholdOutcome {
                threshold: threshold.clone(),
                observed,
                passed,
            }
        })
        .collect()
}
