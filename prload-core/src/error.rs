use crate::{Aggregation, MetricKind};
use std::time::Duration;
use thiserror::Error;

/// Problems with a run configuration. These are detected before the setup phase and are the only
/// errors which abort a run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid stage duration `{duration}`: {reason}")]
    StageDuration { duration: String, reason: String },

    #[error("Stage target must be a non-negative integer, found {0}")]
    StageTarget(i64),

    #[error("Ramp profile has no stages")]
    EmptyProfile,

    #[error("Ramp profile has a total duration of zero")]
    ZeroDuration,

    #[error("Unable to parse threshold `{expression}` for `{metric}`")]
    ThresholdSyntax { metric: String, expression: String },

    #[error("Threshold references unknown metric `{0}`")]
    UnknownMetric(String),

    #[error("Aggregation `{aggregation}` is not supported by the {kind} metric `{metric}`")]
    UnsupportedAggregation {
        metric: String,
        aggregation: Aggregation,
        kind: MetricKind,
    },

    #[error("Pacing window is inverted ({min:?} > {max:?})")]
    PacingWindow { min: Duration, max: Duration },

    #[error("At least one team is required")]
    NoTeams,

    #[error("Each team needs at least one user")]
    NoUsers,

    #[error("Malformed configuration: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
