use crate::MetricKind;
use std::time::Duration;

/// Teams seeded by the setup phase when none are configured.
pub const DEFAULT_TEAMS: [&str; 10] = [
    "backend", "frontend", "mobile", "payments", "infra", "data", "qa", "devops", "security",
    "ai",
];

pub const DEFAULT_USERS_PER_TEAM: u32 = 20;

/// Latency bound a create or merge response must beat to pass its SLI check.
pub const DEFAULT_LATENCY_SLI: Duration = Duration::from_millis(300);

pub const DEFAULT_PACING_MIN: Duration = Duration::from_millis(800);
pub const DEFAULT_PACING_MAX: Duration = Duration::from_millis(1200);

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_SETUP_TIMEOUT: Duration = Duration::from_secs(30);

/// How often the ramp scheduler re-evaluates the target concurrency.
pub const SCHEDULER_TICK: Duration = Duration::from_millis(100);

pub const STATUS_CREATED: u16 = 201;
pub const STATUS_MERGED: u16 = 200;

pub const SUCCESS_COUNT: &str = "success_count";
pub const FAILURE_COUNT: &str = "failure_count";
pub const SUCCESS_RATE: &str = "success_rate";
pub const ITERATIONS: &str = "iterations";
pub const ITERATION_DURATION: &str = "iteration_duration";
pub const HTTP_REQS: &str = "http_reqs";
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
pub const CHECKS: &str = "checks";

/// Every series the engine records, registered up front so summaries always list them.
pub const BUILTIN_METRICS: [(&str, MetricKind); 9] = [
    (SUCCESS_COUNT, MetricKind::Counter),
    (FAILURE_COUNT, MetricKind::Counter),
    (SUCCESS_RATE, MetricKind::Rate),
    (ITERATIONS, MetricKind::Counter),
    (ITERATION_DURATION, MetricKind::Trend),
    (HTTP_REQS, MetricKind::Counter),
    (HTTP_REQ_DURATION, MetricKind::Trend),
    (HTTP_REQ_FAILED, MetricKind::Rate),
    (CHECKS, MetricKind::Rate),
];

pub fn builtin_kind(name: &str) -> Option<MetricKind> {
    BUILTIN_METRICS
        .iter()
        .find(|(builtin, _)| *builtin == name)
        .map(|(_, kind)| *kind)
}
