use crate::{
    ConfigError, RampProfile, Stage, Threshold, DEFAULT_LATENCY_SLI, DEFAULT_PACING_MAX,
    DEFAULT_PACING_MIN, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SETUP_TIMEOUT, DEFAULT_TEAMS,
    DEFAULT_USERS_PER_TEAM, HTTP_REQ_DURATION, HTTP_REQ_FAILED, SUCCESS_RATE,
};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::time::Duration;

/// Everything a run needs, consumed once at start and never mutated afterwards.
///
/// Deserializes from k6-shaped JSON; every field is optional and falls back to the default
/// topology (10 teams of 20 users, 300ms SLI, 0.8s-1.2s pacing).
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub stages: Vec<Stage>,
    pub thresholds: BTreeMap<String, Vec<String>>,
    pub teams: Vec<String>,
    pub users_per_team: u32,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "latency_sli_ms")]
    pub latency_sli: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "pacing_min_ms")]
    pub pacing_min: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "pacing_max_ms")]
    pub pacing_max: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "request_timeout_ms")]
    pub request_timeout: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "setup_timeout_ms")]
    pub setup_timeout: Duration,
    /// Cap on load-phase requests per second across all virtual users.
    pub max_rps: Option<NonZeroU32>,
    /// Seed for every virtual user's random source. Entropy is used when absent.
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        let thresholds = [
            (HTTP_REQ_DURATION, "p(95)<300"),
            (HTTP_REQ_FAILED, "rate<0.001"),
            (SUCCESS_RATE, "rate>0.999"),
        ]
        .into_iter()
        .map(|(metric, expr)| (metric.to_string(), vec![expr.to_string()]))
        .collect();

        Self {
            stages: vec![
                Stage::new(Duration::from_secs(5), 10),
                Stage::new(Duration::from_secs(60), 10),
            ],
            thresholds,
            teams: DEFAULT_TEAMS.iter().map(|t| t.to_string()).collect(),
            users_per_team: DEFAULT_USERS_PER_TEAM,
            latency_sli: DEFAULT_LATENCY_SLI,
            pacing_min: DEFAULT_PACING_MIN,
            pacing_max: DEFAULT_PACING_MAX,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            setup_timeout: DEFAULT_SETUP_TIMEOUT,
            max_rps: None,
            seed: None,
        }
    }
}

impl RunConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn profile(&self) -> Result<RampProfile, ConfigError> {
        RampProfile::new(self.stages.clone())
    }

    pub fn parsed_thresholds(&self) -> Result<Vec<Threshold>, ConfigError> {
        self.thresholds
            .iter()
            .flat_map(|(metric, exprs)| exprs.iter().map(move |expr| Threshold::parse(metric, expr)))
            .collect()
    }

    /// Check everything that would otherwise only fail once load is running.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.profile()?;
        self.parsed_thresholds()?;

        if self.teams.is_empty() {
            return Err(ConfigError::NoTeams);
        }

        if self.users_per_team == 0 {
            return Err(ConfigError::NoUsers);
        }

        if self.pacing_min > self.pacing_max {
            return Err(ConfigError::PacingWindow {
                min: self.pacing_min,
                max: self.pacing_max,
            });
        }

        Ok(())
    }
}
