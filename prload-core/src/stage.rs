use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One leg of a ramp profile: over `duration` the target concurrency moves linearly from the
/// previous stage's target to `target`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawStage", into = "RawStage")]
pub struct Stage {
    pub duration: Duration,
    pub target: u32,
}

impl Stage {
    pub fn new(duration: Duration, target: u32) -> Self {
        Self { duration, target }
    }

    /// Parse a stage from its textual form, e.g. `Stage::parse("1m", 10)`.
    pub fn parse(duration: &str, target: i64) -> Result<Self, ConfigError> {
        let duration_str = duration.trim();
        let duration = humantime::parse_duration(duration_str).map_err(|err| {
            ConfigError::StageDuration {
                duration: duration_str.to_string(),
                reason: err.to_string(),
            }
        })?;
        let target = u32::try_from(target).map_err(|_| ConfigError::StageTarget(target))?;

        Ok(Self { duration, target })
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}",
            humantime::format_duration(self.duration),
            self.target
        )
    }
}

#[derive(Serialize, Deserialize)]
struct RawStage {
    duration: String,
    target: i64,
}

impl TryFrom<RawStage> for Stage {
    type Error = ConfigError;

    fn try_from(raw: RawStage) -> Result<Self, Self::Error> {
        Stage::parse(&raw.duration, raw.target)
    }
}

impl From<Stage> for RawStage {
    fn from(stage: Stage) -> Self {
        Self {
            duration: humantime::format_duration(stage.duration).to_string(),
            target: stage.target.into(),
        }
    }
}

/// A validated, non-empty sequence of stages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RampProfile {
    stages: Vec<Stage>,
}

impl RampProfile {
    pub fn new(stages: Vec<Stage>) -> Result<Self, ConfigError> {
        if stages.is_empty() {
            return Err(ConfigError::EmptyProfile);
        }

        let profile = Self { stages };
        if profile.total_duration().is_zero() {
            return Err(ConfigError::ZeroDuration);
        }

        Ok(profile)
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    pub fn max_target(&self) -> u32 {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }

    /// Target concurrency `elapsed` into the run.
    ///
    /// Interpolates linearly from the previous stage's target (zero before the first stage),
    /// truncating toward zero. Past the end of the profile the last target holds.
    pub fn target_at(&self, elapsed: Duration) -> u32 {
        let mut stage_start = Duration::ZERO;
        let mut prev_target = 0u32;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                let progress = (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                let diff = f64::from(stage.target) - f64::from(prev_target);
                return (f64::from(prev_target) + diff * progress) as u32;
            }
            stage_start = stage_end;
            prev_target = stage.target;
        }

        prev_target
    }
}

impl fmt::Display for RampProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stages: Vec<String> = self.stages.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", stages.join(", "))
    }
}
