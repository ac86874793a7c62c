//! The create-then-merge workflow a virtual user runs once per iteration.
use crate::transaction::{transaction, Exchange, TransactionData};
use crate::transport::{Request, Transport};
use prload_core::{ScenarioResult, CHECKS, STATUS_CREATED, STATUS_MERGED};
use serde::Serialize;
use std::time::Duration;
#[allow(unused_imports)]
use tracing::{debug, trace};

pub const CREATE_PATH: &str = "/pullRequest/create";
pub const MERGE_PATH: &str = "/pullRequest/merge";

/// Timeout and latency bound shared by both steps.
#[derive(Clone, Copy, Debug)]
pub struct StepSettings {
    pub timeout: Duration,
    pub latency_sli: Duration,
}

#[derive(Serialize)]
struct CreatePullRequest<'a> {
    pull_request_id: &'a str,
    pull_request_name: &'a str,
    author_id: &'a str,
}

#[derive(Serialize)]
struct MergePullRequest<'a> {
    pull_request_id: &'a str,
}

/// Identifier and display name of the pull request one iteration creates and merges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PullRequestKey {
    pub id: String,
    pub name: String,
}

impl PullRequestKey {
    pub fn new(iteration_id: &str) -> Self {
        Self {
            id: format!("pr-{iteration_id}"),
            name: format!("PR-{iteration_id}"),
        }
    }
}

/// A named predicate on a step's response.
#[derive(Clone, Debug, PartialEq)]
pub enum Check {
    Status { name: &'static str, expected: u16 },
    LatencyBelow { name: &'static str, limit: Duration },
}

impl Check {
    pub fn name(&self) -> &'static str {
        match self {
            Check::Status { name, .. } | Check::LatencyBelow { name, .. } => name,
        }
    }

    /// Transport errors have no status, so a status check always fails on them; the latency
    /// check still applies to however long the failed attempt took.
    pub(crate) fn passes(&self, exchange: &Exchange) -> bool {
        match self {
            Check::Status { expected, .. } => exchange.status() == Some(*expected),
            Check::LatencyBelow { limit, .. } => exchange.elapsed < *limit,
        }
    }
}

/// One externally observable action and the checks its response must satisfy.
#[derive(Clone, Debug)]
pub struct Step {
    pub name: &'static str,
    pub request: Request,
    pub checks: Vec<Check>,
}

impl Step {
    pub fn create(key: &PullRequestKey, author_id: &str, settings: &StepSettings) -> Self {
        let body = CreatePullRequest {
            pull_request_id: &key.id,
            pull_request_name: &key.name,
            author_id,
        };

        Self {
            name: "create",
            request: Request::post(CREATE_PATH, to_body(&body), settings.timeout),
            checks: vec![
                Check::Status {
                    name: "PR created successfully",
                    expected: STATUS_CREATED,
                },
                Check::LatencyBelow {
                    name: "PR creation within SLI",
                    limit: settings.latency_sli,
                },
            ],
        }
    }

    pub fn merge(key: &PullRequestKey, settings: &StepSettings) -> Self {
        let body = MergePullRequest {
            pull_request_id: &key.id,
        };

        Self {
            name: "merge",
            request: Request::post(MERGE_PATH, to_body(&body), settings.timeout),
            checks: vec![
                Check::Status {
                    name: "PR merged successfully",
                    expected: STATUS_MERGED,
                },
                Check::LatencyBelow {
                    name: "PR merge within SLI",
                    limit: settings.latency_sli,
                },
            ],
        }
    }

    /// Send the request and evaluate every check. The step passes only if all checks do.
    pub(crate) async fn execute<T: Transport>(&self, hook: &TransactionData, transport: &T) -> bool {
        let exchange = transaction(hook, transport, &self.request).await;

        if let Err(err) = &exchange.response {
            debug!("{} step failed: {err}", self.name);
        }

        let mut passed = true;
        for check in &self.checks {
            let ok = check.passes(&exchange);
            hook.metrics.observe(CHECKS, ok);
            if !ok {
                trace!(
                    "Check `{}` failed (status={:?}, elapsed={:?})",
                    check.name(),
                    exchange.status(),
                    exchange.elapsed
                );
            }
            passed &= ok;
        }

        passed
    }
}

fn to_body<B: Serialize>(body: &B) -> serde_json::Value {
    // NOTE: Serializing a struct of string fields cannot fail.
    serde_json::to_value(body).unwrap_or_default()
}

/// Where an iteration is in the create-then-merge workflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScenarioState {
    Start,
    Created,
    Merged,
    Failed,
}

impl ScenarioState {
    pub fn advance(self, step_passed: bool) -> Self {
        match (self, step_passed) {
            (ScenarioState::Failed, _) | (_, false) => ScenarioState::Failed,
            (ScenarioState::Start, true) => ScenarioState::Created,
            (ScenarioState::Created, true) | (ScenarioState::Merged, true) => ScenarioState::Merged,
        }
    }
}

/// Create a pull request, then merge it. A failed create short-circuits the merge.
#[derive(Clone, Debug)]
pub struct Scenario {
    create: Step,
    merge: Step,
}

impl Scenario {
    pub fn create_then_merge(key: &PullRequestKey, author_id: &str, settings: &StepSettings) -> Self {
        Self {
            create: Step::create(key, author_id, settings),
            merge: Step::merge(key, settings),
        }
    }

    pub fn steps(&self) -> [&Step; 2] {
        [&self.create, &self.merge]
    }

    pub(crate) async fn run<T: Transport>(
        &self,
        hook: &TransactionData,
        transport: &T,
    ) -> ScenarioResult {
        let mut state = ScenarioState::Start;
        let mut steps_completed = 0;

        for step in self.steps() {
            state = state.advance(step.execute(hook, transport).await);
            if state == ScenarioState::Failed {
                break;
            }
            steps_completed += 1;
        }

        ScenarioResult {
            succeeded: state == ScenarioState::Merged,
            steps_completed,
        }
    }
}
