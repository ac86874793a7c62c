//! One-time seeding of teams and their users before any virtual user starts.
use crate::transport::{send_with_timeout, Request, Transport};
use prload_core::SetupSummary;
use serde::Serialize;
use std::time::Duration;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

pub const TEAM_ADD_PATH: &str = "/team/add";

/// Read-only data every virtual user sees. Built once by [`run_setup`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Context {
    pub teams: Vec<String>,
    pub users_per_team: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TeamMember {
    pub user_id: String,
    pub username: String,
    pub is_active: bool,
}

/// Body of the team registration request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TeamSeed {
    pub team_name: String,
    pub members: Vec<TeamMember>,
}

impl TeamSeed {
    pub fn new(team: &str, users_per_team: u32) -> Self {
        let members = (1..=users_per_team)
            .map(|n| TeamMember {
                user_id: user_id(team, n),
                username: format!("User {team}-{n}"),
                is_active: true,
            })
            .collect();

        Self {
            team_name: team.to_string(),
            members,
        }
    }
}

/// Identifier of the `n`th (1-indexed) user of `team`.
pub fn user_id(team: &str, n: u32) -> String {
    format!("user-{team}-{n}")
}

/// Register every team, one request at a time. Failures are logged and tallied but never stop
/// the run; the returned [`Context`] lists all configured teams regardless.
pub async fn run_setup<T: Transport>(
    transport: &T,
    teams: &[String],
    users_per_team: u32,
    timeout: Duration,
) -> (Context, SetupSummary) {
    info!(
        "Setting up {} teams with {users_per_team} users each",
        teams.len()
    );

    let mut summary = SetupSummary::default();
    for team in teams {
        let seed = TeamSeed::new(team, users_per_team);
        let body = match serde_json::to_value(&seed) {
            Ok(body) => body,
            Err(err) => {
                error!("Unable to encode team {team}: {err}");
                summary.failed += 1;
                continue;
            }
        };

        let request = Request::post(TEAM_ADD_PATH, body, timeout);
        match send_with_timeout(transport, &request).await {
            Ok(res) if res.is_expected() => {
                info!("Team {team}: {}", res.status);
                summary.registered += 1;
            }
            Ok(res) => {
                warn!("Team {team}: {}", res.status);
                summary.failed += 1;
            }
            Err(err) => {
                warn!("Team {team}: {err}");
                summary.failed += 1;
            }
        }
    }

    info!("Setup completed: {summary}");

    let context = Context {
        teams: teams.to_vec(),
        users_per_team,
    };
    (context, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::MockTransport;
    use crate::transport::{Response, TransportError};
    use tracing_test::traced_test;

    fn teams() -> Vec<String> {
        ["backend", "frontend", "mobile"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn seed_payload_shape() {
        let seed = TeamSeed::new("backend", 2);
        assert_eq!(
            serde_json::to_value(&seed).unwrap(),
            serde_json::json!({
                "team_name": "backend",
                "members": [
                    {"user_id": "user-backend-1", "username": "User backend-1", "is_active": true},
                    {"user_id": "user-backend-2", "username": "User backend-2", "is_active": true},
                ]
            })
        );
    }

    #[traced_test]
    #[tokio::test(start_paused = true)]
    async fn registers_each_team_once_in_order() {
        let transport =
            MockTransport::new(|_: &Request| (Ok(Response::new(201)), Duration::from_millis(5)));

        let (context, summary) =
            run_setup(&transport, &teams(), 20, Duration::from_secs(30)).await;

        assert_eq!(context.teams, teams());
        assert_eq!(context.users_per_team, 20);
        assert_eq!(
            summary,
            SetupSummary {
                registered: 3,
                failed: 0
            }
        );

        let calls = transport.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|r| r.path == TEAM_ADD_PATH));
        assert_eq!(calls[1].body["team_name"], "frontend");
        assert_eq!(calls[0].body["members"].as_array().map(Vec::len), Some(20));
        assert!(logs_contain("Team backend: 201"));
    }

    #[traced_test]
    #[tokio::test(start_paused = true)]
    async fn failures_are_not_fatal() {
        let transport = MockTransport::new(|req: &Request| match req.body["team_name"].as_str() {
            Some("frontend") => (Ok(Response::new(400)), Duration::from_millis(5)),
            Some("mobile") => (
                Err(TransportError::Connect("refused".to_string())),
                Duration::ZERO,
            ),
            _ => (Ok(Response::new(201)), Duration::from_millis(5)),
        });

        let (context, summary) =
            run_setup(&transport, &teams(), 5, Duration::from_secs(30)).await;

        assert_eq!(context.teams.len(), 3);
        assert_eq!(
            summary,
            SetupSummary {
                registered: 1,
                failed: 2
            }
        );
        assert!(logs_contain("Team frontend: 400"));
    }

    #[tokio::test(start_paused = true)]
    async fn setup_timeout_applies() {
        let transport =
            MockTransport::new(|_: &Request| (Ok(Response::new(201)), Duration::from_secs(45)));

        let (_, summary) = run_setup(&transport, &teams()[..1], 1, Duration::from_secs(30)).await;
        assert_eq!(summary.failed, 1);
    }
}
