//! In-memory stand-in for the pull request service, for exercising the load generator.
use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
#[allow(unused)]
use metrics::{counter, gauge, histogram};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
#[allow(unused)]
use tracing::{debug, info, trace, warn};

/// Knobs for how the service misbehaves.
#[derive(Clone, Debug, PartialEq)]
pub struct MockConfig {
    /// Mean added latency per request.
    pub latency: Duration,
    /// Standard deviation around `latency`.
    pub jitter: Duration,
    /// Fraction of create/merge requests answered with a 500.
    pub failure_ratio: f64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(5),
            jitter: Duration::ZERO,
            failure_ratio: 0.,
        }
    }
}

#[derive(Debug)]
struct PullRequest {
    #[allow(unused)]
    name: String,
    #[allow(unused)]
    author: String,
    merged: bool,
}

#[derive(Default)]
struct Store {
    teams: HashSet<String>,
    users: HashSet<String>,
    pull_requests: HashMap<String, PullRequest>,
}

#[derive(Clone)]
struct AppState {
    config: Arc<MockConfig>,
    store: Arc<RwLock<Store>>,
}

#[derive(Deserialize)]
struct Member {
    user_id: String,
    #[allow(unused)]
    username: String,
    is_active: bool,
}

#[derive(Deserialize)]
struct TeamAdd {
    team_name: String,
    members: Vec<Member>,
}

#[derive(Deserialize)]
struct CreatePullRequest {
    pull_request_id: String,
    pull_request_name: String,
    author_id: String,
}

#[derive(Deserialize)]
struct MergePullRequest {
    pull_request_id: String,
}

type Reply = (StatusCode, Json<Value>);

pub fn router(config: MockConfig) -> Router {
    let state = AppState {
        config: Arc::new(config),
        store: Arc::new(RwLock::new(Store::default())),
    };

    Router::new()
        .route("/team/add", post(team_add))
        .route("/pullRequest/create", post(create))
        .route("/pullRequest/merge", post(merge))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on an already bound listener; handy for tests binding port 0.
pub async fn serve(listener: TcpListener, config: MockConfig) -> std::io::Result<()> {
    axum::serve(listener, router(config)).await
}

pub async fn run(addr: SocketAddr, config: MockConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("Mock service listening on {}", listener.local_addr()?);
    serve(listener, config).await?;
    Ok(())
}

async fn team_add(State(state): State<AppState>, Json(body): Json<TeamAdd>) -> Reply {
    counter!("mock_service.requests", "route" => "team_add").increment(1);

    let mut store = state.store.write().unwrap_or_else(PoisonError::into_inner);
    if !store.teams.insert(body.team_name.clone()) {
        return error(StatusCode::BAD_REQUEST, "TEAM_EXISTS");
    }

    let active = body.members.iter().filter(|m| m.is_active);
    store.users.extend(active.map(|m| m.user_id.clone()));
    debug!(
        "Registered team {} with {} members",
        body.team_name,
        body.members.len()
    );

    (
        StatusCode::CREATED,
        Json(json!({ "team_name": body.team_name })),
    )
}

async fn create(State(state): State<AppState>, Json(body): Json<CreatePullRequest>) -> Reply {
    counter!("mock_service.requests", "route" => "create").increment(1);
    if let Some(reply) = misbehave(&state.config).await {
        return reply;
    }

    let mut store = state.store.write().unwrap_or_else(PoisonError::into_inner);
    if !store.users.contains(&body.author_id) {
        return error(StatusCode::CONFLICT, "NOT_FOUND");
    }
    if store.pull_requests.contains_key(&body.pull_request_id) {
        return error(StatusCode::CONFLICT, "PR_EXISTS");
    }

    store.pull_requests.insert(
        body.pull_request_id.clone(),
        PullRequest {
            name: body.pull_request_name,
            author: body.author_id,
            merged: false,
        },
    );

    (
        StatusCode::CREATED,
        Json(json!({ "pull_request_id": body.pull_request_id, "status": "OPEN" })),
    )
}

async fn merge(State(state): State<AppState>, Json(body): Json<MergePullRequest>) -> Reply {
    counter!("mock_service.requests", "route" => "merge").increment(1);
    if let Some(reply) = misbehave(&state.config).await {
        return reply;
    }

    let mut store = state.store.write().unwrap_or_else(PoisonError::into_inner);
    match store.pull_requests.get_mut(&body.pull_request_id) {
        Some(pr) => {
            pr.merged = true;
            (
                StatusCode::OK,
                Json(json!({ "pull_request_id": body.pull_request_id, "status": "MERGED" })),
            )
        }
        None => error(StatusCode::NOT_FOUND, "NOT_FOUND"),
    }
}

/// Sleep for the configured latency, then maybe fail.
async fn misbehave(config: &MockConfig) -> Option<Reply> {
    let (delay, fail) = {
        let mut rng = rand::thread_rng();
        let delay = match Normal::new(config.latency.as_secs_f64(), config.jitter.as_secs_f64()) {
            Ok(normal) => Duration::from_secs_f64(normal.sample(&mut rng).max(0.)),
            Err(_) => config.latency,
        };
        let fail = rng.gen_bool(config.failure_ratio.clamp(0., 1.));
        (delay, fail)
    };

    tokio::time::sleep(delay).await;

    if fail {
        trace!("Injecting failure");
        Some(error(StatusCode::INTERNAL_SERVER_ERROR, "INJECTED"))
    } else {
        None
    }
}

fn error(status: StatusCode, code: &str) -> Reply {
    (status, Json(json!({ "error": { "code": code } })))
}
