use crate::aggregator::MetricsAggregator;
use crate::transport::{send_with_timeout, Request, Response, Transport, TransportError};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use prload_core::{HTTP_REQS, HTTP_REQ_DURATION, HTTP_REQ_FAILED};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Per-run state every load-phase request passes through.
#[derive(Clone)]
pub(crate) struct TransactionData {
    pub limiter: Option<Arc<DefaultDirectRateLimiter>>,
    pub metrics: Arc<MetricsAggregator>,
}

impl TransactionData {
    pub fn new(metrics: Arc<MetricsAggregator>, max_rps: Option<NonZeroU32>) -> Self {
        Self {
            limiter: max_rps.map(|rps| Arc::new(rate_limiter(rps))),
            metrics,
        }
    }
}

/// A request together with what came back and how long it took.
#[derive(Debug, Clone)]
pub(crate) struct Exchange {
    pub response: Result<Response, TransportError>,
    pub elapsed: Duration,
}

impl Exchange {
    pub fn status(&self) -> Option<u16> {
        self.response.as_ref().ok().map(|r| r.status)
    }
}

/// Issue one load-phase request: wait for the rate limiter, time the call and record the
/// `http_*` series.
pub(crate) async fn transaction<T: Transport>(
    hook: &TransactionData,
    transport: &T,
    request: &Request,
) -> Exchange {
    if let Some(limiter) = &hook.limiter {
        limiter.until_ready().await;
    }

    let start = Instant::now();
    let response = send_with_timeout(transport, request).await;
    let elapsed = start.elapsed();

    let failed = !matches!(&response, Ok(res) if res.is_expected());
    hook.metrics.increment(HTTP_REQS);
    hook.metrics.record(HTTP_REQ_DURATION, elapsed);
    hook.metrics.observe(HTTP_REQ_FAILED, failed);

    Exchange { response, elapsed }
}

fn rate_limiter(max_rps: NonZeroU32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_second(max_rps).allow_burst(NonZeroU32::MIN))
}
