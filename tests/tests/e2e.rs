mod utils;
#[allow(unused)]
use utils::*;

#[cfg(feature = "integration")]
mod tests {
    use super::*;

    use mock_service::MockConfig;
    use ntest::timeout;
    use prload::{
        CHECKS, FAILURE_COUNT, HTTP_REQS, HTTP_REQ_FAILED, ITERATIONS, SUCCESS_COUNT,
        SUCCESS_RATE,
    };
    use prload::prelude::*;
    use std::time::Duration;

    fn short_run(transport: HttpTransport) -> LoadTest<HttpTransport> {
        LoadTest::new(transport)
            .stages(vec![
                Stage::new(Duration::from_secs(2), 4),
                Stage::new(Duration::from_secs(3), 4),
            ])
            .pacing(Duration::from_millis(100), Duration::from_millis(200))
            .seed(11)
    }

    #[tokio::test]
    #[timeout(30_000)]
    async fn healthy_service_passes() {
        init();
        let base = spawn_mock(MockConfig::default()).await.unwrap();

        let report = short_run(HttpTransport::new(&base).unwrap()).await.unwrap();
        println!("{report}");

        assert!(report.passed());
        assert_eq!(report.setup.registered, 10);
        assert_eq!(report.vus_max, 4);

        let summary = &report.summary;
        let iterations = summary.counter(ITERATIONS);
        assert!(iterations > 10, "{iterations}");
        assert_eq!(summary.counter(SUCCESS_COUNT), iterations);
        assert_eq!(summary.counter(FAILURE_COUNT), 0);
        assert_eq!(summary.counter(HTTP_REQS), iterations * 2);
        assert_eq!(summary.rate(SUCCESS_RATE), Some(1.));
        assert_eq!(summary.rate(CHECKS), Some(1.));
    }

    #[tokio::test]
    #[timeout(30_000)]
    async fn failing_service_fails_thresholds() {
        init();
        let base = spawn_mock(MockConfig {
            failure_ratio: 0.5,
            ..Default::default()
        })
        .await
        .unwrap();

        let report = short_run(HttpTransport::new(&base).unwrap()).await.unwrap();

        assert!(!report.passed());
        let summary = &report.summary;
        assert!(summary.counter(FAILURE_COUNT) > 0);
        assert!(summary.rate(HTTP_REQ_FAILED).unwrap_or(0.) > 0.1);
        assert_eq!(
            summary.counter(SUCCESS_COUNT) + summary.counter(FAILURE_COUNT),
            summary.counter(ITERATIONS)
        );
    }

    #[tokio::test]
    #[timeout(30_000)]
    async fn unreachable_service_is_absorbed() {
        init();
        // Bind then drop to get a port nothing listens on.
        let addr = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();

        let report = short_run(HttpTransport::new(&format!("http://{addr}")).unwrap())
            .stages(vec![Stage::new(Duration::from_secs(2), 2)])
            .await
            .unwrap();

        assert!(!report.passed());
        assert_eq!(report.setup.failed, 10);
        assert_eq!(report.summary.rate(HTTP_REQ_FAILED), Some(1.));
        assert_eq!(report.summary.counter(SUCCESS_COUNT), 0);
    }

    #[tokio::test]
    #[timeout(30_000)]
    async fn rate_cap_bounds_throughput() {
        init();
        let base = spawn_mock(MockConfig::default()).await.unwrap();

        let report = short_run(HttpTransport::new(&base).unwrap())
            .max_rps(std::num::NonZeroU32::new(10).unwrap())
            .await
            .unwrap();

        let reqs = report.summary.counter(HTTP_REQS);
        // 5s at 10 rps, plus requests already past the limiter when the ramp ends.
        assert!(reqs <= 60, "{reqs}");
    }
}
