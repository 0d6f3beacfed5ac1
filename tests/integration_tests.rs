//! End-to-end gateway flows with real reporters and log capture.

use call_shield::infrastructure::mocks::{MockCaptureLayer, MockClock, RecordingReporter};
use call_shield::{
    CallOptions, ChannelReporter, CircuitBreakerConfig, CircuitState, Gateway, GatewayConfig,
    GatewayError, Report, TableOperation, TracingReporter,
};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

#[derive(Debug, Clone, PartialEq)]
struct Appointment {
    id: u32,
    patient: String,
}

#[tokio::test]
async fn test_full_flow() {
    let clock = MockClock::starting_now();
    let reporter = RecordingReporter::new();
    let gw = Gateway::builder()
        .with_clock(Arc::new(clock.clone()))
        .with_reporter(Arc::new(reporter.clone()))
        .with_breaker_config(
            CircuitBreakerConfig::new(2, Duration::from_secs(30), Duration::from_secs(10)).unwrap(),
        )
        .with_rate_limit(10, Duration::from_secs(60))
        .build()
        .unwrap();

    let options = || CallOptions::new().for_user("nurse_1").cached("appointments:today");
    let fetch = || async {
        Ok::<_, io::Error>(vec![Appointment {
            id: 1,
            patient: "M. Curie".to_string(),
        }])
    };

    let first = gw
        .execute_on_table("appointments", TableOperation::Select, options(), fetch)
        .await
        .unwrap();
    let cached = gw
        .execute_on_table("appointments", TableOperation::Select, options(), fetch)
        .await
        .unwrap();
    assert_eq!(first, cached);

    // Writes are never cached and trip their own breaker
    for _ in 0..2 {
        let _: Result<(), _> = gw
            .execute_on_table(
                "appointments",
                TableOperation::Insert,
                CallOptions::new().for_user("nurse_1"),
                || async { Err(io::Error::new(io::ErrorKind::Other, "write conflict")) },
            )
            .await;
    }

    let status = gw.status();
    assert_eq!(status.breakers["appointments_insert"].state, CircuitState::Open);
    assert_eq!(status.breakers["appointments_select"].state, CircuitState::Closed);
    assert_eq!(status.cache.hits, 1);
    assert_eq!(status.metrics.calls_succeeded, 1);
    assert_eq!(status.metrics.calls_failed, 2);
    assert_eq!(gw.limiter().remaining("user_nurse_1"), 6);

    // Reads still succeed while the write path is open
    let read = gw
        .execute_with("appointments_select", CallOptions::new(), fetch)
        .await;
    assert!(read.is_ok());

    clock.advance(Duration::from_secs(31));
    let recovered: Result<(), GatewayError<io::Error>> = gw
        .execute("appointments_insert", || async { Ok(()) })
        .await;
    assert!(recovered.is_ok());
    assert_eq!(reporter.api_errors().len(), 2);
}

#[tokio::test]
async fn test_gateway_from_config() {
    let config: GatewayConfig =
        serde_json::from_str(r#"{"max_requests": 1, "window_ms": 500, "failure_threshold": 1}"#)
            .unwrap();
    let clock = MockClock::starting_now();
    let gw = Gateway::builder()
        .with_config(&config)
        .with_clock(Arc::new(clock.clone()))
        .build()
        .unwrap();

    let _: u8 = gw.execute("a", || async { Ok::<_, io::Error>(1) }).await.unwrap();
    let limited = gw.execute("a", || async { Ok::<u8, io::Error>(1) }).await;
    assert!(limited.unwrap_err().is_rate_limited());

    clock.advance_ms(500);
    assert!(gw.execute("a", || async { Ok::<u8, io::Error>(1) }).await.is_ok());
}

#[tokio::test]
async fn test_channel_reporter_receives_reports() {
    let (reporter, mut receiver) = ChannelReporter::new(16);
    let gw = Gateway::builder()
        .with_reporter(Arc::new(reporter))
        .build()
        .unwrap();

    let _: Result<(), _> = gw
        .execute("staff_update", || async {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "row level security"))
        })
        .await;

    match receiver.recv().await {
        Some(Report::ApiError(report)) => {
            assert_eq!(report.operation_name, "staff_update");
            assert_eq!(report.error, "row level security");
            assert_eq!(report.circuit_state, CircuitState::Closed);
        }
        other => panic!("expected api error report, got {other:?}"),
    }
}

#[tokio::test]
async fn test_full_channel_does_not_fail_calls() {
    let (reporter, _receiver) = ChannelReporter::new(1);
    let gw = Gateway::builder()
        .with_reporter(Arc::new(reporter))
        .build()
        .unwrap();

    for _ in 0..3 {
        let result: Result<(), _> = gw
            .execute("staff_update", || async {
                Err(io::Error::new(io::ErrorKind::Other, "boom"))
            })
            .await;
        // The caller sees its own error, never the sink's
        assert_eq!(result.unwrap_err().into_operation().unwrap().to_string(), "boom");
    }
}

#[tokio::test]
async fn test_tracing_reporter_and_breaker_logs() {
    let capture = MockCaptureLayer::new();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let gw = Gateway::builder()
        .with_reporter(Arc::new(TracingReporter))
        .with_breaker_config(
            CircuitBreakerConfig::new(1, Duration::from_secs(60), Duration::from_secs(10)).unwrap(),
        )
        .build()
        .unwrap();

    let _: Result<(), _> = gw
        .execute("rota_select", || async {
            Err(io::Error::new(io::ErrorKind::Other, "timeout"))
        })
        .await;

    let opened = capture.with_message("Circuit breaker opened");
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].field("operation"), Some("rota_select"));

    let reported = capture.with_message("API error report");
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].level, Level::ERROR);
    assert_eq!(reported[0].field("circuit_state"), Some("OPEN"));
}

#[test]
fn test_reports_serialize_with_kind_tag() {
    let report = Report::PerformanceIssue(call_shield::PerformanceReport::new(
        "staff_select",
        Duration::from_millis(2500),
        Duration::from_millis(2000),
    ));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["kind"], "performance_issue");
    assert_eq!(json["metric_name"], "staff_select");
    assert_eq!(json["value_ms"], 2500);
    assert_eq!(json["threshold_ms"], 2000);
}

#[tokio::test]
async fn test_gateway_is_send_and_shared_across_tasks() {
    let gw = Gateway::builder()
        .with_rate_limit(1000, Duration::from_secs(60))
        .build()
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..8u32 {
        let gw = gw.clone();
        handles.push(tokio::spawn(async move {
            gw.execute_with("counter", CallOptions::new().for_user(i.to_string()), || async move {
                Ok::<_, io::Error>(i)
            })
            .await
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    assert_eq!(gw.metrics().calls_succeeded(), 8);
    assert_eq!(gw.limiter().tracked_identifiers(), 9);
}

#[tokio::test]
async fn test_failing_sink_is_swallowed() {
    let reporter = RecordingReporter::new();
    let gw = Gateway::builder()
        .with_reporter(Arc::new(reporter.clone()))
        .build()
        .unwrap();

    let _: Result<(), _> = gw
        .execute("visits_select", || async {
            Err(io::Error::new(io::ErrorKind::Other, "first"))
        })
        .await;
    assert_eq!(reporter.count(), 1);
    reporter.clear();

    reporter.fail_deliveries(true);
    let result: Result<(), _> = gw
        .execute("visits_select", || async {
            Err(io::Error::new(io::ErrorKind::Other, "second"))
        })
        .await;
    assert_eq!(result.unwrap_err().into_operation().unwrap().to_string(), "second");
    assert_eq!(reporter.count(), 0);
    assert_eq!(gw.metrics().calls_failed(), 2);
}
