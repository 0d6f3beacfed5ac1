//! Performance timer and slow-operation reporting.

use call_shield::infrastructure::mocks::{MockClock, RecordingReporter};
use call_shield::{Gateway, GatewayError, Report};
use std::io;
use std::sync::Arc;
use std::time::Duration;

fn gateway(clock: &MockClock, reporter: &RecordingReporter, threshold_ms: u64) -> Gateway {
    Gateway::builder()
        .with_clock(Arc::new(clock.clone()))
        .with_reporter(Arc::new(reporter.clone()))
        .with_slow_threshold(Duration::from_millis(threshold_ms))
        .build()
        .unwrap()
}

#[test]
fn test_slow_timer_reports_value_and_threshold() {
    let clock = MockClock::starting_now();
    let reporter = RecordingReporter::new();
    let gw = gateway(&clock, &reporter, 2000);

    let id = gw
        .timer()
        .start_timer("appointments_select", Some(Duration::from_millis(100)));
    clock.advance_ms(150);
    gw.timer().end_timer(&id);

    assert_eq!(
        reporter.reports(),
        vec![Report::PerformanceIssue(call_shield::PerformanceReport {
            metric_name: "appointments_select".to_string(),
            value_ms: 150,
            threshold_ms: 100,
        })]
    );
}

#[tokio::test]
async fn test_gateway_call_timed_under_operation_name() {
    let clock = MockClock::starting_now();
    let reporter = RecordingReporter::new();
    let gw = gateway(&clock, &reporter, 100);
    let clock_ref = &clock;

    let result: Result<u8, GatewayError<io::Error>> = gw
        .execute("staff_select", || async move {
            clock_ref.advance_ms(150);
            Ok(1)
        })
        .await;
    assert!(result.is_ok());

    let issues = reporter.performance_issues();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].metric_name, "staff_select");
    assert_eq!(issues[0].value_ms, 150);
    assert_eq!(issues[0].threshold_ms, 100);
    assert_eq!(gw.metrics().slow_operations(), 1);
    assert_eq!(gw.timer().active_timers(), 0);
}

#[tokio::test]
async fn test_fast_call_not_reported() {
    let clock = MockClock::starting_now();
    let reporter = RecordingReporter::new();
    let gw = gateway(&clock, &reporter, 100);

    let _: Result<u8, GatewayError<io::Error>> = gw.execute("staff_select", || async { Ok(1) }).await;

    assert!(reporter.performance_issues().is_empty());
}

#[test]
fn test_unknown_timer() {
    let clock = MockClock::starting_now();
    let reporter = RecordingReporter::new();
    let gw = gateway(&clock, &reporter, 100);

    let id = gw.timer().start_timer("a", None);
    assert!(gw.timer().cancel_timer(&id));
    assert_eq!(gw.timer().end_timer(&id), None);
    assert_eq!(reporter.count(), 0);
}

#[test]
fn test_measure_sync_forwards_error() {
    let clock = MockClock::starting_now();
    let reporter = RecordingReporter::new();
    let gw = gateway(&clock, &reporter, 100);

    let err = gw
        .timer()
        .measure_sync("parse_rota", None, || {
            "x".parse::<u32>().map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        })
        .unwrap_err();

    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    let errors = reporter.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].context.get("operation").map(String::as_str),
        Some("parse_rota")
    );
}
