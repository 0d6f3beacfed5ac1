//! Gateway walkthrough.
//!
//! Runs a handful of calls against a flaky fake backend and logs everything
//! through `TracingReporter`. Try `RUST_LOG=call_shield=debug` for the
//! breaker and cache internals.

use call_shield::{CallOptions, Gateway, GatewayError, TableOperation, TracingReporter};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

async fn flaky_backend(attempt: usize) -> Result<Vec<String>, io::Error> {
    tokio::time::sleep(Duration::from_millis(20)).await;
    if attempt % 3 == 0 {
        Err(io::Error::new(io::ErrorKind::TimedOut, "backend timed out"))
    } else {
        Ok(vec!["Ada".to_string(), "Grace".to_string()])
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let gateway = Gateway::builder()
        .with_reporter(Arc::new(TracingReporter))
        .with_rate_limit(8, Duration::from_secs(1))
        .with_slow_threshold(Duration::from_millis(15))
        .build()?;

    println!("=== Gateway Example ===\n");

    println!("Cached reads (only the first one reaches the backend):");
    let attempts = &AtomicUsize::new(1);
    for _ in 0..3 {
        let staff = gateway
            .execute_on_table(
                "staff",
                TableOperation::Select,
                CallOptions::new().for_user("nurse_1").cached("staff:all"),
                || async move { flaky_backend(attempts.fetch_add(1, Ordering::SeqCst)).await },
            )
            .await?;
        println!("  staff = {:?}", staff);
    }

    println!("\nUncached calls until the breaker or the limiter steps in:");
    for i in 0..10 {
        let result = gateway
            .execute("rota_select", || async move {
                flaky_backend(attempts.fetch_add(1, Ordering::SeqCst)).await
            })
            .await;
        match result {
            Ok(rows) => println!("  call {}: {} rows", i, rows.len()),
            Err(GatewayError::Operation(e)) => println!("  call {}: backend error: {}", i, e),
            Err(e) => println!("  call {}: rejected: {}", i, e),
        }
    }

    println!("\nStatus:");
    println!("{:#?}", gateway.status());
    println!("\n=== Example Complete ===");
    Ok(())
}
