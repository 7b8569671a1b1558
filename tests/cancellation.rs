//! Cancellation semantics: a cancelled call is never a breaker
//! observation and never produces a fallback.

use aegis::{CancelToken, ControlPlane, ErrorKind, ExecuteOptions, StrategySpec, TargetSpec, Tier};
use serde_json::json;
use std::time::Duration;

fn plane_with_fallback() -> ControlPlane {
    let plane = ControlPlane::builder().build();
    plane
        .register_target(
            "t",
            TargetSpec::builder(Tier::Standard)
                .fallback_chain(vec![StrategySpec::Static {
                    value: json!("should-not-serve"),
                }])
                .build()
                .unwrap(),
        )
        .unwrap();
    plane
}

#[tokio::test]
async fn pre_cancelled_call_returns_immediately() {
    let plane = plane_with_fallback();
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = plane
        .execute(
            "t",
            || Box::pin(async { Ok(json!("never")) }),
            ExecuteOptions::new(),
            &cancel,
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Cancelled);
    assert_eq!(err.attempts, 0);

    let metrics = plane.metrics();
    let breaker = &metrics.targets["t"].breaker;
    assert_eq!(breaker.total_requests, 0);
}

#[tokio::test(start_paused = true)]
async fn mid_attempt_cancellation_skips_fallback_and_breaker() {
    let plane = plane_with_fallback();
    let cancel = CancelToken::new();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        cancel_clone.cancel();
    });

    let err = plane
        .execute(
            "t",
            || {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(json!("never"))
                })
            },
            ExecuteOptions::new(),
            &cancel,
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Cancelled);

    let metrics = plane.metrics();
    let breaker = &metrics.targets["t"].breaker;
    assert_eq!(breaker.total_failures, 0);
    assert_eq!(breaker.in_flight, 0);
    assert_eq!(breaker.total_requests, 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_backoff_stops_retrying() {
    let plane = plane_with_fallback();
    let cancel = CancelToken::new();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel_clone.cancel();
    });

    let err = plane
        .execute(
            "t",
            || {
                Box::pin(async {
                    Err::<serde_json::Value, aegis::BoxError>(Box::new(aegis::CallError::network(
                        "down",
                    )))
                })
            },
            ExecuteOptions::new()
                .max_attempts(10)
                .base_backoff(Duration::from_secs(10)),
            &cancel,
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Cancelled);
    assert_eq!(err.attempts, 1);
}
