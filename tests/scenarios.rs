//! End-to-end scenarios driven through the assembled control plane.

use aegis::{
    CancelToken, CallError, ContinuityRule, ControlPlane, ErrorKind, ExecuteOptions,
    StrategyKind, StrategySpec, SystemMode, TargetSpec, Tier,
};
use aegis_breaker::{BreakerConfig, BreakerState};
use aegis_core::BoxError;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn remote_unavailable() -> BoxError {
    Box::new(CallError::remote_unavailable("remote is down"))
}

fn network_error() -> BoxError {
    Box::new(CallError::network("connection reset"))
}

/// S1 — Trip and recover: three failures open the breaker, the cooldown
/// rejects, and a full half-open budget of successes closes it again.
#[tokio::test(start_paused = true)]
async fn s1_trip_and_recover() {
    let plane = ControlPlane::builder().build();
    plane
        .register_target(
            "s1",
            TargetSpec::builder(Tier::Standard)
                .breaker(
                    BreakerConfig::builder()
                        .failure_threshold(3)
                        .cooldown(Duration::from_millis(100))
                        .half_open_budget(2)
                        .build()
                        .unwrap(),
                )
                .build()
                .unwrap(),
        )
        .unwrap();

    let invocations = Arc::new(AtomicUsize::new(0));
    let cancel = CancelToken::new();

    let failing_op = |invocations: Arc<AtomicUsize>| {
        move || {
            let invocations = Arc::clone(&invocations);
            Box::pin(async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                Err::<serde_json::Value, _>(network_error())
            }) as futures::future::BoxFuture<'static, _>
        }
    };

    for _ in 0..3 {
        let err = plane
            .execute(
                "s1",
                failing_op(Arc::clone(&invocations)),
                ExecuteOptions::new().max_attempts(1),
                &cancel,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Network);
    }
    assert_eq!(plane.breaker_state("s1"), Some(BreakerState::Open));

    // At t+50 ms the cooldown has not elapsed: rejected without invoking
    // the operation.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let err = plane
        .execute(
            "s1",
            failing_op(Arc::clone(&invocations)),
            ExecuteOptions::new().max_attempts(1),
            &cancel,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::CircuitOpen);
    assert_eq!(invocations.load(Ordering::SeqCst), 3);

    // At t+150 ms two probe successes close the breaker.
    tokio::time::sleep(Duration::from_millis(100)).await;
    for _ in 0..2 {
        let invocations = Arc::clone(&invocations);
        let outcome = plane
            .execute(
                "s1",
                move || {
                    let invocations = Arc::clone(&invocations);
                    Box::pin(async move {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        Ok(json!("probe-ok"))
                    })
                },
                ExecuteOptions::new().max_attempts(1),
                &cancel,
            )
            .await
            .unwrap();
        assert!(!outcome.is_fallback());
    }

    assert_eq!(plane.breaker_state("s1"), Some(BreakerState::Closed));
    assert_eq!(invocations.load(Ordering::SeqCst), 5);

    let metrics = plane.metrics();
    let stats = metrics.targets["s1"].stats.as_ref().unwrap();
    assert_eq!(stats.total, 5);
    assert!((stats.failure_rate - 3.0 / 5.0).abs() < 1e-9);
}

/// S2 — Cache fallback on timeout: the pre-emptive lookup serves the
/// cached value without invoking the slow operation or touching the
/// breaker.
#[tokio::test(start_paused = true)]
async fn s2_cache_fallback_on_timeout() {
    let plane = ControlPlane::builder().build();
    plane
        .register_target(
            "s2",
            TargetSpec::builder(Tier::Standard)
                .breaker(
                    BreakerConfig::builder()
                        .failure_threshold(1)
                        .call_timeout(Duration::from_millis(10))
                        .build()
                        .unwrap(),
                )
                .cacheable_tag("read")
                .fallback_chain(vec![StrategySpec::CachedResponse])
                .build()
                .unwrap(),
        )
        .unwrap();

    plane.cache_for("s2", "k", json!("v0"), Duration::from_secs(1));

    let invocations = Arc::new(AtomicUsize::new(0));
    let invocations_clone = Arc::clone(&invocations);
    let cancel = CancelToken::new();

    let outcome = plane
        .execute(
            "s2",
            move || {
                let invocations = Arc::clone(&invocations_clone);
                Box::pin(async move {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(json!("slow"))
                })
            },
            ExecuteOptions::new()
                .max_attempts(1)
                .operation_tag("read")
                .cache_key("k"),
            &cancel,
        )
        .await
        .unwrap();

    assert_eq!(outcome.strategy(), Some(StrategyKind::CachedResponse));
    assert_eq!(outcome.value(), &json!("v0"));
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
    assert_eq!(plane.breaker_state("s2"), Some(BreakerState::Closed));
}

/// S3 — Retry with jitter-free backoff: two network failures, then
/// success, with the configured exponential gaps in between.
#[tokio::test(start_paused = true)]
async fn s3_retry_with_backoff() {
    let plane = ControlPlane::builder().build();
    plane
        .register_target(
            "s3",
            TargetSpec::builder(Tier::Standard)
                .breaker(
                    BreakerConfig::builder()
                        .failure_threshold(10)
                        .build()
                        .unwrap(),
                )
                .build()
                .unwrap(),
        )
        .unwrap();

    let timestamps = Arc::new(Mutex::new(Vec::new()));
    let attempts = Arc::new(AtomicUsize::new(0));
    let cancel = CancelToken::new();

    let timestamps_clone = Arc::clone(&timestamps);
    let attempts_clone = Arc::clone(&attempts);
    let outcome = plane
        .execute(
            "s3",
            move || {
                let timestamps = Arc::clone(&timestamps_clone);
                let attempts = Arc::clone(&attempts_clone);
                Box::pin(async move {
                    timestamps.lock().unwrap().push(tokio::time::Instant::now());
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(network_error())
                    } else {
                        Ok(json!("third-time-lucky"))
                    }
                })
            },
            ExecuteOptions::new()
                .max_attempts(3)
                .base_backoff(Duration::from_millis(10))
                .backoff_growth(2.0)
                .retry_on([ErrorKind::Network]),
            &cancel,
        )
        .await
        .unwrap();

    assert!(!outcome.is_fallback());
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    let timestamps = timestamps.lock().unwrap();
    assert_eq!(timestamps.len(), 3);
    assert!(timestamps[1] - timestamps[0] >= Duration::from_millis(10));
    assert!(timestamps[2] - timestamps[1] >= Duration::from_millis(20));

    let snap = plane.metrics();
    let breaker = &snap.targets["s3"].breaker;
    assert_eq!(breaker.state, BreakerState::Closed);
    assert_eq!(breaker.consecutive_failures, 1);
}

/// S4 — Tier-gated emergency: operator-activated Emergency rejects
/// standard-tier admissions with a tier-gate reason, admits critical-tier
/// calls normally, and recovers to Normal after one healthy cycle.
#[tokio::test(start_paused = true)]
async fn s4_tier_gated_emergency() {
    let plane = ControlPlane::builder().build();
    for id in ["core-db", "payments"] {
        plane
            .register_target(id, TargetSpec::builder(Tier::Critical).build().unwrap())
            .unwrap();
    }
    plane
        .register_target("search", TargetSpec::builder(Tier::Standard).build().unwrap())
        .unwrap();

    plane.activate_emergency("drill", Some("ops".into()));
    assert_eq!(plane.system_health().mode, SystemMode::Emergency);

    let cancel = CancelToken::new();
    let err = plane
        .execute(
            "search",
            || Box::pin(async { Ok(json!("unreachable")) }),
            ExecuteOptions::new(),
            &cancel,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::CircuitOpen);
    assert!(err.message.contains("tier-gated"));
    assert_eq!(err.attempts, 0);

    let outcome = plane
        .execute(
            "core-db",
            || Box::pin(async { Ok(json!("critical-ok")) }),
            ExecuteOptions::new(),
            &cancel,
        )
        .await
        .unwrap();
    assert!(!outcome.is_fallback());

    plane.exit_emergency(Some("ops".into()));
    assert_eq!(plane.mode(), SystemMode::Recovery);

    // Standard-tier admissions work again as soon as Recovery begins.
    plane
        .execute(
            "search",
            || Box::pin(async { Ok(json!("back")) }),
            ExecuteOptions::new(),
            &cancel,
        )
        .await
        .unwrap();

    let snapshot = plane.run_monitor_cycle().await;
    assert_eq!(snapshot.mode, SystemMode::Normal);
}

/// S5 — Degraded mode by threshold: one of three critical targets down
/// puts the system in Degraded without gating admissions, and the
/// continuity rule fires its action.
#[tokio::test(start_paused = true)]
async fn s5_degraded_by_threshold() {
    let plane = ControlPlane::builder().build();
    for id in ["db-a", "db-b", "db-c"] {
        plane
            .register_target(
                id,
                TargetSpec::builder(Tier::Critical)
                    .breaker(
                        BreakerConfig::builder()
                            .failure_threshold(1)
                            .cooldown(Duration::from_secs(3600))
                            .build()
                            .unwrap(),
                    )
                    .build()
                    .unwrap(),
            )
            .unwrap();
    }

    let dispatched = Arc::new(AtomicUsize::new(0));
    let dispatched_clone = Arc::clone(&dispatched);
    plane.register_action(
        "notifyOperations",
        Arc::new(move |_snapshot| {
            dispatched_clone.fetch_add(1, Ordering::SeqCst);
        }),
    );
    plane.add_continuity_rule(ContinuityRule::new(
        "critical_services_down",
        1,
        "notifyOperations",
        |snapshot| snapshot.critical_up_ratio() < 0.8,
    ));

    // Trip one critical breaker.
    let cancel = CancelToken::new();
    let _ = plane
        .execute(
            "db-c",
            || Box::pin(async { Err(remote_unavailable()) }),
            ExecuteOptions::new().max_attempts(1),
            &cancel,
        )
        .await;
    assert_eq!(plane.breaker_state("db-c"), Some(BreakerState::Open));

    let snapshot = plane.run_monitor_cycle().await;
    assert_eq!(snapshot.mode, SystemMode::Degraded);
    assert_eq!(snapshot.critical.healthy, 2);
    assert_eq!(snapshot.critical.total, 3);
    assert_eq!(dispatched.load(Ordering::SeqCst), 1);

    // Degraded does not gate admissions on healthy targets.
    plane
        .execute(
            "db-a",
            || Box::pin(async { Ok(json!("fine")) }),
            ExecuteOptions::new(),
            &cancel,
        )
        .await
        .unwrap();
}

/// S6 — Queue-delayed write: a failing write is queued with an
/// acknowledgement, then drained by the monitor once the target is
/// reachable again.
#[tokio::test(start_paused = true)]
async fn s6_queue_delayed_write() {
    let plane = ControlPlane::builder().build();
    plane
        .register_target(
            "orders-db",
            TargetSpec::builder(Tier::Essential)
                .breaker(
                    BreakerConfig::builder()
                        .failure_threshold(5)
                        .build()
                        .unwrap(),
                )
                .fallback_chain(vec![StrategySpec::QueueDelayed])
                .queue_bound(100)
                .build()
                .unwrap(),
        )
        .unwrap();

    let cancel = CancelToken::new();
    let outcome = plane
        .execute(
            "orders-db",
            || Box::pin(async { Err(remote_unavailable()) }),
            ExecuteOptions::new()
                .max_attempts(2)
                .base_backoff(Duration::from_millis(1))
                .operation_tag("write-order")
                .payload(json!({"order": 42}))
                .write_operation(),
            &cancel,
        )
        .await
        .unwrap();

    assert_eq!(outcome.strategy(), Some(StrategyKind::QueueDelayed));
    assert_eq!(outcome.value()["queue_position"], json!(1));
    assert_eq!(plane.queue_len("orders-db"), 1);

    let redelivered = Arc::new(AtomicUsize::new(0));
    let redelivered_clone = Arc::clone(&redelivered);
    plane.set_redelivery_handler(
        "orders-db",
        Arc::new(move |entry| {
            let redelivered = Arc::clone(&redelivered_clone);
            Box::pin(async move {
                assert_eq!(entry.payload, json!({"order": 42}));
                assert_eq!(entry.operation_tag, "write-order");
                redelivered.fetch_add(1, Ordering::SeqCst);
                Ok(json!("written"))
            })
        }),
    );

    plane.run_monitor_cycle().await;
    assert_eq!(redelivered.load(Ordering::SeqCst), 1);
    assert_eq!(plane.queue_len("orders-db"), 0);
}
