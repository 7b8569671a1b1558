//! Retry invariants: without retryable kinds the operation runs exactly
//! once, and invocations never exceed `max_attempts`.

use aegis::{CancelToken, CallError, ControlPlane, ExecuteOptions, TargetSpec, Tier};
use aegis_breaker::BreakerConfig;
use aegis_core::BoxError;
use proptest::prelude::*;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn plane_with_target() -> ControlPlane {
    let plane = ControlPlane::builder().build();
    plane
        .register_target(
            "t",
            TargetSpec::builder(Tier::Standard)
                .breaker(
                    BreakerConfig::builder()
                        .failure_threshold(u32::MAX)
                        .build()
                        .unwrap(),
                )
                .build()
                .unwrap(),
        )
        .unwrap();
    plane
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn no_retryable_kinds_means_exactly_one_invocation(max_attempts in 1u32..6) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let plane = plane_with_target();
            let invocations = Arc::new(AtomicUsize::new(0));
            let invocations_clone = Arc::clone(&invocations);
            let cancel = CancelToken::new();

            let _ = plane
                .execute(
                    "t",
                    move || {
                        invocations_clone.fetch_add(1, Ordering::SeqCst);
                        Box::pin(async {
                            Err::<Value, BoxError>(Box::new(CallError::network("down")))
                        })
                    },
                    ExecuteOptions::new()
                        .max_attempts(max_attempts)
                        .retry_on([])
                        .base_backoff(Duration::from_millis(1)),
                    &cancel,
                )
                .await;

            assert_eq!(invocations.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn invocations_never_exceed_max_attempts(
        max_attempts in 1u32..6,
        succeed_after in 0usize..8,
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let plane = plane_with_target();
            let invocations = Arc::new(AtomicUsize::new(0));
            let invocations_clone = Arc::clone(&invocations);
            let cancel = CancelToken::new();

            let _ = plane
                .execute(
                    "t",
                    move || {
                        let count = invocations_clone.fetch_add(1, Ordering::SeqCst);
                        Box::pin(async move {
                            if count < succeed_after {
                                Err::<Value, BoxError>(Box::new(CallError::network("down")))
                            } else {
                                Ok(serde_json::json!("ok"))
                            }
                        })
                    },
                    ExecuteOptions::new()
                        .max_attempts(max_attempts)
                        .base_backoff(Duration::from_millis(1)),
                    &cancel,
                )
                .await;

            assert!(invocations.load(Ordering::SeqCst) <= max_attempts as usize);
        });
    }
}
