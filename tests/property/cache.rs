//! TTL law: a cached value is served strictly inside its TTL and never at
//! or past it.

use aegis_core::{Clock, ManualClock};
use aegis_fallback::ResponseCache;
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn get_respects_ttl(
        ttl_ms in 1u64..500,
        advances in prop::collection::vec(0u64..200, 1..10),
    ) {
        let clock = ManualClock::new();
        let cache = ResponseCache::new(Arc::new(clock.clone()), 16);

        let inserted_at = clock.now();
        cache.put("t", "k", json!("v"), Duration::from_millis(ttl_ms));

        for advance in advances {
            clock.advance(Duration::from_millis(advance));
            let elapsed = clock.now() - inserted_at;
            let fresh = elapsed < Duration::from_millis(ttl_ms);
            prop_assert_eq!(cache.get("t", "k").is_some(), fresh);
            if !fresh {
                // Expired entries are deleted at the point of read.
                prop_assert_eq!(cache.len(), 0);
                break;
            }
        }
    }

    #[test]
    fn bound_is_never_exceeded(
        capacity in 1usize..8,
        keys in prop::collection::vec("[a-d]{1,2}", 1..40),
    ) {
        let clock = ManualClock::new();
        let cache = ResponseCache::new(Arc::new(clock.clone()), capacity);

        for (index, key) in keys.iter().enumerate() {
            cache.put("t", key, json!(index), Duration::from_secs(10));
            prop_assert!(cache.len() <= capacity);
        }
    }
}
