//! Offline queue invariants: the bound holds and drain order is priority
//! descending, enqueue time ascending.

use aegis_core::ManualClock;
use aegis_fallback::OfflineQueues;
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn bound_holds_and_drain_order_is_stable(
        bound in 1usize..10,
        entries in prop::collection::vec((0i64..5, 0u64..5), 0..40),
    ) {
        let clock = ManualClock::new();
        let queues = OfflineQueues::new(Arc::new(clock.clone()));
        queues.register("t", bound);

        for (index, (priority, advance)) in entries.iter().enumerate() {
            clock.advance(Duration::from_millis(*advance));
            let ack = queues.enqueue("t", "write", json!(index), *priority).unwrap();
            prop_assert!(queues.len("t") <= bound);
            prop_assert!(ack.position >= 1);
            prop_assert!(ack.position <= ack.depth);
            prop_assert_eq!(ack.depth, queues.len("t"));
        }

        let mut drained = Vec::new();
        while let Some(entry) = queues.pop_next("t") {
            drained.push((entry.priority, entry.enqueued_at));
        }

        for pair in drained.windows(2) {
            let (p1, t1) = pair[0];
            let (p2, t2) = pair[1];
            prop_assert!(
                p1 > p2 || (p1 == p2 && t1 <= t2),
                "drain order violated: ({p1:?},{t1:?}) before ({p2:?},{t2:?})"
            );
        }
    }
}
