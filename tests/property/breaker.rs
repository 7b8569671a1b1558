//! The breaker tracks the deterministic transition function for any event
//! sequence.

use aegis_breaker::{Admission, BreakerConfig, BreakerRegistry, BreakerState, Outcome};
use aegis_core::{Clock, ErrorKind, ManualClock};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
enum Event {
    Admit,
    ObserveSuccess,
    ObserveFailure,
    Advance(u64),
}

/// Reference implementation of the transition function from the breaker's
/// contract, with no shared-state machinery.
struct Model {
    threshold: u32,
    cooldown: Duration,
    budget: u32,
    state: ModelState,
}

enum ModelState {
    Closed { consecutive: u32 },
    Open { until: Duration },
    HalfOpen { remaining: u32, successes: u32 },
}

impl Model {
    fn new(threshold: u32, cooldown: Duration, budget: u32) -> Self {
        Self {
            threshold,
            cooldown,
            budget,
            state: ModelState::Closed { consecutive: 0 },
        }
    }

    fn state(&self) -> BreakerState {
        match self.state {
            ModelState::Closed { .. } => BreakerState::Closed,
            ModelState::Open { .. } => BreakerState::Open,
            ModelState::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }

    fn admit(&mut self, now: Duration) -> bool {
        match &mut self.state {
            ModelState::Closed { .. } => true,
            ModelState::Open { until } => {
                if now >= *until {
                    self.state = ModelState::HalfOpen {
                        remaining: self.budget - 1,
                        successes: 0,
                    };
                    true
                } else {
                    false
                }
            }
            ModelState::HalfOpen { remaining, .. } => {
                if *remaining > 0 {
                    *remaining -= 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn observe_success(&mut self) {
        match &mut self.state {
            ModelState::Closed { consecutive } => {
                *consecutive = consecutive.saturating_sub(1);
            }
            ModelState::HalfOpen { successes, .. } => {
                *successes += 1;
                if *successes >= self.budget {
                    self.state = ModelState::Closed { consecutive: 0 };
                }
            }
            ModelState::Open { .. } => {}
        }
    }

    fn observe_failure(&mut self, now: Duration) {
        match &mut self.state {
            ModelState::Closed { consecutive } => {
                *consecutive += 1;
                if *consecutive >= self.threshold {
                    self.state = ModelState::Open {
                        until: now + self.cooldown,
                    };
                }
            }
            ModelState::HalfOpen { .. } => {
                self.state = ModelState::Open {
                    until: now + self.cooldown,
                };
            }
            ModelState::Open { .. } => {}
        }
    }
}

fn event_strategy() -> impl Strategy<Value = Event> {
    prop_oneof![
        Just(Event::Admit),
        Just(Event::ObserveSuccess),
        Just(Event::ObserveFailure),
        (0u64..150).prop_map(Event::Advance),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn breaker_matches_reference_model(
        threshold in 1u32..5,
        cooldown_ms in 0u64..200,
        budget in 1u32..4,
        events in prop::collection::vec(event_strategy(), 0..60),
    ) {
        let clock = ManualClock::new();
        let registry = BreakerRegistry::new(Arc::new(clock.clone()));
        let cooldown = Duration::from_millis(cooldown_ms);
        registry.register(
            "t",
            aegis_core::Tier::Standard,
            BreakerConfig::builder()
                .failure_threshold(threshold)
                .cooldown(cooldown)
                .half_open_budget(budget)
                .build()
                .unwrap(),
        );
        let mut model = Model::new(threshold, cooldown, budget);

        for event in events {
            match event {
                Event::Admit => {
                    let expected = model.admit(clock.now());
                    let actual = matches!(registry.admit("t"), Some(Admission::Admitted));
                    prop_assert_eq!(expected, actual, "admit decision diverged");
                }
                Event::ObserveSuccess => {
                    model.observe_success();
                    registry.observe("t", Outcome::Success(Duration::from_millis(1)));
                }
                Event::ObserveFailure => {
                    model.observe_failure(clock.now());
                    registry.observe("t", Outcome::Failure(ErrorKind::Network));
                }
                Event::Advance(ms) => clock.advance(Duration::from_millis(ms)),
            }
            prop_assert_eq!(model.state(), registry.state("t").unwrap(), "state diverged");
        }
    }

    #[test]
    fn request_accounting_always_balances(
        events in prop::collection::vec(event_strategy(), 0..60),
    ) {
        let clock = ManualClock::new();
        let registry = BreakerRegistry::new(Arc::new(clock.clone()));
        registry.register(
            "t",
            aegis_core::Tier::Standard,
            BreakerConfig::builder().failure_threshold(3).build().unwrap(),
        );

        let mut outstanding: u64 = 0;
        for event in events {
            match event {
                Event::Admit => {
                    if matches!(registry.admit("t"), Some(Admission::Admitted)) {
                        outstanding += 1;
                    }
                }
                Event::ObserveSuccess if outstanding > 0 => {
                    outstanding -= 1;
                    registry.observe("t", Outcome::Success(Duration::from_millis(1)));
                }
                Event::ObserveFailure if outstanding > 0 => {
                    outstanding -= 1;
                    registry.observe("t", Outcome::Failure(ErrorKind::Network));
                }
                Event::Advance(ms) => clock.advance(Duration::from_millis(ms)),
                _ => {}
            }

            let snap = registry.snapshot("t").unwrap();
            prop_assert_eq!(
                snap.total_requests,
                snap.total_successes + snap.total_failures + snap.in_flight
            );
            prop_assert_eq!(snap.in_flight, outstanding);
        }
    }
}
