//! System mode is a pure function of the health snapshot plus overrides.

use aegis_breaker::BreakerRegistry;
use aegis_core::{ManualClock, SystemMode, TierHealth};
use aegis_monitor::{ModeConfig, ModeController, TierTallies};
use proptest::prelude::*;
use std::sync::Arc;

fn controller() -> ModeController {
    let clock = Arc::new(ManualClock::new());
    let registry = Arc::new(BreakerRegistry::new(clock.clone()));
    ModeController::new(clock, registry, ModeConfig::default())
}

fn tier(healthy: usize, total: usize) -> TierHealth {
    TierHealth {
        healthy: healthy.min(total),
        total,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn mode_is_a_pure_function_of_inputs(
        critical in (0usize..6, 0usize..6),
        essential in (0usize..6, 0usize..6),
        maintenance in any::<bool>(),
        emergency in any::<bool>(),
    ) {
        let tallies = TierTallies {
            critical: tier(critical.0, critical.1),
            essential: tier(essential.0, essential.1),
            ..TierTallies::default()
        };

        let run = || {
            let controller = controller();
            if maintenance {
                controller.set_maintenance(true, Some("window".into()));
            }
            if emergency {
                controller.activate_emergency("override", None);
            }
            controller.evaluate_cycle(tallies, 0.0).mode
        };

        let first = run();
        let second = run();
        prop_assert_eq!(first, second);

        // And the precedence rules hold.
        if maintenance {
            prop_assert_eq!(first, SystemMode::Maintenance);
        } else if emergency {
            prop_assert_eq!(first, SystemMode::Emergency);
        } else if tallies.critical.ratio() * 100.0 < 40.0 {
            prop_assert_eq!(first, SystemMode::Emergency);
        } else if tallies.critical.ratio() * 100.0 < 80.0
            || tallies.essential.ratio() * 100.0 < 60.0
        {
            prop_assert_eq!(first, SystemMode::Degraded);
        } else {
            prop_assert_eq!(first, SystemMode::Normal);
        }
    }
}
