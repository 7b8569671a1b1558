//! The system mode controller.
//!
//! Derives the process-wide operating posture from per-tier health plus
//! operator overrides, drives the emergency tier gate, and evaluates
//! business-continuity rules once per monitor cycle.

use crate::events::ModeEvent;
use crate::rules::{ActionHandler, ContinuityRule};
use aegis_breaker::BreakerRegistry;
use aegis_core::{
    Clock, EventListener, EventListeners, ModeHandle, SystemHealthSnapshot, SystemMode, TierHealth,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::watch;

/// Per-tier healthy/total pairs fed into an evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierTallies {
    /// Critical tier.
    pub critical: TierHealth,
    /// Essential tier.
    pub essential: TierHealth,
    /// Standard tier.
    pub standard: TierHealth,
    /// Optional tier.
    pub optional: TierHealth,
}

impl TierTallies {
    fn all_critical_essential_healthy(&self) -> bool {
        self.critical.healthy == self.critical.total
            && self.essential.healthy == self.essential.total
    }
}

/// Mode derivation thresholds, in percent.
#[derive(Debug, Clone, Copy)]
pub struct ModeConfig {
    /// Below this critical-up percentage the system is in Emergency.
    pub emergency_threshold: f64,
    /// Below this critical-up percentage the system is Degraded.
    pub critical_threshold: f64,
    /// Below this essential-up percentage the system is Degraded.
    pub essential_threshold: f64,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            emergency_threshold: 40.0,
            critical_threshold: 80.0,
            essential_threshold: 60.0,
        }
    }
}

struct ModeState {
    mode: SystemMode,
    tallies: TierTallies,
    impact: f64,
    maintenance_reason: Option<String>,
    emergency_reason: Option<String>,
    emergency_activated_at: Option<Duration>,
    last_transition_at: Duration,
    forced_by_rule: Option<String>,
    recovery_healthy_cycles: u32,
}

/// Derives the system mode, owns overrides and continuity rules, and
/// broadcasts transitions over a watch channel.
pub struct ModeController {
    clock: Arc<dyn Clock>,
    registry: Arc<BreakerRegistry>,
    config: ModeConfig,
    state: Mutex<ModeState>,
    tx: watch::Sender<SystemMode>,
    listeners: RwLock<EventListeners<ModeEvent>>,
    rules: Mutex<Vec<ContinuityRule>>,
    actions: RwLock<HashMap<String, ActionHandler>>,
}

impl ModeController {
    /// Creates a controller in Normal mode.
    pub fn new(clock: Arc<dyn Clock>, registry: Arc<BreakerRegistry>, config: ModeConfig) -> Self {
        let (tx, _rx) = watch::channel(SystemMode::Normal);
        Self {
            clock,
            registry,
            config,
            state: Mutex::new(ModeState {
                mode: SystemMode::Normal,
                tallies: TierTallies::default(),
                impact: 0.0,
                maintenance_reason: None,
                emergency_reason: None,
                emergency_activated_at: None,
                last_transition_at: Duration::ZERO,
                forced_by_rule: None,
                recovery_healthy_cycles: 0,
            }),
            tx,
            listeners: RwLock::new(EventListeners::new()),
            rules: Mutex::new(Vec::new()),
            actions: RwLock::new(HashMap::new()),
        }
    }

    /// The current mode.
    pub fn mode(&self) -> SystemMode {
        *self.tx.borrow()
    }

    /// A read handle distributed to components that consult the mode.
    pub fn handle(&self) -> ModeHandle {
        ModeHandle::new(self.tx.subscribe())
    }

    /// Adds a controller event listener.
    pub fn add_listener<L>(&self, listener: L)
    where
        L: EventListener<ModeEvent> + 'static,
    {
        self.listeners.write().unwrap().add(listener);
    }

    /// Registers a continuity rule.
    pub fn add_rule(&self, rule: ContinuityRule) {
        let mut rules = self.rules.lock().unwrap();
        rules.push(rule);
        rules.sort_by_key(|rule| rule.priority);
    }

    /// Registers the handler behind an action identifier.
    pub fn register_action(&self, name: impl Into<String>, handler: ActionHandler) {
        self.actions.write().unwrap().insert(name.into(), handler);
    }

    /// Full evaluation at the end of a monitor cycle: ingest tallies,
    /// re-derive the mode, then run continuity rules against the fresh
    /// snapshot. Rules run at most once per cycle.
    pub fn evaluate_cycle(&self, tallies: TierTallies, impact: f64) -> SystemHealthSnapshot {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            state.tallies = tallies;
            state.impact = impact;

            if state.mode == SystemMode::Recovery {
                if tallies.all_critical_essential_healthy() {
                    state.recovery_healthy_cycles += 1;
                } else {
                    state.recovery_healthy_cycles = 0;
                }
            }

            let next = self.derive(&state);
            self.apply(&mut state, next, "health-thresholds", None);
            Self::build_snapshot(&state)
        };

        self.run_rules(&snapshot);
        self.snapshot()
    }

    /// Latest snapshot without re-probing anything.
    pub fn snapshot(&self) -> SystemHealthSnapshot {
        let state = self.state.lock().unwrap();
        Self::build_snapshot(&state)
    }

    /// Starts or ends an operator maintenance window. Idempotent.
    pub fn set_maintenance(&self, on: bool, reason: Option<String>) {
        let mut state = self.state.lock().unwrap();
        state.maintenance_reason = if on {
            Some(reason.unwrap_or_else(|| "maintenance".to_string()))
        } else {
            None
        };
        let cause = state
            .maintenance_reason
            .clone()
            .unwrap_or_else(|| "maintenance-ended".to_string());
        let next = self.derive(&state);
        self.apply(&mut state, next, &cause, None);
    }

    /// Sets the explicit emergency override.
    pub fn activate_emergency(&self, reason: impl Into<String>, by: Option<String>) {
        let reason = reason.into();
        let mut state = self.state.lock().unwrap();
        state.emergency_reason = Some(reason.clone());
        let next = self.derive(&state);
        self.apply(&mut state, next, &reason, by);
    }

    /// Clears the emergency override. The mode leaves Emergency through
    /// Recovery unless health thresholds still force otherwise.
    pub fn exit_emergency(&self, by: Option<String>) {
        let mut state = self.state.lock().unwrap();
        state.emergency_reason = None;
        let next = self.derive(&state);
        self.apply(&mut state, next, "emergency-exited", by);
    }

    /// Clock offset at which Emergency was last entered.
    pub fn emergency_activated_at(&self) -> Option<Duration> {
        self.state.lock().unwrap().emergency_activated_at
    }

    /// Mode derivation: first match wins, with the Recovery path
    /// special-cased between the emergency and degraded thresholds.
    fn derive(&self, state: &ModeState) -> SystemMode {
        let tallies = &state.tallies;
        let critical_pct = tallies.critical.ratio() * 100.0;
        let essential_pct = tallies.essential.ratio() * 100.0;

        if state.maintenance_reason.is_some() {
            return SystemMode::Maintenance;
        }
        if state.emergency_reason.is_some() {
            return SystemMode::Emergency;
        }
        if critical_pct < self.config.emergency_threshold {
            return SystemMode::Emergency;
        }

        if state.mode == SystemMode::Recovery {
            // Any critical failure during recovery reverts to Emergency.
            if tallies.critical.healthy < tallies.critical.total {
                return SystemMode::Emergency;
            }
            if tallies.all_critical_essential_healthy() && state.recovery_healthy_cycles >= 1 {
                return SystemMode::Normal;
            }
            return SystemMode::Recovery;
        }

        if critical_pct < self.config.critical_threshold
            || essential_pct < self.config.essential_threshold
        {
            return SystemMode::Degraded;
        }

        if state.mode == SystemMode::Emergency {
            return SystemMode::Recovery;
        }
        SystemMode::Normal
    }

    fn apply(&self, state: &mut ModeState, next: SystemMode, cause: &str, by: Option<String>) {
        if next == state.mode {
            return;
        }
        let from = state.mode;
        let now = self.clock.now();
        state.mode = next;
        state.last_transition_at = now;
        state.forced_by_rule = None;
        if next == SystemMode::Recovery {
            state.recovery_healthy_cycles = 0;
        }

        #[cfg(feature = "tracing")]
        tracing::info!(from = from.as_str(), to = next.as_str(), cause, "system mode transition");

        #[cfg(feature = "metrics")]
        {
            metrics::counter!(
                "aegis_mode_transitions_total",
                "from" => from.as_str(),
                "to" => next.as_str()
            )
            .increment(1);
            metrics::gauge!("aegis_system_mode").set(match next {
                SystemMode::Normal => 0.0,
                SystemMode::Degraded => 1.0,
                SystemMode::Emergency => 2.0,
                SystemMode::Maintenance => 3.0,
                SystemMode::Recovery => 4.0,
            });
        }

        self.tx.send_replace(next);

        let listeners = self.listeners.read().unwrap();
        listeners.emit(&ModeEvent::Changed {
            from,
            to: next,
            at: now,
        });

        if next == SystemMode::Emergency {
            state.emergency_activated_at = Some(now);
            self.registry.set_emergency_gate(true);
            listeners.emit(&ModeEvent::EmergencyActivated {
                reason: cause.to_string(),
                by: by.clone(),
                at: now,
            });
        }
        if from == SystemMode::Emergency {
            // The tier gate is lifted as Recovery begins.
            self.registry.set_emergency_gate(false);
            listeners.emit(&ModeEvent::EmergencyExited { by, at: now });
        }
    }

    fn run_rules(&self, snapshot: &SystemHealthSnapshot) {
        let rules: Vec<ContinuityRule> = self.rules.lock().unwrap().clone();

        for rule in rules {
            if !(rule.predicate)(snapshot) {
                continue;
            }

            #[cfg(feature = "tracing")]
            tracing::info!(rule = %rule.name, action = %rule.action, "continuity rule fired");

            if !rule.auto_execute {
                continue;
            }

            let handler = self.actions.read().unwrap().get(&rule.action).cloned();
            match handler {
                Some(handler) => {
                    let before = self.mode();
                    handler(snapshot);

                    self.listeners.read().unwrap().emit(&ModeEvent::RuleFired {
                        rule: rule.name.clone(),
                        action: rule.action.clone(),
                        at: self.clock.now(),
                    });

                    if self.mode() != before {
                        self.state.lock().unwrap().forced_by_rule = Some(rule.name.clone());
                    }
                }
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        rule = %rule.name,
                        action = %rule.action,
                        "continuity rule action is not registered"
                    );
                }
            }
        }
    }

    fn build_snapshot(state: &ModeState) -> SystemHealthSnapshot {
        SystemHealthSnapshot {
            critical: state.tallies.critical,
            essential: state.tallies.essential,
            standard: state.tallies.standard,
            optional: state.tallies.optional,
            mode: state.mode,
            last_transition_at: state.last_transition_at,
            forced_by_rule: state.forced_by_rule.clone(),
            impact_per_minute: state.impact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn controller() -> (Arc<BreakerRegistry>, ModeController) {
        let clock = Arc::new(ManualClock::new());
        let registry = Arc::new(BreakerRegistry::new(clock.clone()));
        let controller = ModeController::new(clock, Arc::clone(&registry), ModeConfig::default());
        (registry, controller)
    }

    fn tallies(critical: (usize, usize), essential: (usize, usize)) -> TierTallies {
        TierTallies {
            critical: TierHealth {
                healthy: critical.0,
                total: critical.1,
            },
            essential: TierHealth {
                healthy: essential.0,
                total: essential.1,
            },
            ..TierTallies::default()
        }
    }

    #[test]
    fn all_healthy_is_normal() {
        let (_registry, controller) = controller();
        let snapshot = controller.evaluate_cycle(tallies((3, 3), (2, 2)), 0.0);
        assert_eq!(snapshot.mode, SystemMode::Normal);
    }

    #[test]
    fn empty_tiers_count_as_fully_up() {
        let (_registry, controller) = controller();
        let snapshot = controller.evaluate_cycle(TierTallies::default(), 0.0);
        assert_eq!(snapshot.mode, SystemMode::Normal);
    }

    #[test]
    fn one_of_three_critical_down_is_degraded() {
        let (_registry, controller) = controller();
        // 66.7% < 80% threshold, above the 40% emergency threshold.
        let snapshot = controller.evaluate_cycle(tallies((2, 3), (2, 2)), 0.0);
        assert_eq!(snapshot.mode, SystemMode::Degraded);
    }

    #[test]
    fn essential_threshold_also_degrades() {
        let (_registry, controller) = controller();
        let snapshot = controller.evaluate_cycle(tallies((3, 3), (1, 2)), 0.0);
        assert_eq!(snapshot.mode, SystemMode::Degraded);
    }

    #[test]
    fn degraded_does_not_engage_the_tier_gate() {
        let (registry, controller) = controller();
        controller.evaluate_cycle(tallies((2, 3), (2, 2)), 0.0);
        assert!(!registry.emergency_gate());
    }

    #[test]
    fn critical_collapse_is_emergency() {
        let (registry, controller) = controller();
        let snapshot = controller.evaluate_cycle(tallies((1, 3), (2, 2)), 0.0);
        assert_eq!(snapshot.mode, SystemMode::Emergency);
        assert!(registry.emergency_gate());
    }

    #[test]
    fn maintenance_wins_over_everything() {
        let (_registry, controller) = controller();
        controller.set_maintenance(true, Some("planned window".into()));
        let snapshot = controller.evaluate_cycle(tallies((0, 3), (0, 2)), 0.0);
        assert_eq!(snapshot.mode, SystemMode::Maintenance);
    }

    #[test]
    fn maintenance_off_twice_is_a_no_op() {
        let (_registry, controller) = controller();
        controller.set_maintenance(false, None);
        let first = controller.snapshot();
        controller.set_maintenance(false, None);
        let second = controller.snapshot();
        assert_eq!(first.mode, second.mode);
        assert_eq!(first.last_transition_at, second.last_transition_at);
    }

    #[test]
    fn operator_emergency_and_recovery_path() {
        let (registry, controller) = controller();
        controller.evaluate_cycle(tallies((2, 2), (0, 0)), 0.0);

        controller.activate_emergency("drill", Some("ops".into()));
        assert_eq!(controller.mode(), SystemMode::Emergency);
        assert!(registry.emergency_gate());
        assert!(controller.emergency_activated_at().is_some());

        controller.exit_emergency(Some("ops".into()));
        assert_eq!(controller.mode(), SystemMode::Recovery);
        assert!(!registry.emergency_gate());

        // One full healthy cycle advances to Normal.
        let snapshot = controller.evaluate_cycle(tallies((2, 2), (0, 0)), 0.0);
        assert_eq!(snapshot.mode, SystemMode::Normal);
    }

    #[test]
    fn critical_refail_during_recovery_reverts_to_emergency() {
        let (_registry, controller) = controller();
        controller.evaluate_cycle(tallies((2, 2), (0, 0)), 0.0);
        controller.activate_emergency("drill", None);
        controller.exit_emergency(None);
        assert_eq!(controller.mode(), SystemMode::Recovery);

        let snapshot = controller.evaluate_cycle(tallies((1, 2), (0, 0)), 0.0);
        assert_eq!(snapshot.mode, SystemMode::Emergency);
    }

    #[test]
    fn recovery_waits_for_a_full_healthy_cycle() {
        let (_registry, controller) = controller();
        controller.activate_emergency("drill", None);
        controller.exit_emergency(None);
        assert_eq!(controller.mode(), SystemMode::Recovery);

        // Essential target still down: stays in Recovery.
        let snapshot = controller.evaluate_cycle(tallies((2, 2), (1, 2)), 0.0);
        assert_eq!(snapshot.mode, SystemMode::Recovery);

        let snapshot = controller.evaluate_cycle(tallies((2, 2), (2, 2)), 0.0);
        assert_eq!(snapshot.mode, SystemMode::Normal);
    }

    #[test]
    fn rules_fire_in_priority_order_once_per_cycle() {
        let (_registry, controller) = controller();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = Arc::clone(&order);
        controller.register_action(
            "notify",
            Arc::new(move |_snapshot| o1.lock().unwrap().push("notify")),
        );
        let o2 = Arc::clone(&order);
        controller.register_action(
            "page",
            Arc::new(move |_snapshot| o2.lock().unwrap().push("page")),
        );

        controller.add_rule(ContinuityRule::new(
            "critical_services_down",
            10,
            "notify",
            |snapshot| snapshot.critical_up_ratio() < 0.8,
        ));
        controller.add_rule(ContinuityRule::new(
            "page_oncall",
            5,
            "page",
            |snapshot| snapshot.critical_up_ratio() < 0.8,
        ));

        controller.evaluate_cycle(tallies((2, 3), (2, 2)), 0.0);
        assert_eq!(*order.lock().unwrap(), vec!["page", "notify"]);

        controller.evaluate_cycle(tallies((2, 3), (2, 2)), 0.0);
        assert_eq!(order.lock().unwrap().len(), 4);
    }

    #[test]
    fn manual_rules_do_not_dispatch() {
        let (_registry, controller) = controller();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        controller.register_action(
            "noop",
            Arc::new(move |_snapshot| {
                f.fetch_add(1, Ordering::SeqCst);
            }),
        );
        controller.add_rule(ContinuityRule::new("observed", 1, "noop", |_| true).manual());

        controller.evaluate_cycle(TierTallies::default(), 0.0);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn rule_forcing_a_mode_is_recorded() {
        let (_registry, controller) = controller();
        let controller = Arc::new(controller);

        let controller_for_action = Arc::clone(&controller);
        controller.register_action(
            "activateEmergencyMode",
            Arc::new(move |_snapshot| {
                controller_for_action.activate_emergency("rule-driven", None);
            }),
        );
        controller.add_rule(ContinuityRule::new(
            "critical_services_down",
            1,
            "activateEmergencyMode",
            |snapshot| snapshot.critical_up_ratio() < 0.8,
        ));

        let snapshot = controller.evaluate_cycle(tallies((2, 3), (2, 2)), 0.0);
        assert_eq!(snapshot.mode, SystemMode::Emergency);
        assert_eq!(
            snapshot.forced_by_rule.as_deref(),
            Some("critical_services_down")
        );
    }

    #[test]
    fn impact_is_reported_in_snapshots() {
        let (_registry, controller) = controller();
        let snapshot = controller.evaluate_cycle(tallies((2, 3), (2, 2)), 1250.0);
        assert_eq!(snapshot.impact_per_minute, 1250.0);
    }
}
