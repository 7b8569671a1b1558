//! The id-keyed breaker registry.

use crate::cell::{AdmitDecision, BreakerCell, BreakerSnapshot, BreakerState, Transition};
use crate::config::BreakerConfig;
use crate::events::BreakerEvent;
use crate::store::BreakerStore;
use aegis_core::{Clock, ErrorKind, EventListener, EventListeners, Tier};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Why an admission was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RejectReason {
    /// The breaker is open and its cooldown has not elapsed.
    Cooldown,
    /// The half-open probe budget is spent.
    ProbeBudgetExhausted,
    /// The system is in emergency mode and the target is not critical-tier.
    TierGated,
}

impl RejectReason {
    /// Stable label for events and caller-facing messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Cooldown => "cooldown",
            RejectReason::ProbeBudgetExhausted => "probe-budget-exhausted",
            RejectReason::TierGated => "tier-gated",
        }
    }

    /// The error kind an rejected admission surfaces as.
    pub fn error_kind(&self) -> ErrorKind {
        ErrorKind::CircuitOpen
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The admission decision for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The call may proceed; its outcome must be observed or released.
    Admitted,
    /// The call must not proceed.
    Rejected(RejectReason),
}

impl Admission {
    /// True when the call may proceed.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Outcome of an admitted call, reported back through
/// [`BreakerRegistry::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The call succeeded within the given latency.
    Success(Duration),
    /// The call failed with the given classified kind.
    Failure(ErrorKind),
}

struct Slot {
    tier: Mutex<Tier>,
    config: Mutex<Arc<BreakerConfig>>,
    cell: Mutex<BreakerCell>,
    state_atomic: AtomicU8,
}

impl Slot {
    fn config(&self) -> Arc<BreakerConfig> {
        Arc::clone(&self.config.lock().unwrap())
    }
}

/// One breaker state machine per registered target.
///
/// All transitions for a single target are serialized on that target's cell
/// lock, so concurrent observers see a linearizable transition sequence.
/// The registry itself never fails: admission returns a decision, and
/// persistence is best-effort.
pub struct BreakerRegistry {
    clock: Arc<dyn Clock>,
    slots: RwLock<HashMap<String, Arc<Slot>>>,
    emergency_gate: AtomicBool,
    listeners: EventListeners<BreakerEvent>,
    store: Option<Arc<dyn BreakerStore>>,
}

impl BreakerRegistry {
    /// Creates an empty registry.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            slots: RwLock::new(HashMap::new()),
            emergency_gate: AtomicBool::new(false),
            listeners: EventListeners::new(),
            store: None,
        }
    }

    /// Attaches a best-effort persistence store. Loaded state is applied at
    /// registration; transitions are written back. Store errors are logged
    /// and ignored: the in-memory state is authoritative.
    pub fn with_store(mut self, store: Arc<dyn BreakerStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Adds a registry-wide event listener.
    pub fn add_listener<L>(&mut self, listener: L)
    where
        L: EventListener<BreakerEvent> + 'static,
    {
        self.listeners.add(listener);
    }

    /// Registers a target, or updates its tier and config if it already
    /// exists. Re-registration leaves breaker state intact.
    pub fn register(&self, target: &str, tier: Tier, config: BreakerConfig) {
        let config = Arc::new(config);
        {
            let slots = self.slots.read().unwrap();
            if let Some(slot) = slots.get(target) {
                *slot.tier.lock().unwrap() = tier;
                *slot.config.lock().unwrap() = config;
                return;
            }
        }

        let now = self.clock.now();
        let mut cell = BreakerCell::new(now);
        if let Some(store) = &self.store {
            match store.load(target) {
                Ok(Some(persisted)) => cell.restore(&persisted, now),
                Ok(None) => {}
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(id = target, error = %_err, "breaker store load failed");
                }
            }
        }

        let slot = Arc::new(Slot {
            tier: Mutex::new(tier),
            state_atomic: AtomicU8::new(cell.state() as u8),
            config: Mutex::new(config),
            cell: Mutex::new(cell),
        });

        let mut slots = self.slots.write().unwrap();
        slots.entry(target.to_string()).or_insert(slot);
    }

    /// True when the target is registered.
    pub fn contains(&self, target: &str) -> bool {
        self.slots.read().unwrap().contains_key(target)
    }

    /// Registered target ids.
    pub fn target_ids(&self) -> Vec<String> {
        self.slots.read().unwrap().keys().cloned().collect()
    }

    /// The target's tier, if registered.
    pub fn tier(&self, target: &str) -> Option<Tier> {
        let slot = self.slot(target)?;
        let tier = *slot.tier.lock().unwrap();
        Some(tier)
    }

    /// The target's breaker config, if registered.
    pub fn config(&self, target: &str) -> Option<Arc<BreakerConfig>> {
        Some(self.slot(target)?.config())
    }

    /// Replaces the target's breaker config. Affects subsequent calls only.
    pub fn set_config(&self, target: &str, config: BreakerConfig) -> bool {
        match self.slot(target) {
            Some(slot) => {
                *slot.config.lock().unwrap() = Arc::new(config);
                true
            }
            None => false,
        }
    }

    /// Current state without touching the cell lock.
    pub fn state(&self, target: &str) -> Option<BreakerState> {
        let slot = self.slot(target)?;
        Some(BreakerState::from_u8(slot.state_atomic.load(Ordering::Acquire)))
    }

    /// Asks whether a call against the target may proceed now.
    ///
    /// Returns `None` for unregistered targets. An `Admitted` decision must
    /// be balanced by [`BreakerRegistry::observe`] or
    /// [`BreakerRegistry::release`].
    pub fn admit(&self, target: &str) -> Option<Admission> {
        let slot = self.slot(target)?;
        let now = self.clock.now();

        // Emergency tier gate: a pre-check that runs before the normal
        // admission logic and does not touch the breaker's counters.
        if self.emergency_gate.load(Ordering::Acquire) {
            let tier = *slot.tier.lock().unwrap();
            if tier != Tier::Critical {
                self.emit(
                    &slot,
                    BreakerEvent::CallRejected {
                        target: target.to_string(),
                        at: now,
                        reason: RejectReason::TierGated,
                    },
                );
                return Some(Admission::Rejected(RejectReason::TierGated));
            }
        }

        let config = slot.config();
        let (decision, transition) = {
            let mut cell = slot.cell.lock().unwrap();
            let result = cell.admit(&config, now);
            slot.state_atomic.store(cell.state() as u8, Ordering::Release);
            result
        };

        if let Some(transition) = transition {
            self.after_transition(target, &slot, &config, transition, now);
        }

        let admission = match decision {
            AdmitDecision::Admitted => Admission::Admitted,
            AdmitDecision::RejectedCooldown => Admission::Rejected(RejectReason::Cooldown),
            AdmitDecision::RejectedBudget => {
                Admission::Rejected(RejectReason::ProbeBudgetExhausted)
            }
        };

        if let Admission::Rejected(reason) = admission {
            #[cfg(feature = "metrics")]
            metrics::counter!(
                "aegis_breaker_rejections_total",
                "target" => target.to_string(),
                "reason" => reason.as_str()
            )
            .increment(1);

            self.emit(
                &slot,
                BreakerEvent::CallRejected {
                    target: target.to_string(),
                    at: now,
                    reason,
                },
            );
        }

        Some(admission)
    }

    /// Reports the outcome of an admitted call.
    pub fn observe(&self, target: &str, outcome: Outcome) {
        let Some(slot) = self.slot(target) else {
            return;
        };
        let now = self.clock.now();
        let config = slot.config();

        let transition = {
            let mut cell = slot.cell.lock().unwrap();
            let transition = match outcome {
                Outcome::Success(latency) => cell.observe_success(&config, latency, now),
                Outcome::Failure(kind) => cell.observe_failure(&config, kind, now),
            };
            slot.state_atomic.store(cell.state() as u8, Ordering::Release);
            transition
        };

        if let Some(transition) = transition {
            self.after_transition(target, &slot, &config, transition, now);
        }
    }

    /// Returns an admission without an outcome. Cancellation uses this so a
    /// cancelled call is never a breaker observation.
    pub fn release(&self, target: &str) {
        if let Some(slot) = self.slot(target) {
            slot.cell.lock().unwrap().release();
        }
    }

    /// Manually resets the breaker: closed, counters zeroed, deadline
    /// cleared. Emits a reset event. Idempotent.
    pub fn reset(&self, target: &str) -> bool {
        let Some(slot) = self.slot(target) else {
            return false;
        };
        let now = self.clock.now();
        let config = slot.config();

        {
            let mut cell = slot.cell.lock().unwrap();
            cell.reset(&config, now);
            slot.state_atomic.store(cell.state() as u8, Ordering::Release);
        }
        self.persist(target, &slot, now);

        self.emit(
            &slot,
            BreakerEvent::Reset {
                target: target.to_string(),
                at: now,
            },
        );
        true
    }

    /// Forces the breaker open, starting a cooldown.
    pub fn force_open(&self, target: &str) -> bool {
        self.forced(target, |cell, config, now| cell.force_open(config, now))
    }

    /// Forces the breaker closed.
    pub fn force_closed(&self, target: &str) -> bool {
        self.forced(target, |cell, config, now| cell.force_closed(config, now))
    }

    /// Pulls an open breaker's next-admission deadline to now. Used by the
    /// health monitor when a probe reports the target healthy again.
    pub fn nudge_half_open(&self, target: &str) {
        if let Some(slot) = self.slot(target) {
            let now = self.clock.now();
            slot.cell.lock().unwrap().nudge(now);
        }
    }

    /// Snapshot of one breaker.
    pub fn snapshot(&self, target: &str) -> Option<BreakerSnapshot> {
        let slot = self.slot(target)?;
        let cell = slot.cell.lock().unwrap();
        Some(cell.snapshot())
    }

    /// Snapshot of every registered breaker.
    pub fn snapshot_all(&self) -> HashMap<String, BreakerSnapshot> {
        let slots = self.slots.read().unwrap();
        slots
            .iter()
            .map(|(id, slot)| {
                let cell = slot.cell.lock().unwrap();
                (id.clone(), cell.snapshot())
            })
            .collect()
    }

    /// Engages or lifts the emergency tier gate.
    pub fn set_emergency_gate(&self, engaged: bool) {
        self.emergency_gate.store(engaged, Ordering::Release);

        #[cfg(feature = "tracing")]
        tracing::info!(engaged, "emergency tier gate");
    }

    /// Whether the emergency tier gate is engaged.
    pub fn emergency_gate(&self) -> bool {
        self.emergency_gate.load(Ordering::Acquire)
    }

    fn slot(&self, target: &str) -> Option<Arc<Slot>> {
        self.slots.read().unwrap().get(target).cloned()
    }

    fn forced<F>(&self, target: &str, f: F) -> bool
    where
        F: FnOnce(&mut BreakerCell, &BreakerConfig, Duration) -> Option<Transition>,
    {
        let Some(slot) = self.slot(target) else {
            return false;
        };
        let now = self.clock.now();
        let config = slot.config();

        let transition = {
            let mut cell = slot.cell.lock().unwrap();
            let transition = f(&mut cell, &config, now);
            slot.state_atomic.store(cell.state() as u8, Ordering::Release);
            transition
        };

        if let Some(transition) = transition {
            self.after_transition(target, &slot, &config, transition, now);
        }
        true
    }

    fn after_transition(
        &self,
        target: &str,
        slot: &Arc<Slot>,
        _config: &BreakerConfig,
        transition: Transition,
        now: Duration,
    ) {
        #[cfg(feature = "tracing")]
        tracing::info!(
            id = target,
            from = transition.from.as_str(),
            to = transition.to.as_str(),
            "breaker state transition"
        );

        #[cfg(feature = "metrics")]
        {
            metrics::counter!(
                "aegis_breaker_transitions_total",
                "target" => target.to_string(),
                "from" => transition.from.as_str(),
                "to" => transition.to.as_str()
            )
            .increment(1);
            metrics::gauge!(
                "aegis_breaker_state",
                "target" => target.to_string()
            )
            .set(transition.to as u8 as f64);
        }

        self.persist(target, slot, now);

        let event = match transition.to {
            BreakerState::Open => BreakerEvent::Opened {
                target: target.to_string(),
                at: now,
            },
            BreakerState::Closed => BreakerEvent::Closed {
                target: target.to_string(),
                at: now,
            },
            BreakerState::HalfOpen => BreakerEvent::HalfOpened {
                target: target.to_string(),
                at: now,
            },
        };
        self.emit(slot, event);
    }

    fn emit(&self, slot: &Arc<Slot>, event: BreakerEvent) {
        slot.config().listeners.emit(&event);
        self.listeners.emit(&event);
    }

    fn persist(&self, target: &str, slot: &Arc<Slot>, now: Duration) {
        if let Some(store) = &self.store {
            let persisted = {
                let cell = slot.cell.lock().unwrap();
                cell.persisted(now)
            };
            if let Err(_err) = store.save(target, &persisted) {
                #[cfg(feature = "tracing")]
                tracing::warn!(id = target, error = %_err, "breaker store save failed");
            }
        }
    }
}
