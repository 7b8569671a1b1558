//! The per-target breaker state machine.

use crate::config::BreakerConfig;
use aegis_core::ErrorKind;
use std::time::Duration;

/// State of one breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum BreakerState {
    /// Calls are admitted.
    Closed = 0,
    /// Calls are rejected until the cooldown deadline.
    Open = 1,
    /// A bounded budget of probe calls is admitted.
    HalfOpen = 2,
}

impl BreakerState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => BreakerState::Open,
            2 => BreakerState::HalfOpen,
            _ => BreakerState::Closed,
        }
    }

    /// Stable label for metrics and events.
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half-open",
        }
    }
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BreakerSnapshot {
    /// Current state.
    pub state: BreakerState,
    /// Consecutive failures counted in the closed state.
    pub consecutive_failures: u32,
    /// Admissions granted over the breaker's lifetime.
    pub total_requests: u64,
    /// Successful observations.
    pub total_successes: u64,
    /// Failed observations.
    pub total_failures: u64,
    /// Admissions not yet observed.
    pub in_flight: u64,
    /// Clock offset at which an open breaker next admits, if open.
    pub next_admission_at: Option<Duration>,
    /// Clock offset of the last observed success.
    pub last_success_at: Option<Duration>,
    /// Clock offset of the last observed failure.
    pub last_failure_at: Option<Duration>,
    /// Clock offset of the last state transition.
    pub last_transition_at: Duration,
}

/// A state transition taken by the cell, reported to the registry so it can
/// emit events and persist state outside the state-machine logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Transition {
    pub from: BreakerState,
    pub to: BreakerState,
}

/// Outcome of an admission request against the cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AdmitDecision {
    Admitted,
    RejectedCooldown,
    RejectedBudget,
}

#[derive(Debug)]
pub(crate) struct BreakerCell {
    state: BreakerState,
    consecutive_failures: u32,
    total_requests: u64,
    total_successes: u64,
    total_failures: u64,
    in_flight: u64,
    next_admission_at: Option<Duration>,
    last_success_at: Option<Duration>,
    last_failure_at: Option<Duration>,
    half_open_remaining: u32,
    half_open_successes: u32,
    last_transition_at: Duration,
}

impl BreakerCell {
    pub(crate) fn new(now: Duration) -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            total_requests: 0,
            total_successes: 0,
            total_failures: 0,
            in_flight: 0,
            next_admission_at: None,
            last_success_at: None,
            last_failure_at: None,
            half_open_remaining: 0,
            half_open_successes: 0,
            last_transition_at: now,
        }
    }

    pub(crate) fn state(&self) -> BreakerState {
        self.state
    }

    /// Applies persisted state loaded at registration. Half-open is
    /// restored as an immediately probe-eligible open breaker.
    pub(crate) fn restore(&mut self, persisted: &crate::store::PersistedBreaker, now: Duration) {
        self.consecutive_failures = persisted.consecutive_failures;
        match persisted.state {
            BreakerState::Closed => {}
            BreakerState::Open | BreakerState::HalfOpen => {
                self.state = BreakerState::Open;
                self.next_admission_at =
                    Some(now + persisted.cooldown_remaining.unwrap_or(Duration::ZERO));
                self.last_transition_at = now;
            }
        }
    }

    pub(crate) fn persisted(&self, now: Duration) -> crate::store::PersistedBreaker {
        crate::store::PersistedBreaker {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            cooldown_remaining: self
                .next_admission_at
                .map(|at| at.saturating_sub(now)),
        }
    }

    /// The admission decision. At most one caller performs the
    /// open-to-half-open transition; the registry serializes callers on the
    /// cell lock.
    pub(crate) fn admit(
        &mut self,
        config: &BreakerConfig,
        now: Duration,
    ) -> (AdmitDecision, Option<Transition>) {
        match self.state {
            BreakerState::Closed => {
                self.count_admission();
                (AdmitDecision::Admitted, None)
            }
            BreakerState::Open => {
                let due = self.next_admission_at.map_or(true, |at| now >= at);
                if due {
                    let transition = self.transition_to(BreakerState::HalfOpen, config, now);
                    // The winning admission consumes the first probe slot.
                    self.half_open_remaining = self.half_open_remaining.saturating_sub(1);
                    self.count_admission();
                    (AdmitDecision::Admitted, transition)
                } else {
                    (AdmitDecision::RejectedCooldown, None)
                }
            }
            BreakerState::HalfOpen => {
                if self.half_open_remaining > 0 {
                    self.half_open_remaining -= 1;
                    self.count_admission();
                    (AdmitDecision::Admitted, None)
                } else {
                    (AdmitDecision::RejectedBudget, None)
                }
            }
        }
    }

    pub(crate) fn observe_success(
        &mut self,
        config: &BreakerConfig,
        latency: Duration,
        now: Duration,
    ) -> Option<Transition> {
        let _ = latency;
        self.in_flight = self.in_flight.saturating_sub(1);
        self.total_successes += 1;
        self.last_success_at = Some(now);

        match self.state {
            BreakerState::Closed => {
                // Gentle decay rather than reset, to dampen flapping.
                self.consecutive_failures = self.consecutive_failures.saturating_sub(1);
                None
            }
            BreakerState::HalfOpen => {
                self.half_open_successes += 1;
                if self.half_open_successes >= config.half_open_budget {
                    self.transition_to(BreakerState::Closed, config, now)
                } else {
                    None
                }
            }
            // A late observation from before a forced transition; counters
            // only.
            BreakerState::Open => None,
        }
    }

    pub(crate) fn observe_failure(
        &mut self,
        config: &BreakerConfig,
        kind: ErrorKind,
        now: Duration,
    ) -> Option<Transition> {
        let _ = kind;
        self.in_flight = self.in_flight.saturating_sub(1);
        self.total_failures += 1;
        self.last_failure_at = Some(now);

        match self.state {
            BreakerState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= config.failure_threshold {
                    self.transition_to(BreakerState::Open, config, now)
                } else {
                    None
                }
            }
            BreakerState::HalfOpen => self.transition_to(BreakerState::Open, config, now),
            BreakerState::Open => None,
        }
    }

    /// Returns an admission without an outcome. Used by cancellation, which
    /// must not count as a breaker observation.
    pub(crate) fn release(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.total_requests = self.total_requests.saturating_sub(1);
    }

    /// Manual reset: closed, all counters zeroed, deadline cleared.
    pub(crate) fn reset(&mut self, config: &BreakerConfig, now: Duration) -> Option<Transition> {
        let transition = self.transition_to(BreakerState::Closed, config, now);
        self.consecutive_failures = 0;
        self.total_requests = 0;
        self.total_successes = 0;
        self.total_failures = 0;
        self.in_flight = 0;
        self.next_admission_at = None;
        self.last_success_at = None;
        self.last_failure_at = None;
        transition
    }

    pub(crate) fn force_open(
        &mut self,
        config: &BreakerConfig,
        now: Duration,
    ) -> Option<Transition> {
        self.transition_to(BreakerState::Open, config, now)
    }

    pub(crate) fn force_closed(
        &mut self,
        config: &BreakerConfig,
        now: Duration,
    ) -> Option<Transition> {
        self.transition_to(BreakerState::Closed, config, now)
    }

    /// Pulls the next-admission deadline to now, making an open breaker
    /// immediately probe-eligible.
    pub(crate) fn nudge(&mut self, now: Duration) {
        if self.state == BreakerState::Open {
            match self.next_admission_at {
                Some(at) if at <= now => {}
                _ => self.next_admission_at = Some(now),
            }
        }
    }

    pub(crate) fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            total_requests: self.total_requests,
            total_successes: self.total_successes,
            total_failures: self.total_failures,
            in_flight: self.in_flight,
            next_admission_at: self.next_admission_at,
            last_success_at: self.last_success_at,
            last_failure_at: self.last_failure_at,
            last_transition_at: self.last_transition_at,
        }
    }

    fn count_admission(&mut self) {
        self.total_requests += 1;
        self.in_flight += 1;
    }

    fn transition_to(
        &mut self,
        state: BreakerState,
        config: &BreakerConfig,
        now: Duration,
    ) -> Option<Transition> {
        if self.state == state {
            return None;
        }
        let from = self.state;
        self.state = state;
        self.last_transition_at = now;

        match state {
            BreakerState::Closed => {
                self.consecutive_failures = 0;
                self.next_admission_at = None;
                self.half_open_remaining = 0;
                self.half_open_successes = 0;
            }
            BreakerState::Open => {
                self.next_admission_at = Some(now + config.cooldown);
                self.half_open_remaining = 0;
                self.half_open_successes = 0;
            }
            BreakerState::HalfOpen => {
                self.next_admission_at = None;
                self.half_open_remaining = config.half_open_budget;
                self.half_open_successes = 0;
            }
        }

        Some(Transition { from, to: state })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: u32, cooldown_ms: u64, budget: u32) -> BreakerConfig {
        BreakerConfig::builder()
            .failure_threshold(threshold)
            .cooldown(Duration::from_millis(cooldown_ms))
            .half_open_budget(budget)
            .build()
            .unwrap()
    }

    fn check_invariant(cell: &BreakerCell) {
        let snap = cell.snapshot();
        assert_eq!(
            snap.total_requests,
            snap.total_successes + snap.total_failures + snap.in_flight,
            "request accounting out of balance"
        );
    }

    #[test]
    fn opens_at_threshold() {
        let config = config(3, 100, 1);
        let mut cell = BreakerCell::new(Duration::ZERO);

        for i in 0..3 {
            let (decision, _) = cell.admit(&config, Duration::ZERO);
            assert_eq!(decision, AdmitDecision::Admitted);
            let transition = cell.observe_failure(&config, ErrorKind::Network, Duration::ZERO);
            if i < 2 {
                assert!(transition.is_none());
            } else {
                assert_eq!(
                    transition,
                    Some(Transition {
                        from: BreakerState::Closed,
                        to: BreakerState::Open
                    })
                );
            }
            check_invariant(&cell);
        }

        assert_eq!(cell.state(), BreakerState::Open);
        assert_eq!(
            cell.snapshot().next_admission_at,
            Some(Duration::from_millis(100))
        );
    }

    #[test]
    fn success_decays_consecutive_failures() {
        let config = config(3, 100, 1);
        let mut cell = BreakerCell::new(Duration::ZERO);

        for _ in 0..2 {
            cell.admit(&config, Duration::ZERO);
            cell.observe_failure(&config, ErrorKind::Network, Duration::ZERO);
        }
        assert_eq!(cell.snapshot().consecutive_failures, 2);

        cell.admit(&config, Duration::ZERO);
        cell.observe_success(&config, Duration::from_millis(5), Duration::ZERO);
        assert_eq!(cell.snapshot().consecutive_failures, 1);

        // Decay never goes below zero.
        cell.admit(&config, Duration::ZERO);
        cell.observe_success(&config, Duration::from_millis(5), Duration::ZERO);
        cell.admit(&config, Duration::ZERO);
        cell.observe_success(&config, Duration::from_millis(5), Duration::ZERO);
        assert_eq!(cell.snapshot().consecutive_failures, 0);
        check_invariant(&cell);
    }

    #[test]
    fn rejects_during_cooldown_then_probes() {
        let config = config(1, 100, 1);
        let mut cell = BreakerCell::new(Duration::ZERO);

        cell.admit(&config, Duration::ZERO);
        cell.observe_failure(&config, ErrorKind::Network, Duration::ZERO);
        assert_eq!(cell.state(), BreakerState::Open);

        let (decision, _) = cell.admit(&config, Duration::from_millis(50));
        assert_eq!(decision, AdmitDecision::RejectedCooldown);

        let (decision, transition) = cell.admit(&config, Duration::from_millis(100));
        assert_eq!(decision, AdmitDecision::Admitted);
        assert_eq!(
            transition,
            Some(Transition {
                from: BreakerState::Open,
                to: BreakerState::HalfOpen
            })
        );
        check_invariant(&cell);
    }

    #[test]
    fn half_open_budget_bounds_probes() {
        let config = config(1, 0, 2);
        let mut cell = BreakerCell::new(Duration::ZERO);

        cell.admit(&config, Duration::ZERO);
        cell.observe_failure(&config, ErrorKind::Network, Duration::ZERO);

        // Zero cooldown: the next admission transitions to half-open and
        // consumes the first probe slot.
        let (decision, _) = cell.admit(&config, Duration::ZERO);
        assert_eq!(decision, AdmitDecision::Admitted);
        let (decision, _) = cell.admit(&config, Duration::ZERO);
        assert_eq!(decision, AdmitDecision::Admitted);
        let (decision, _) = cell.admit(&config, Duration::ZERO);
        assert_eq!(decision, AdmitDecision::RejectedBudget);
        check_invariant(&cell);
    }

    #[test]
    fn closes_only_after_full_budget_of_successes() {
        let config = config(1, 0, 2);
        let mut cell = BreakerCell::new(Duration::ZERO);

        cell.admit(&config, Duration::ZERO);
        cell.observe_failure(&config, ErrorKind::Network, Duration::ZERO);

        cell.admit(&config, Duration::ZERO);
        cell.admit(&config, Duration::ZERO);

        let transition = cell.observe_success(&config, Duration::ZERO, Duration::ZERO);
        assert!(transition.is_none());
        assert_eq!(cell.state(), BreakerState::HalfOpen);

        let transition = cell.observe_success(&config, Duration::ZERO, Duration::ZERO);
        assert_eq!(
            transition,
            Some(Transition {
                from: BreakerState::HalfOpen,
                to: BreakerState::Closed
            })
        );
        assert_eq!(cell.snapshot().consecutive_failures, 0);
        check_invariant(&cell);
    }

    #[test]
    fn half_open_failure_reopens_and_discards_budget() {
        let config = config(1, 100, 3);
        let mut cell = BreakerCell::new(Duration::ZERO);

        cell.admit(&config, Duration::ZERO);
        cell.observe_failure(&config, ErrorKind::Network, Duration::ZERO);

        let now = Duration::from_millis(100);
        cell.admit(&config, now);
        let transition = cell.observe_failure(&config, ErrorKind::Network, now);
        assert_eq!(
            transition,
            Some(Transition {
                from: BreakerState::HalfOpen,
                to: BreakerState::Open
            })
        );
        assert_eq!(
            cell.snapshot().next_admission_at,
            Some(Duration::from_millis(200))
        );

        let (decision, _) = cell.admit(&config, now);
        assert_eq!(decision, AdmitDecision::RejectedCooldown);
        check_invariant(&cell);
    }

    #[test]
    fn reset_zeroes_everything() {
        let config = config(1, 100, 1);
        let mut cell = BreakerCell::new(Duration::ZERO);

        cell.admit(&config, Duration::ZERO);
        cell.observe_failure(&config, ErrorKind::Network, Duration::ZERO);
        assert_eq!(cell.state(), BreakerState::Open);

        cell.reset(&config, Duration::from_millis(10));
        let snap = cell.snapshot();
        assert_eq!(snap.state, BreakerState::Closed);
        assert_eq!(snap.total_requests, 0);
        assert_eq!(snap.consecutive_failures, 0);
        assert_eq!(snap.next_admission_at, None);

        // Idempotent: a second reset leaves the same state.
        cell.reset(&config, Duration::from_millis(20));
        let again = cell.snapshot();
        assert_eq!(again.state, BreakerState::Closed);
        assert_eq!(again.total_requests, 0);
    }

    #[test]
    fn release_undoes_an_admission() {
        let config = config(3, 100, 1);
        let mut cell = BreakerCell::new(Duration::ZERO);

        cell.admit(&config, Duration::ZERO);
        assert_eq!(cell.snapshot().in_flight, 1);
        cell.release();
        let snap = cell.snapshot();
        assert_eq!(snap.in_flight, 0);
        assert_eq!(snap.total_requests, 0);
        check_invariant(&cell);
    }

    #[test]
    fn nudge_pulls_deadline_forward_only() {
        let config = config(1, 1_000, 1);
        let mut cell = BreakerCell::new(Duration::ZERO);

        cell.admit(&config, Duration::ZERO);
        cell.observe_failure(&config, ErrorKind::Network, Duration::ZERO);
        assert_eq!(cell.snapshot().next_admission_at, Some(Duration::from_secs(1)));

        cell.nudge(Duration::from_millis(200));
        assert_eq!(
            cell.snapshot().next_admission_at,
            Some(Duration::from_millis(200))
        );

        // Already due: nudge leaves an earlier deadline alone.
        cell.nudge(Duration::from_millis(500));
        assert_eq!(
            cell.snapshot().next_admission_at,
            Some(Duration::from_millis(200))
        );
    }
}
