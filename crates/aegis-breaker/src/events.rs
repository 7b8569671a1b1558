//! Breaker events.

use crate::registry::RejectReason;
use aegis_core::ControlEvent;
use std::time::Duration;

/// Events emitted by the breaker registry.
#[derive(Debug, Clone)]
pub enum BreakerEvent {
    /// The breaker opened.
    Opened {
        /// Target id.
        target: String,
        /// Clock offset of the transition.
        at: Duration,
    },
    /// The breaker closed.
    Closed {
        /// Target id.
        target: String,
        /// Clock offset of the transition.
        at: Duration,
    },
    /// The breaker transitioned to half-open.
    HalfOpened {
        /// Target id.
        target: String,
        /// Clock offset of the transition.
        at: Duration,
    },
    /// The breaker was manually reset.
    Reset {
        /// Target id.
        target: String,
        /// Clock offset of the reset.
        at: Duration,
    },
    /// An admission was rejected.
    CallRejected {
        /// Target id.
        target: String,
        /// Clock offset of the rejection.
        at: Duration,
        /// Why the call was rejected.
        reason: RejectReason,
    },
}

impl ControlEvent for BreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BreakerEvent::Opened { .. } => "breaker:opened",
            BreakerEvent::Closed { .. } => "breaker:closed",
            BreakerEvent::HalfOpened { .. } => "breaker:halfopen",
            BreakerEvent::Reset { .. } => "breaker:reset",
            BreakerEvent::CallRejected { .. } => "breaker:rejected",
        }
    }

    fn at(&self) -> Duration {
        match self {
            BreakerEvent::Opened { at, .. }
            | BreakerEvent::Closed { at, .. }
            | BreakerEvent::HalfOpened { at, .. }
            | BreakerEvent::Reset { at, .. }
            | BreakerEvent::CallRejected { at, .. } => *at,
        }
    }

    fn target(&self) -> &str {
        match self {
            BreakerEvent::Opened { target, .. }
            | BreakerEvent::Closed { target, .. }
            | BreakerEvent::HalfOpened { target, .. }
            | BreakerEvent::Reset { target, .. }
            | BreakerEvent::CallRejected { target, .. } => target,
        }
    }
}
