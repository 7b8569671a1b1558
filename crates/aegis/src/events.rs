//! The unified event stream published by the control plane.

use aegis_core::SystemMode;
use std::time::Duration;

/// Events fanned into the plane-wide broadcast channel, announced in the
/// order the underlying transitions were taken.
#[derive(Debug, Clone)]
pub enum PlaneEvent {
    /// A breaker opened.
    BreakerOpened {
        /// Target id.
        target: String,
        /// Clock offset.
        at: Duration,
    },
    /// A breaker closed.
    BreakerClosed {
        /// Target id.
        target: String,
        /// Clock offset.
        at: Duration,
    },
    /// A breaker transitioned to half-open.
    BreakerHalfOpen {
        /// Target id.
        target: String,
        /// Clock offset.
        at: Duration,
    },
    /// A breaker was manually reset.
    BreakerReset {
        /// Target id.
        target: String,
        /// Clock offset.
        at: Duration,
    },
    /// Emergency mode was entered.
    EmergencyActivated {
        /// The triggering reason.
        reason: String,
        /// Operator or rule, if known.
        by: Option<String>,
        /// Clock offset.
        at: Duration,
    },
    /// Emergency mode was left.
    EmergencyExited {
        /// Operator, if known.
        by: Option<String>,
        /// Clock offset.
        at: Duration,
    },
    /// The system mode changed.
    ModeChanged {
        /// Previous mode.
        from: SystemMode,
        /// New mode.
        to: SystemMode,
        /// Clock offset.
        at: Duration,
    },
}
