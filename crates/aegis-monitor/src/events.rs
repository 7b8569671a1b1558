//! Mode controller and monitor events.

use aegis_core::{ControlEvent, SystemMode};
use std::time::Duration;

/// Events emitted by the system mode controller.
#[derive(Debug, Clone)]
pub enum ModeEvent {
    /// The system mode changed.
    Changed {
        /// Previous mode.
        from: SystemMode,
        /// New mode.
        to: SystemMode,
        /// Clock offset of the transition.
        at: Duration,
    },
    /// Emergency mode was entered.
    EmergencyActivated {
        /// The triggering reason.
        reason: String,
        /// Operator or rule that activated it, if known.
        by: Option<String>,
        /// Clock offset of the activation.
        at: Duration,
    },
    /// Emergency mode was left.
    EmergencyExited {
        /// Operator that exited it, if known.
        by: Option<String>,
        /// Clock offset of the exit.
        at: Duration,
    },
    /// A continuity rule fired and its action was dispatched.
    RuleFired {
        /// Rule name.
        rule: String,
        /// Dispatched action identifier.
        action: String,
        /// Clock offset of the dispatch.
        at: Duration,
    },
}

impl ControlEvent for ModeEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ModeEvent::Changed { .. } => "mode:changed",
            ModeEvent::EmergencyActivated { .. } => "emergency:activated",
            ModeEvent::EmergencyExited { .. } => "emergency:exited",
            ModeEvent::RuleFired { .. } => "rule:fired",
        }
    }

    fn at(&self) -> Duration {
        match self {
            ModeEvent::Changed { at, .. }
            | ModeEvent::EmergencyActivated { at, .. }
            | ModeEvent::EmergencyExited { at, .. }
            | ModeEvent::RuleFired { at, .. } => *at,
        }
    }

    fn target(&self) -> &str {
        match self {
            ModeEvent::RuleFired { rule, .. } => rule,
            _ => "system",
        }
    }
}

/// Events emitted by the health monitor.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// One monitor cycle finished.
    CycleCompleted {
        /// Clock offset at completion.
        at: Duration,
        /// Targets examined this cycle.
        targets: usize,
        /// Mode derived at the end of the cycle.
        mode: SystemMode,
    },
}

impl ControlEvent for MonitorEvent {
    fn event_type(&self) -> &'static str {
        "monitor:cycle"
    }

    fn at(&self) -> Duration {
        match self {
            MonitorEvent::CycleCompleted { at, .. } => *at,
        }
    }

    fn target(&self) -> &str {
        "system"
    }
}
