//! Fallback engine events.

use crate::strategy::StrategyKind;
use aegis_core::{ControlEvent, ErrorKind};
use std::time::Duration;

/// Events emitted by the fallback engine.
#[derive(Debug, Clone)]
pub enum FallbackEvent {
    /// A strategy produced a substitute response.
    Applied {
        /// Target the fallback was served for.
        target: String,
        /// Clock offset.
        at: Duration,
        /// The winning strategy.
        strategy: StrategyKind,
    },
    /// Every configured strategy declined or failed.
    Exhausted {
        /// Target the fallback was requested for.
        target: String,
        /// Clock offset.
        at: Duration,
        /// The error kind that was being substituted for.
        kind: ErrorKind,
    },
}

impl ControlEvent for FallbackEvent {
    fn event_type(&self) -> &'static str {
        match self {
            FallbackEvent::Applied { .. } => "fallback:applied",
            FallbackEvent::Exhausted { .. } => "fallback:exhausted",
        }
    }

    fn at(&self) -> Duration {
        match self {
            FallbackEvent::Applied { at, .. } | FallbackEvent::Exhausted { at, .. } => *at,
        }
    }

    fn target(&self) -> &str {
        match self {
            FallbackEvent::Applied { target, .. } | FallbackEvent::Exhausted { target, .. } => {
                target
            }
        }
    }
}
