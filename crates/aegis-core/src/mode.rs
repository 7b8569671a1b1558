//! System-wide operating modes and health snapshots.

use crate::target::Tier;
use std::time::Duration;
use tokio::sync::watch;

/// The process-wide operating posture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SystemMode {
    /// Everything within thresholds.
    Normal,
    /// Critical or essential health below threshold; no admission gating.
    Degraded,
    /// Critical health collapsed or operator override; non-critical
    /// admissions are tier-gated.
    Emergency,
    /// Operator maintenance window.
    Maintenance,
    /// Re-entry path from Emergency back toward Normal.
    Recovery,
}

impl SystemMode {
    /// Stable label for metrics and events.
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemMode::Normal => "normal",
            SystemMode::Degraded => "degraded",
            SystemMode::Emergency => "emergency",
            SystemMode::Maintenance => "maintenance",
            SystemMode::Recovery => "recovery",
        }
    }
}

impl std::fmt::Display for SystemMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Healthy/total pair for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TierHealth {
    /// Targets currently considered healthy.
    pub healthy: usize,
    /// Registered targets in the tier.
    pub total: usize,
}

impl TierHealth {
    /// Up ratio in `[0, 1]`; an empty tier counts as fully up.
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.healthy as f64 / self.total as f64
        }
    }
}

/// Point-in-time view of system health, as produced by the mode controller.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SystemHealthSnapshot {
    /// Health of the critical tier.
    pub critical: TierHealth,
    /// Health of the essential tier.
    pub essential: TierHealth,
    /// Health of the standard tier.
    pub standard: TierHealth,
    /// Health of the optional tier.
    pub optional: TierHealth,
    /// Current system mode.
    pub mode: SystemMode,
    /// Clock offset of the last mode transition.
    pub last_transition_at: Duration,
    /// Continuity rule that forced the current mode, if any.
    pub forced_by_rule: Option<String>,
    /// Summed business impact per minute over unhealthy targets.
    pub impact_per_minute: f64,
}

impl SystemHealthSnapshot {
    /// Health of the given tier.
    pub fn tier(&self, tier: Tier) -> TierHealth {
        match tier {
            Tier::Critical => self.critical,
            Tier::Essential => self.essential,
            Tier::Standard => self.standard,
            Tier::Optional => self.optional,
        }
    }

    /// Up ratio of the critical tier.
    pub fn critical_up_ratio(&self) -> f64 {
        self.critical.ratio()
    }

    /// Up ratio of the essential tier.
    pub fn essential_up_ratio(&self) -> f64 {
        self.essential.ratio()
    }
}

/// Read side of the system mode, distributed over a watch channel.
///
/// Components that must consult the current mode (the fallback engine's
/// emergency-only strategy, the protected-execution runtime) hold a handle;
/// only the mode controller writes.
#[derive(Debug, Clone)]
pub struct ModeHandle {
    rx: watch::Receiver<SystemMode>,
    _keepalive: Option<std::sync::Arc<watch::Sender<SystemMode>>>,
}

impl ModeHandle {
    /// Wraps the read side of a mode channel.
    pub fn new(rx: watch::Receiver<SystemMode>) -> Self {
        Self {
            rx,
            _keepalive: None,
        }
    }

    /// A handle pinned to a fixed mode, for tests and standalone use.
    pub fn fixed(mode: SystemMode) -> Self {
        let (tx, rx) = watch::channel(mode);
        Self {
            rx,
            _keepalive: Some(std::sync::Arc::new(tx)),
        }
    }

    /// The mode as of now.
    pub fn current(&self) -> SystemMode {
        *self.rx.borrow()
    }
}
