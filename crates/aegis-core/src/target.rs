//! Target vocabulary shared across the control plane.

/// Static classification of a target's importance.
///
/// The system mode controller derives the process-wide operating posture
/// from per-tier health, and the emergency tier gate admits only
/// [`Tier::Critical`] targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Tier {
    /// The system cannot operate without it.
    Critical,
    /// Degraded but functional operation without it.
    Essential,
    /// Normal business functionality.
    Standard,
    /// Nice-to-have.
    Optional,
}

impl Tier {
    /// Every tier, most important first.
    pub const ALL: [Tier; 4] = [Tier::Critical, Tier::Essential, Tier::Standard, Tier::Optional];

    /// Stable label for metrics and events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Critical => "critical",
            Tier::Essential => "essential",
            Tier::Standard => "standard",
            Tier::Optional => "optional",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Criticality descriptor for one registered target, consumed by the health
/// monitor and the system mode controller.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TargetInfo {
    /// Stable target identifier.
    pub id: String,
    /// Importance tier.
    pub tier: Tier,
    /// Whether this target is flagged as a critical service for reporting.
    pub critical_service: bool,
    /// Estimated business impact per minute of outage, for reporting only.
    pub business_impact_per_minute: f64,
    /// Targets this one declares a dependency on.
    pub dependencies: Vec<String>,
}

impl TargetInfo {
    /// Creates a descriptor with no declared dependencies or impact.
    pub fn new(id: impl Into<String>, tier: Tier) -> Self {
        Self {
            id: id.into(),
            tier,
            critical_service: tier == Tier::Critical,
            business_impact_per_minute: 0.0,
            dependencies: Vec::new(),
        }
    }
}
