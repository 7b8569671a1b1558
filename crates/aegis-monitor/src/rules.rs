//! Business-continuity rules.

use aegis_core::SystemHealthSnapshot;
use std::sync::Arc;

/// Predicate evaluated against the latest health snapshot.
pub type RulePredicate = Arc<dyn Fn(&SystemHealthSnapshot) -> bool + Send + Sync>;

/// Host-registered action dispatched when a rule fires.
pub type ActionHandler = Arc<dyn Fn(&SystemHealthSnapshot) + Send + Sync>;

/// A predicate-plus-action evaluated once per monitor cycle.
///
/// Rules run in ascending priority order. A rule whose predicate holds and
/// whose `auto_execute` flag is set dispatches its action identifier
/// through the controller's action registry.
#[derive(Clone)]
pub struct ContinuityRule {
    /// Rule name, used in events and the forced-by-rule snapshot field.
    pub name: String,
    /// Predicate over the snapshot.
    pub predicate: RulePredicate,
    /// Action identifier resolved by the host at registration time.
    pub action: String,
    /// Lower runs first.
    pub priority: i32,
    /// Whether the action dispatches automatically.
    pub auto_execute: bool,
    /// Revenue-impact tag for reporting.
    pub revenue_impact: Option<String>,
}

impl ContinuityRule {
    /// Creates an auto-executing rule.
    pub fn new<F>(name: impl Into<String>, priority: i32, action: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&SystemHealthSnapshot) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
            action: action.into(),
            priority,
            auto_execute: true,
            revenue_impact: None,
        }
    }

    /// Disables automatic action dispatch; the rule still evaluates and
    /// emits events.
    pub fn manual(mut self) -> Self {
        self.auto_execute = false;
        self
    }

    /// Tags the rule with a revenue impact for reporting.
    pub fn revenue_impact(mut self, tag: impl Into<String>) -> Self {
        self.revenue_impact = Some(tag.into());
        self
    }
}

impl std::fmt::Debug for ContinuityRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContinuityRule")
            .field("name", &self.name)
            .field("action", &self.action)
            .field("priority", &self.priority)
            .field("auto_execute", &self.auto_execute)
            .field("revenue_impact", &self.revenue_impact)
            .finish()
    }
}
