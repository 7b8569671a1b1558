//! Optional best-effort persistence for breaker state.

use crate::cell::BreakerState;
use aegis_core::BoxError;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Breaker state as written to a store.
///
/// Deadlines are stored as remaining cooldown rather than absolute offsets,
/// because clock origins do not survive a restart.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PersistedBreaker {
    /// State at save time.
    pub state: BreakerState,
    /// Consecutive-failure count at save time.
    pub consecutive_failures: u32,
    /// Cooldown still outstanding, for an open breaker.
    pub cooldown_remaining: Option<Duration>,
}

/// A host-supplied persistence adapter for breaker state.
///
/// All operations are best-effort: errors are logged and ignored, and the
/// in-memory state stays authoritative. Consistency across restarts is
/// explicitly not guaranteed.
pub trait BreakerStore: Send + Sync {
    /// Loads persisted state for a target, if any.
    fn load(&self, target: &str) -> Result<Option<PersistedBreaker>, BoxError>;

    /// Saves state for a target.
    fn save(&self, target: &str, state: &PersistedBreaker) -> Result<(), BoxError>;
}

/// In-process store, mainly useful in tests and as a reference
/// implementation.
#[derive(Default)]
pub struct InMemoryBreakerStore {
    entries: Mutex<HashMap<String, PersistedBreaker>>,
}

impl InMemoryBreakerStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted targets.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// True when nothing has been persisted.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

impl BreakerStore for InMemoryBreakerStore {
    fn load(&self, target: &str) -> Result<Option<PersistedBreaker>, BoxError> {
        Ok(self.entries.lock().unwrap().get(target).cloned())
    }

    fn save(&self, target: &str, state: &PersistedBreaker) -> Result<(), BoxError> {
        self.entries
            .lock()
            .unwrap()
            .insert(target.to_string(), state.clone());
        Ok(())
    }
}
