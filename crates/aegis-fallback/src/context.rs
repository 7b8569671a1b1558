//! The context a fallback strategy is consulted with.

use aegis_core::{ErrorKind, SystemMode};
use serde_json::Value;

/// Everything a strategy may consult when deciding whether and how to
/// produce a substitute response.
#[derive(Debug, Clone)]
pub struct FallbackContext {
    /// The failing target.
    pub target: String,
    /// Operation tag supplied by the caller, if any.
    pub operation_tag: Option<String>,
    /// Cache key supplied by the caller, if any.
    pub cache_key: Option<String>,
    /// Classified kind of the error being substituted for.
    pub error_kind: ErrorKind,
    /// Priority for queued fallbacks; higher drains first.
    pub priority: i64,
    /// Opaque write payload, required by the queue-delayed strategy.
    pub payload: Option<Value>,
    /// Caller-supplied degraded data embedded by graceful degradation.
    pub degraded_data: Option<Value>,
    /// System mode at consultation time.
    pub mode: SystemMode,
    /// Alternative-provider recursion depth; re-entry is limited to 1.
    pub depth: u8,
}

impl FallbackContext {
    /// Creates a context with nothing but the target and error kind set.
    pub fn new(target: impl Into<String>, error_kind: ErrorKind) -> Self {
        Self {
            target: target.into(),
            operation_tag: None,
            cache_key: None,
            error_kind,
            priority: 0,
            payload: None,
            degraded_data: None,
            mode: SystemMode::Normal,
            depth: 0,
        }
    }

    /// Sets the operation tag.
    pub fn with_operation_tag(mut self, tag: impl Into<String>) -> Self {
        self.operation_tag = Some(tag.into());
        self
    }

    /// Sets the cache key.
    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// Sets the queue priority.
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the write payload.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets caller-supplied degraded data.
    pub fn with_degraded_data(mut self, data: Value) -> Self {
        self.degraded_data = Some(data);
        self
    }

    /// Sets the system mode.
    pub fn with_mode(mut self, mode: SystemMode) -> Self {
        self.mode = mode;
        self
    }
}
