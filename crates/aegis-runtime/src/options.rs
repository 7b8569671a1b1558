//! Per-call execution options.

use aegis_core::{BoxError, CallError, ErrorKind};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Maps a raised error to a kind the control plane understands.
pub type Classifier = Arc<dyn Fn(&BoxError) -> ErrorKind + Send + Sync>;

/// Options controlling one protected call.
///
/// Start from [`ExecuteOptions::new`] and chain setters:
///
/// ```rust
/// use aegis_runtime::ExecuteOptions;
/// use aegis_core::ErrorKind;
/// use std::time::Duration;
///
/// let options = ExecuteOptions::new()
///     .max_attempts(3)
///     .base_backoff(Duration::from_millis(50))
///     .retry_on([ErrorKind::Network, ErrorKind::Timeout])
///     .operation_tag("get-user")
///     .cache_key("user:42");
/// ```
#[derive(Clone)]
pub struct ExecuteOptions {
    /// Error classifier; defaults to downcasting [`CallError`] and treating
    /// everything else as [`ErrorKind::RemoteError`].
    pub classifier: Option<Classifier>,
    /// Error kinds worth retrying.
    pub retryable: HashSet<ErrorKind>,
    /// Total attempts including the first; at least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_backoff: Duration,
    /// Exponential growth per additional attempt; at least 1.0.
    pub backoff_growth: f64,
    /// Upper bound on any single backoff delay.
    pub backoff_cap: Duration,
    /// Adds uniform jitter in `[0, 1 s)` to each backoff delay.
    pub jitter: bool,
    /// Per-attempt timeout; overrides the target's configured default.
    pub call_timeout: Option<Duration>,
    /// Operation tag, used for cacheability and fallback routing.
    pub operation_tag: Option<String>,
    /// Cache key for cacheable reads.
    pub cache_key: Option<String>,
    /// Priority for queued fallbacks; higher drains first.
    pub priority: i64,
    /// Skips the pre-emptive cache lookup.
    pub bypass_cache: bool,
    /// Marks the call as a write: never served from or written to cache.
    pub is_write: bool,
    /// Caller-supplied degraded data for graceful degradation.
    pub degraded_data: Option<Value>,
    /// Opaque payload for the queue-delayed fallback.
    pub payload: Option<Value>,
    /// Alternative-provider re-entry depth. Callers leave this at 0.
    pub depth: u8,
}

impl ExecuteOptions {
    /// Options with the default retry policy: three attempts, 100 ms base
    /// backoff doubling up to 30 s, retrying the default-retryable kinds.
    pub fn new() -> Self {
        Self {
            classifier: None,
            retryable: ErrorKind::ALL
                .iter()
                .copied()
                .filter(ErrorKind::retryable_by_default)
                .collect(),
            max_attempts: 3,
            base_backoff: Duration::from_millis(100),
            backoff_growth: 2.0,
            backoff_cap: Duration::from_secs(30),
            jitter: false,
            call_timeout: None,
            operation_tag: None,
            cache_key: None,
            priority: 0,
            bypass_cache: false,
            is_write: false,
            degraded_data: None,
            payload: None,
            depth: 0,
        }
    }

    /// Sets the error classifier.
    pub fn classifier<F>(mut self, f: F) -> Self
    where
        F: Fn(&BoxError) -> ErrorKind + Send + Sync + 'static,
    {
        self.classifier = Some(Arc::new(f));
        self
    }

    /// Replaces the retryable kind set.
    pub fn retry_on<I>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = ErrorKind>,
    {
        self.retryable = kinds.into_iter().collect();
        self
    }

    /// Disables retries entirely.
    pub fn no_retries(mut self) -> Self {
        self.retryable.clear();
        self.max_attempts = 1;
        self
    }

    /// Total attempts including the first.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Delay before the second attempt.
    pub fn base_backoff(mut self, delay: Duration) -> Self {
        self.base_backoff = delay;
        self
    }

    /// Exponential growth factor.
    pub fn backoff_growth(mut self, growth: f64) -> Self {
        self.backoff_growth = growth;
        self
    }

    /// Upper bound on any single backoff delay.
    pub fn backoff_cap(mut self, cap: Duration) -> Self {
        self.backoff_cap = cap;
        self
    }

    /// Adds uniform jitter in `[0, 1 s)` to each backoff delay.
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// Per-attempt timeout override.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Operation tag.
    pub fn operation_tag(mut self, tag: impl Into<String>) -> Self {
        self.operation_tag = Some(tag.into());
        self
    }

    /// Cache key.
    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// Queue priority.
    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Skips the pre-emptive cache lookup.
    pub fn bypass_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }

    /// Marks the call as a write operation.
    pub fn write_operation(mut self) -> Self {
        self.is_write = true;
        self
    }

    /// Degraded data embedded by the graceful-degradation fallback.
    pub fn degraded_data(mut self, data: Value) -> Self {
        self.degraded_data = Some(data);
        self
    }

    /// Payload stored by the queue-delayed fallback.
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub(crate) fn classify(&self, error: &BoxError) -> ErrorKind {
        match &self.classifier {
            Some(classifier) => classifier(error),
            None => error
                .downcast_ref::<CallError>()
                .map_or(ErrorKind::RemoteError, |call_error| call_error.kind),
        }
    }
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExecuteOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecuteOptions")
            .field("max_attempts", &self.max_attempts)
            .field("base_backoff", &self.base_backoff)
            .field("backoff_growth", &self.backoff_growth)
            .field("backoff_cap", &self.backoff_cap)
            .field("jitter", &self.jitter)
            .field("call_timeout", &self.call_timeout)
            .field("operation_tag", &self.operation_tag)
            .field("cache_key", &self.cache_key)
            .field("priority", &self.priority)
            .field("bypass_cache", &self.bypass_cache)
            .field("is_write", &self.is_write)
            .field("depth", &self.depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retryable_set_matches_taxonomy() {
        let options = ExecuteOptions::new();
        assert!(options.retryable.contains(&ErrorKind::Network));
        assert!(options.retryable.contains(&ErrorKind::Timeout));
        assert!(!options.retryable.contains(&ErrorKind::Validation));
        assert!(!options.retryable.contains(&ErrorKind::AuthFailed));
    }

    #[test]
    fn default_classifier_downcasts_call_errors() {
        let options = ExecuteOptions::new();
        let classified: BoxError = Box::new(CallError::network("connection refused"));
        assert_eq!(options.classify(&classified), ErrorKind::Network);

        let opaque: BoxError = "something else".into();
        assert_eq!(options.classify(&opaque), ErrorKind::RemoteError);
    }

    #[test]
    fn custom_classifier_wins() {
        let options = ExecuteOptions::new().classifier(|_| ErrorKind::NotFound);
        let err: BoxError = Box::new(CallError::network("x"));
        assert_eq!(options.classify(&err), ErrorKind::NotFound);
    }

    #[test]
    fn no_retries_clears_the_set() {
        let options = ExecuteOptions::new().no_retries();
        assert!(options.retryable.is_empty());
        assert_eq!(options.max_attempts, 1);
    }
}
