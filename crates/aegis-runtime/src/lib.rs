//! Protected-execution runtime for the aegis control plane.
//!
//! [`Runtime::execute`] wraps a single caller-supplied operation with the
//! full resilience policy:
//!
//! 1. a pre-emptive cache serve for cacheable reads,
//! 2. breaker admission,
//! 3. a per-attempt timeout race,
//! 4. bounded exponential retry for retryable error kinds,
//! 5. outcome observation into the breaker and the metrics ledger,
//! 6. fallback consultation when the primary path is exhausted.
//!
//! Within one call, attempts are strictly sequential. Concurrent `execute`
//! calls are safe; they contend only on per-target breaker and ledger
//! state.
//!
//! ## Example
//!
//! ```rust
//! use aegis_breaker::{BreakerConfig, BreakerRegistry};
//! use aegis_core::{CancelToken, Ledger, ModeHandle, SystemMode, Tier, TokioClock};
//! use aegis_fallback::{FallbackEngine, OfflineQueues, ResponseCache, TargetPolicy};
//! use aegis_runtime::{ExecuteOptions, Runtime};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let clock = Arc::new(TokioClock::new());
//! let ledger = Arc::new(Ledger::new(clock.clone()));
//! let registry = Arc::new(BreakerRegistry::new(clock.clone()));
//! let cache = Arc::new(ResponseCache::new(clock.clone(), 1024));
//! let queues = Arc::new(OfflineQueues::new(clock.clone()));
//! let engine = FallbackEngine::new(clock.clone(), cache, queues);
//! let runtime = Runtime::new(
//!     clock,
//!     ledger,
//!     registry.clone(),
//!     engine.clone(),
//!     ModeHandle::fixed(SystemMode::Normal),
//! );
//!
//! registry.register("users-db", Tier::Critical, BreakerConfig::builder().build().unwrap());
//! engine.register_target("users-db", TargetPolicy::new());
//!
//! let cancel = CancelToken::new();
//! let outcome = runtime
//!     .execute(
//!         "users-db",
//!         || Box::pin(async { Ok(json!({"id": 1})) }),
//!         ExecuteOptions::new(),
//!         &cancel,
//!     )
//!     .await
//!     .unwrap();
//! assert!(!outcome.is_fallback());
//! # }
//! ```

mod backoff;
mod options;

pub use backoff::BackoffPolicy;
pub use options::{Classifier, ExecuteOptions};

use aegis_breaker::{Admission, BreakerRegistry, Outcome};
use aegis_core::{
    BoxError, CancelToken, Clock, ErrorKind, FinalError, Ledger, ModeHandle,
};
use aegis_fallback::{
    AlternativeCaller, FallbackContext, FallbackEngine, FallbackSuccess, Marks, StrategyKind,
};
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

/// The caller-visible result of a protected call that did not end in a
/// final error.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteOutcome {
    /// The primary operation succeeded.
    Success(Value),
    /// A fallback strategy produced a substitute response.
    Fallback(FallbackSuccess),
}

impl ExecuteOutcome {
    /// True when the value came from a fallback strategy.
    pub fn is_fallback(&self) -> bool {
        matches!(self, ExecuteOutcome::Fallback(_))
    }

    /// The served payload.
    pub fn value(&self) -> &Value {
        match self {
            ExecuteOutcome::Success(value) => value,
            ExecuteOutcome::Fallback(success) => &success.value,
        }
    }

    /// Consumes the outcome, returning the served payload.
    pub fn into_value(self) -> Value {
        match self {
            ExecuteOutcome::Success(value) => value,
            ExecuteOutcome::Fallback(success) => success.value,
        }
    }

    /// The fallback strategy that served, if any.
    pub fn strategy(&self) -> Option<StrategyKind> {
        match self {
            ExecuteOutcome::Success(_) => None,
            ExecuteOutcome::Fallback(success) => Some(success.strategy),
        }
    }
}

enum AttemptResult {
    Done(Result<Value, BoxError>),
    TimedOut,
    Cancelled,
}

/// Orchestrates protected calls over the breaker registry, the metrics
/// ledger, and the fallback engine. Cheap to clone.
#[derive(Clone)]
pub struct Runtime {
    clock: Arc<dyn Clock>,
    ledger: Arc<Ledger>,
    registry: Arc<BreakerRegistry>,
    engine: FallbackEngine,
    mode: ModeHandle,
}

impl Runtime {
    /// Creates a runtime over the given components.
    pub fn new(
        clock: Arc<dyn Clock>,
        ledger: Arc<Ledger>,
        registry: Arc<BreakerRegistry>,
        engine: FallbackEngine,
        mode: ModeHandle,
    ) -> Self {
        Self {
            clock,
            ledger,
            registry,
            engine,
            mode,
        }
    }

    /// The breaker registry this runtime admits through.
    pub fn registry(&self) -> &Arc<BreakerRegistry> {
        &self.registry
    }

    /// The fallback engine this runtime consults.
    pub fn engine(&self) -> &FallbackEngine {
        &self.engine
    }

    /// Executes one protected call. See the crate docs for the algorithm.
    ///
    /// The operation is a factory invoked once per attempt. Cancellation is
    /// honored between attempts, during backoff, and mid-attempt; a
    /// cancelled call is never observed by the breaker and never consults
    /// the fallback engine.
    pub async fn execute<F>(
        &self,
        target: &str,
        mut operation: F,
        options: ExecuteOptions,
        cancel: &CancelToken,
    ) -> Result<ExecuteOutcome, FinalError>
    where
        F: FnMut() -> BoxFuture<'static, Result<Value, BoxError>> + Send,
    {
        if options.max_attempts == 0 {
            return Err(FinalError::new(
                ErrorKind::Validation,
                "max_attempts must be at least 1",
                0,
            ));
        }
        if options.backoff_growth < 1.0 {
            return Err(FinalError::new(
                ErrorKind::Validation,
                format!("backoff growth must be at least 1.0, got {}", options.backoff_growth),
                0,
            ));
        }
        if options.call_timeout.is_some_and(|t| t.is_zero()) {
            return Err(FinalError::new(
                ErrorKind::Validation,
                "call timeout must be greater than zero",
                0,
            ));
        }

        let Some(config) = self.registry.config(target) else {
            return Err(FinalError::new(
                ErrorKind::Validation,
                format!("unknown target: {target}"),
                0,
            ));
        };
        let call_timeout = options.call_timeout.unwrap_or(config.call_timeout);

        let cacheable = !options.is_write
            && options
                .operation_tag
                .as_deref()
                .is_some_and(|tag| self.engine.is_cacheable(target, tag));

        // Pre-emptive cache serve for cacheable reads: a fresh entry short
        // circuits the primary call entirely.
        if cacheable && !options.bypass_cache {
            if let Some(key) = options.cache_key.as_deref() {
                if let Some(value) = self.engine.cache().get(target, key) {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(id = target, key = key, "served pre-emptively from cache");

                    return Ok(ExecuteOutcome::Fallback(FallbackSuccess {
                        strategy: StrategyKind::CachedResponse,
                        value,
                        marks: Marks {
                            cache_hit: true,
                            ..Marks::default()
                        },
                    }));
                }
            }
        }

        let backoff = BackoffPolicy {
            base: options.base_backoff,
            growth: options.backoff_growth,
            cap: options.backoff_cap,
            jitter: options.jitter,
        };

        let mut attempts: u32 = 0;
        let (last_kind, last_message) = loop {
            if cancel.is_cancelled() {
                return Err(FinalError::new(
                    ErrorKind::Cancelled,
                    "cancelled before attempt",
                    attempts,
                ));
            }

            match self.registry.admit(target) {
                Some(Admission::Admitted) => {}
                Some(Admission::Rejected(reason)) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(id = target, reason = reason.as_str(), "admission rejected");

                    break (
                        ErrorKind::CircuitOpen,
                        format!("admission rejected: {reason}"),
                    );
                }
                None => {
                    return Err(FinalError::new(
                        ErrorKind::Validation,
                        format!("unknown target: {target}"),
                        attempts,
                    ));
                }
            }

            let started = self.clock.now();
            attempts += 1;
            let attempt_result = {
                let fut = operation();
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => AttemptResult::Cancelled,
                    result = fut => AttemptResult::Done(result),
                    _ = self.clock.sleep(call_timeout) => AttemptResult::TimedOut,
                }
            };

            let (kind, message) = match attempt_result {
                AttemptResult::Cancelled => {
                    // Dropping the attempt future is the cooperative
                    // cancellation; the admission is returned without an
                    // observation so the breaker never sees it.
                    self.registry.release(target);
                    return Err(FinalError::new(
                        ErrorKind::Cancelled,
                        "cancelled mid-attempt",
                        attempts,
                    ));
                }
                AttemptResult::Done(Ok(value)) => {
                    let latency = self.clock.now().saturating_sub(started);
                    self.registry.observe(target, Outcome::Success(latency));
                    self.ledger.record_success(target, latency);

                    if cacheable {
                        if let Some(key) = options.cache_key.as_deref() {
                            let ttl = self
                                .engine
                                .max_cache_age(target)
                                .unwrap_or(std::time::Duration::from_secs(60));
                            self.engine.cache().put(target, key, value.clone(), ttl);
                        }
                    }
                    return Ok(ExecuteOutcome::Success(value));
                }
                AttemptResult::Done(Err(error)) => {
                    let kind = options.classify(&error);
                    (kind, error.to_string())
                }
                AttemptResult::TimedOut => (
                    ErrorKind::Timeout,
                    format!("attempt timed out after {call_timeout:?}"),
                ),
            };

            if kind.breaker_observed() {
                self.registry.observe(target, Outcome::Failure(kind));
            } else {
                self.registry.release(target);
            }
            self.ledger.record_failure(target, kind);

            if options.retryable.contains(&kind) && attempts < options.max_attempts {
                let delay = backoff.delay_for(attempts, kind);

                #[cfg(feature = "tracing")]
                tracing::debug!(
                    id = target,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    kind = kind.as_str(),
                    "retrying after backoff"
                );

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(FinalError::new(
                            ErrorKind::Cancelled,
                            "cancelled during backoff",
                            attempts,
                        ));
                    }
                    _ = self.clock.sleep(delay) => {}
                }
                continue;
            }

            break (kind, message);
        };

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "aegis_execute_exhausted_total",
            "target" => target.to_string(),
            "kind" => last_kind.as_str()
        )
        .increment(1);

        let ctx = FallbackContext {
            target: target.to_string(),
            operation_tag: options.operation_tag.clone(),
            cache_key: options.cache_key.clone(),
            error_kind: last_kind,
            priority: options.priority,
            payload: options.payload.clone(),
            degraded_data: options.degraded_data.clone(),
            mode: self.mode.current(),
            depth: options.depth,
        };

        match self.engine.run(ctx).await {
            Ok(success) => Ok(ExecuteOutcome::Fallback(success)),
            Err(_) => Err(FinalError::new(last_kind, last_message, attempts)),
        }
    }
}

impl AlternativeCaller for Runtime {
    fn call_alternative(
        &self,
        target: String,
        ctx: FallbackContext,
    ) -> BoxFuture<'static, Result<Value, FinalError>> {
        let runtime = self.clone();
        Box::pin(async move {
            let producer = runtime.engine.provider(&target).ok_or_else(|| {
                FinalError::new(
                    ErrorKind::Validation,
                    format!("no provider registered for {target}"),
                    0,
                )
            })?;

            let mut options = ExecuteOptions::new().no_retries();
            options.depth = ctx.depth + 1;
            if let Some(tag) = &ctx.operation_tag {
                options = options.operation_tag(tag.clone());
            }

            let producer_ctx = FallbackContext {
                depth: ctx.depth + 1,
                ..ctx
            };
            let cancel = CancelToken::new();
            let operation = move || {
                let producer = Arc::clone(&producer);
                let producer_ctx = producer_ctx.clone();
                Box::pin(async move {
                    producer(producer_ctx)
                        .await
                        .map_err(|err| Box::new(err) as BoxError)
                }) as BoxFuture<'static, Result<Value, BoxError>>
            };

            let outcome = runtime.execute(&target, operation, options, &cancel).await?;
            Ok(outcome.into_value())
        })
    }
}
