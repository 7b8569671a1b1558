//! Fallback strategy engine for the aegis control plane.
//!
//! When a protected call fails (or is refused admission), the engine walks
//! the target's configured chain of substitute-response producers in order;
//! the first strategy whose precondition accepts the error context and
//! whose execution succeeds wins. When every strategy declines or fails,
//! the engine reports a distinguished [`NoFallback`] outcome.
//!
//! The engine owns the two stateful fallback resources:
//!
//! - [`ResponseCache`]: a bounded process-wide TTL cache populated by
//!   successful cacheable calls and served by the cached-response strategy.
//! - [`OfflineQueues`]: per-target bounded queues holding deferred writes
//!   for the queue-delayed strategy, drained by the health monitor once the
//!   target's breaker closes again.
//!
//! ## Example
//!
//! ```rust
//! use aegis_fallback::{
//!     FallbackContext, FallbackEngine, OfflineQueues, ResponseCache, StrategyKind,
//!     StrategySpec, TargetPolicy,
//! };
//! use aegis_core::{ErrorKind, ManualClock};
//! use serde_json::json;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let clock = Arc::new(ManualClock::new());
//! let cache = Arc::new(ResponseCache::new(clock.clone(), 1024));
//! let queues = Arc::new(OfflineQueues::new(clock.clone()));
//! let engine = FallbackEngine::new(clock, cache, queues);
//!
//! engine.register_target(
//!     "catalog-api",
//!     TargetPolicy::new()
//!         .cacheable_tag("get-product")
//!         .max_cache_age(Duration::from_secs(60))
//!         .chain(vec![
//!             StrategySpec::CachedResponse,
//!             StrategySpec::GracefulDegradation { note: None },
//!         ]),
//! );
//!
//! engine.cache().put("catalog-api", "product:7", json!({"id": 7}), Duration::from_secs(60));
//!
//! let ctx = FallbackContext::new("catalog-api", ErrorKind::Network)
//!     .with_operation_tag("get-product")
//!     .with_cache_key("product:7");
//! let served = engine.run(ctx).await.unwrap();
//! assert_eq!(served.strategy, StrategyKind::CachedResponse);
//! assert!(served.marks.cache_hit);
//! # }
//! ```

mod cache;
mod context;
mod error;
mod events;
mod queue;
mod strategy;

pub use cache::{CacheStats, ResponseCache};
pub use context::FallbackContext;
pub use error::{NoFallback, StrategyError};
pub use events::FallbackEvent;
pub use queue::{OfflineQueues, QueueAck, QueueEntry};
pub use strategy::{FallbackStrategy, FallbackSuccess, Marks, StrategyKind, StrategySpec};

use aegis_core::{CallError, Clock, EventListener, EventListeners, FinalError};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// An async producer registered per target (simplified operations and
/// alternative providers).
pub type ProducerFn =
    Arc<dyn Fn(FallbackContext) -> BoxFuture<'static, Result<Value, CallError>> + Send + Sync>;

/// Re-entry seam into the protected-execution runtime.
///
/// The alternative-provider strategy invokes the substitute target through
/// this trait; the runtime implements it, keeping the crate dependency
/// order acyclic. Implementations must honor the context's depth so
/// re-entry never recurses more than one level.
pub trait AlternativeCaller: Send + Sync {
    /// Executes the registered provider operation against `target`.
    fn call_alternative(
        &self,
        target: String,
        ctx: FallbackContext,
    ) -> BoxFuture<'static, Result<Value, FinalError>>;
}

/// Per-target fallback policy: which operations are cacheable, how long
/// cached responses live, and the strategy chain to walk on failure.
#[derive(Debug, Clone, Default)]
pub struct TargetPolicy {
    /// Operation tags whose successful responses populate the cache.
    pub cacheable_tags: HashSet<String>,
    /// TTL applied when the runtime populates the cache.
    pub max_cache_age: Duration,
    /// Ordered strategy chain.
    pub fallback_chain: Vec<StrategySpec>,
}

impl TargetPolicy {
    /// Creates an empty policy (nothing cacheable, no chain).
    pub fn new() -> Self {
        Self {
            cacheable_tags: HashSet::new(),
            max_cache_age: Duration::from_secs(60),
            fallback_chain: Vec::new(),
        }
    }

    /// Marks an operation tag as cacheable.
    pub fn cacheable_tag(mut self, tag: impl Into<String>) -> Self {
        self.cacheable_tags.insert(tag.into());
        self
    }

    /// Sets the cache TTL for this target.
    pub fn max_cache_age(mut self, age: Duration) -> Self {
        self.max_cache_age = age;
        self
    }

    /// Sets the strategy chain.
    pub fn chain(mut self, chain: Vec<StrategySpec>) -> Self {
        self.fallback_chain = chain;
        self
    }
}

pub(crate) struct EngineShared {
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) cache: Arc<ResponseCache>,
    pub(crate) queues: Arc<OfflineQueues>,
    policies: RwLock<HashMap<String, TargetPolicy>>,
    simplified: RwLock<HashMap<(String, String), ProducerFn>>,
    providers: RwLock<HashMap<String, ProducerFn>>,
    alternative: RwLock<Option<Arc<dyn AlternativeCaller>>>,
    listeners: RwLock<EventListeners<FallbackEvent>>,
}

impl EngineShared {
    pub(crate) fn is_cacheable(&self, target: &str, tag: &str) -> bool {
        self.policies
            .read()
            .unwrap()
            .get(target)
            .is_some_and(|policy| policy.cacheable_tags.contains(tag))
    }

    pub(crate) fn simplified_producer(&self, target: &str, tag: &str) -> Option<ProducerFn> {
        self.simplified
            .read()
            .unwrap()
            .get(&(target.to_string(), tag.to_string()))
            .cloned()
    }

    pub(crate) fn has_provider(&self, target: &str) -> bool {
        self.providers.read().unwrap().contains_key(target)
    }

    pub(crate) fn provider(&self, target: &str) -> Option<ProducerFn> {
        self.providers.read().unwrap().get(target).cloned()
    }

    pub(crate) fn alternative_caller(&self) -> Option<Arc<dyn AlternativeCaller>> {
        self.alternative.read().unwrap().clone()
    }
}

/// The fallback strategy engine. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct FallbackEngine {
    shared: Arc<EngineShared>,
}

impl FallbackEngine {
    /// Creates an engine over the given cache and queues.
    pub fn new(
        clock: Arc<dyn Clock>,
        cache: Arc<ResponseCache>,
        queues: Arc<OfflineQueues>,
    ) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                clock,
                cache,
                queues,
                policies: RwLock::new(HashMap::new()),
                simplified: RwLock::new(HashMap::new()),
                providers: RwLock::new(HashMap::new()),
                alternative: RwLock::new(None),
                listeners: RwLock::new(EventListeners::new()),
            }),
        }
    }

    /// Registers (or replaces) a target's fallback policy.
    pub fn register_target(&self, target: &str, policy: TargetPolicy) {
        self.shared
            .policies
            .write()
            .unwrap()
            .insert(target.to_string(), policy);
    }

    /// The target's policy, if registered.
    pub fn policy(&self, target: &str) -> Option<TargetPolicy> {
        self.shared.policies.read().unwrap().get(target).cloned()
    }

    /// True when the tag is in the target's cacheable set.
    pub fn is_cacheable(&self, target: &str, tag: &str) -> bool {
        self.shared.is_cacheable(target, tag)
    }

    /// The target's configured cache TTL.
    pub fn max_cache_age(&self, target: &str) -> Option<Duration> {
        self.shared
            .policies
            .read()
            .unwrap()
            .get(target)
            .map(|policy| policy.max_cache_age)
    }

    /// Registers a simplified producer for (target, tag). The producer must
    /// not perform I/O against the failing target.
    pub fn register_simplified(&self, target: &str, tag: &str, producer: ProducerFn) {
        self.shared
            .simplified
            .write()
            .unwrap()
            .insert((target.to_string(), tag.to_string()), producer);
    }

    /// Registers the provider operation used when this target serves as an
    /// alternative for another.
    pub fn register_provider(&self, target: &str, producer: ProducerFn) {
        self.shared
            .providers
            .write()
            .unwrap()
            .insert(target.to_string(), producer);
    }

    /// The provider operation registered for a target.
    pub fn provider(&self, target: &str) -> Option<ProducerFn> {
        self.shared.provider(target)
    }

    /// Attaches the runtime re-entry seam for the alternative-provider
    /// strategy.
    pub fn set_alternative_caller(&self, caller: Arc<dyn AlternativeCaller>) {
        *self.shared.alternative.write().unwrap() = Some(caller);
    }

    /// Adds an engine event listener.
    pub fn add_listener<L>(&self, listener: L)
    where
        L: EventListener<FallbackEvent> + 'static,
    {
        self.shared.listeners.write().unwrap().add(listener);
    }

    /// The shared response cache.
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.shared.cache
    }

    /// The shared offline queues.
    pub fn queues(&self) -> &Arc<OfflineQueues> {
        &self.shared.queues
    }

    /// Walks the target's chain; first accepting, succeeding strategy wins.
    pub async fn run(&self, ctx: FallbackContext) -> Result<FallbackSuccess, NoFallback> {
        let chain = self
            .policy(&ctx.target)
            .map(|policy| policy.fallback_chain)
            .unwrap_or_default();

        for spec in &chain {
            let strategy = self.resolve(spec);
            if !strategy.can_serve(&ctx) {
                continue;
            }

            match strategy.serve(ctx.clone()).await {
                Ok(success) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        id = %ctx.target,
                        strategy = success.strategy.as_str(),
                        "fallback applied"
                    );

                    #[cfg(feature = "metrics")]
                    metrics::counter!(
                        "aegis_fallbacks_total",
                        "target" => ctx.target.clone(),
                        "strategy" => success.strategy.as_str(),
                        "result" => "applied"
                    )
                    .increment(1);

                    self.shared.listeners.read().unwrap().emit(&FallbackEvent::Applied {
                        target: ctx.target.clone(),
                        at: self.shared.clock.now(),
                        strategy: success.strategy,
                    });
                    return Ok(success);
                }
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        id = %ctx.target,
                        strategy = spec.kind().as_str(),
                        error = %_err,
                        "fallback strategy did not serve"
                    );
                }
            }
        }

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "aegis_fallbacks_total",
            "target" => ctx.target.clone(),
            "result" => "exhausted"
        )
        .increment(1);

        self.shared.listeners.read().unwrap().emit(&FallbackEvent::Exhausted {
            target: ctx.target.clone(),
            at: self.shared.clock.now(),
            kind: ctx.error_kind,
        });

        Err(NoFallback {
            target: ctx.target,
            kind: ctx.error_kind,
        })
    }

    fn resolve(&self, spec: &StrategySpec) -> Box<dyn FallbackStrategy> {
        match spec {
            StrategySpec::CachedResponse => Box::new(strategy::CachedResponse {
                shared: Arc::clone(&self.shared),
            }),
            StrategySpec::AlternativeProvider { target } => Box::new(strategy::AlternativeProvider {
                shared: Arc::clone(&self.shared),
                alternative: target.clone(),
            }),
            StrategySpec::SimplifiedOperation => Box::new(strategy::SimplifiedOperation {
                shared: Arc::clone(&self.shared),
            }),
            StrategySpec::GracefulDegradation { note } => {
                Box::new(strategy::GracefulDegradation { note: note.clone() })
            }
            StrategySpec::QueueDelayed => Box::new(strategy::QueueDelayed {
                shared: Arc::clone(&self.shared),
            }),
            StrategySpec::EmergencyOnly => Box::new(strategy::EmergencyOnly),
            StrategySpec::Static { value } => Box::new(strategy::StaticResponse {
                value: value.clone(),
            }),
        }
    }
}
