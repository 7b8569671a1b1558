//! The assembled control plane.

use crate::events::PlaneEvent;
use crate::target::{TargetConfigUpdate, TargetSpec};
use aegis_breaker::{
    BreakerEvent, BreakerRegistry, BreakerSnapshot, BreakerState, BreakerStore,
};
use aegis_core::{
    validate_timeout, BoxError, CancelToken, Clock, ConfigError, FinalError, FnListener, Ledger,
    ModeHandle, StatsSnapshot, SystemHealthSnapshot, SystemMode, TargetInfo, Tier, TokioClock,
};
use aegis_fallback::{FallbackEngine, OfflineQueues, ProducerFn, ResponseCache};
use aegis_monitor::{
    ActionHandler, ContinuityRule, HealthMonitor, ModeConfig, ModeController, ModeEvent,
    MonitorConfig, RedeliveryHandler,
};
use aegis_runtime::{ExecuteOptions, ExecuteOutcome, Runtime};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;

/// Per-target view combining breaker and ledger state.
#[derive(Debug, Clone)]
pub struct TargetMetrics {
    /// Breaker state at snapshot time.
    pub state: BreakerState,
    /// Breaker counters and deadlines.
    pub breaker: BreakerSnapshot,
    /// Ledger counters, absent until the target has been observed.
    pub stats: Option<StatsSnapshot>,
}

/// Snapshot of every registered target.
#[derive(Debug, Clone, Default)]
pub struct PlaneMetrics {
    /// Metrics keyed by target id.
    pub targets: HashMap<String, TargetMetrics>,
}

struct CatalogEntry {
    tier: Tier,
    critical_service: bool,
    business_impact_per_minute: f64,
    dependencies: Vec<String>,
    queue_bound: usize,
}

struct PlaneInner {
    clock: Arc<dyn Clock>,
    ledger: Arc<Ledger>,
    registry: Arc<BreakerRegistry>,
    engine: FallbackEngine,
    runtime: Runtime,
    controller: Arc<ModeController>,
    monitor: Arc<HealthMonitor>,
    events: broadcast::Sender<PlaneEvent>,
    catalog: RwLock<HashMap<String, CatalogEntry>>,
}

/// The resilience control plane: one handle wiring the breaker registry,
/// the metrics ledger, the fallback engine, the protected-execution
/// runtime, the health monitor, and the system mode controller.
///
/// Cheap to clone; all clones share state.
///
/// ```rust
/// use aegis::{ControlPlane, TargetSpec};
/// use aegis_core::{CancelToken, Tier};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let plane = ControlPlane::builder().build();
/// plane.register_target("users-db", TargetSpec::builder(Tier::Critical).build()?)?;
///
/// let cancel = CancelToken::new();
/// let outcome = plane
///     .execute(
///         "users-db",
///         || Box::pin(async { Ok(json!({"id": 1})) }),
///         Default::default(),
///         &cancel,
///     )
///     .await?;
/// assert_eq!(outcome.value(), &json!({"id": 1}));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ControlPlane {
    inner: Arc<PlaneInner>,
}

impl ControlPlane {
    /// Returns a builder with default configuration.
    pub fn builder() -> ControlPlaneBuilder {
        ControlPlaneBuilder::new()
    }

    /// Registers a target, or updates its configuration if it already
    /// exists; re-registration leaves breaker state intact.
    pub fn register_target(&self, id: &str, spec: TargetSpec) -> Result<(), ConfigError> {
        let inner = &self.inner;

        inner.registry.register(id, spec.tier, spec.breaker.clone());
        inner.engine.register_target(
            id,
            aegis_fallback::TargetPolicy {
                cacheable_tags: spec.cacheable_tags.clone(),
                max_cache_age: spec.max_cache_age,
                fallback_chain: spec.fallback_chain.clone(),
            },
        );
        inner.engine.queues().register(id, spec.queue_bound);
        inner.monitor.register_target(
            TargetInfo {
                id: id.to_string(),
                tier: spec.tier,
                critical_service: spec.critical_service,
                business_impact_per_minute: spec.business_impact_per_minute,
                dependencies: spec.dependencies.clone(),
            },
            spec.probe.clone(),
        );

        inner.catalog.write().unwrap().insert(
            id.to_string(),
            CatalogEntry {
                tier: spec.tier,
                critical_service: spec.critical_service,
                business_impact_per_minute: spec.business_impact_per_minute,
                dependencies: spec.dependencies,
                queue_bound: spec.queue_bound,
            },
        );
        Ok(())
    }

    /// Applies a field-wise partial config update. Affects subsequent
    /// calls only.
    pub fn update_config(&self, id: &str, update: TargetConfigUpdate) -> Result<(), ConfigError> {
        let inner = &self.inner;
        let mut catalog = inner.catalog.write().unwrap();
        let entry = catalog
            .get_mut(id)
            .ok_or_else(|| ConfigError::UnknownTarget(id.to_string()))?;

        let current = inner
            .registry
            .config(id)
            .ok_or_else(|| ConfigError::UnknownTarget(id.to_string()))?;
        let mut breaker = (*current).clone();
        if let Some(threshold) = update.failure_threshold {
            if threshold == 0 {
                return Err(ConfigError::ZeroFailureThreshold);
            }
            breaker.failure_threshold = threshold;
        }
        if let Some(cooldown) = update.cooldown {
            breaker.cooldown = cooldown;
        }
        if let Some(budget) = update.half_open_budget {
            if budget == 0 {
                return Err(ConfigError::ZeroProbeBudget);
            }
            breaker.half_open_budget = budget;
        }
        if let Some(timeout) = update.call_timeout {
            validate_timeout(timeout)?;
            breaker.call_timeout = timeout;
        }

        let tier = update.tier.unwrap_or(entry.tier);
        entry.tier = tier;
        inner.registry.register(id, tier, breaker);

        let mut policy = inner.engine.policy(id).unwrap_or_default();
        if let Some(tags) = update.cacheable_tags {
            policy.cacheable_tags = tags;
        }
        if let Some(age) = update.max_cache_age {
            policy.max_cache_age = age;
        }
        if let Some(chain) = update.fallback_chain {
            policy.fallback_chain = chain;
        }
        inner.engine.register_target(id, policy);

        if let Some(bound) = update.queue_bound {
            entry.queue_bound = bound;
            inner.engine.queues().register(id, bound);
        }

        inner.monitor.update_info(TargetInfo {
            id: id.to_string(),
            tier,
            critical_service: entry.critical_service,
            business_impact_per_minute: entry.business_impact_per_minute,
            dependencies: entry.dependencies.clone(),
        });
        Ok(())
    }

    /// Resets a breaker to closed with cleared counters. Idempotent.
    /// Returns false for unknown targets.
    pub fn reset_breaker(&self, id: &str) -> bool {
        self.inner.registry.reset(id)
    }

    /// Executes one protected call. The hot path; see
    /// [`Runtime::execute`].
    pub async fn execute<F>(
        &self,
        id: &str,
        operation: F,
        options: ExecuteOptions,
        cancel: &CancelToken,
    ) -> Result<ExecuteOutcome, FinalError>
    where
        F: FnMut() -> BoxFuture<'static, Result<Value, BoxError>> + Send,
    {
        self.inner.runtime.execute(id, operation, options, cancel).await
    }

    /// Writes directly into the fallback cache.
    pub fn cache_for(&self, id: &str, key: &str, payload: Value, ttl: Duration) {
        self.inner.engine.cache().put(id, key, payload, ttl);
    }

    /// Reads directly from the fallback cache.
    pub fn get_cached(&self, id: &str, key: &str) -> Option<Value> {
        self.inner.engine.cache().get(id, key)
    }

    /// Removes one cache entry.
    pub fn invalidate_cached(&self, id: &str, key: &str) -> bool {
        self.inner.engine.cache().invalidate(id, key)
    }

    /// Per-target breaker and ledger snapshot.
    pub fn metrics(&self) -> PlaneMetrics {
        let mut stats = self.inner.ledger.snapshot_all();
        let targets = self
            .inner
            .registry
            .snapshot_all()
            .into_iter()
            .map(|(id, breaker)| {
                let stats = stats.remove(&id);
                (
                    id,
                    TargetMetrics {
                        state: breaker.state,
                        breaker,
                        stats,
                    },
                )
            })
            .collect();
        PlaneMetrics { targets }
    }

    /// The latest system health snapshot.
    pub fn system_health(&self) -> SystemHealthSnapshot {
        self.inner.controller.snapshot()
    }

    /// The current system mode.
    pub fn mode(&self) -> SystemMode {
        self.inner.controller.mode()
    }

    /// A read handle on the system mode.
    pub fn mode_handle(&self) -> ModeHandle {
        self.inner.controller.handle()
    }

    /// The breaker state of one target.
    pub fn breaker_state(&self, id: &str) -> Option<BreakerState> {
        self.inner.registry.state(id)
    }

    /// Starts or ends an operator maintenance window.
    pub fn set_maintenance(&self, on: bool, reason: Option<String>) {
        self.inner.controller.set_maintenance(on, reason);
    }

    /// Activates the emergency override.
    pub fn activate_emergency(&self, reason: impl Into<String>, by: Option<String>) {
        self.inner.controller.activate_emergency(reason, by);
    }

    /// Clears the emergency override; the mode leaves Emergency through
    /// Recovery.
    pub fn exit_emergency(&self, by: Option<String>) {
        self.inner.controller.exit_emergency(by);
    }

    /// Subscribes to the unified event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<PlaneEvent> {
        self.inner.events.subscribe()
    }

    /// Registers a simplified producer for (target, tag).
    pub fn register_simplified(&self, id: &str, tag: &str, producer: ProducerFn) {
        self.inner.engine.register_simplified(id, tag, producer);
    }

    /// Registers the provider operation used when `id` serves as an
    /// alternative target.
    pub fn register_provider(&self, id: &str, producer: ProducerFn) {
        self.inner.engine.register_provider(id, producer);
    }

    /// Registers the redelivery handler draining `id`'s offline queue.
    pub fn set_redelivery_handler(&self, id: &str, handler: RedeliveryHandler) {
        self.inner.monitor.set_redelivery_handler(id, handler);
    }

    /// Registers a continuity rule.
    pub fn add_continuity_rule(&self, rule: ContinuityRule) {
        self.inner.controller.add_rule(rule);
    }

    /// Registers the handler behind a continuity-rule action identifier.
    pub fn register_action(&self, name: impl Into<String>, handler: ActionHandler) {
        self.inner.controller.register_action(name, handler);
    }

    /// Spawns the background monitor loop; cancel the returned token to
    /// stop it.
    pub fn start_monitor(&self) -> CancelToken {
        let cancel = CancelToken::new();
        let monitor = Arc::clone(&self.inner.monitor);
        let token = cancel.clone();
        tokio::spawn(async move {
            monitor.run(token).await;
        });
        cancel
    }

    /// Runs one monitor cycle inline and returns the resulting snapshot.
    /// Useful in tests and for explicit-request evaluation.
    pub async fn run_monitor_cycle(&self) -> SystemHealthSnapshot {
        self.inner.monitor.cycle().await
    }

    /// The clock the plane was built with.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    /// Depth of one target's offline queue.
    pub fn queue_len(&self, id: &str) -> usize {
        self.inner.engine.queues().len(id)
    }
}

/// Builder for [`ControlPlane`].
pub struct ControlPlaneBuilder {
    clock: Option<Arc<dyn Clock>>,
    cache_capacity: usize,
    monitor: MonitorConfig,
    mode: ModeConfig,
    store: Option<Arc<dyn BreakerStore>>,
}

impl ControlPlaneBuilder {
    /// Creates a builder with default values.
    pub fn new() -> Self {
        Self {
            clock: None,
            cache_capacity: 1024,
            monitor: MonitorConfig::default(),
            mode: ModeConfig::default(),
            store: None,
        }
    }

    /// Substitutes the clock. Default: [`TokioClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Bounds the fallback cache. Default: 1024 entries.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Monitor cadence. Default: 30 s cycles, 5 s probe timeout.
    pub fn monitor_config(mut self, config: MonitorConfig) -> Self {
        self.monitor = config;
        self
    }

    /// Mode thresholds. Default: 40 / 80 / 60 percent.
    pub fn mode_config(mut self, config: ModeConfig) -> Self {
        self.mode = config;
        self
    }

    /// Attaches best-effort breaker state persistence.
    pub fn breaker_store(mut self, store: Arc<dyn BreakerStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Wires and returns the plane.
    pub fn build(self) -> ControlPlane {
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(TokioClock::new()) as Arc<dyn Clock>);
        let (events_tx, _events_rx) = broadcast::channel(256);

        let ledger = Arc::new(Ledger::new(Arc::clone(&clock)));
        let cache = Arc::new(ResponseCache::new(Arc::clone(&clock), self.cache_capacity));
        let queues = Arc::new(OfflineQueues::new(Arc::clone(&clock)));

        let mut registry = BreakerRegistry::new(Arc::clone(&clock));
        if let Some(store) = self.store {
            registry = registry.with_store(store);
        }
        let bridge = events_tx.clone();
        registry.add_listener(FnListener::new(move |event: &BreakerEvent| {
            let plane_event = match event {
                BreakerEvent::Opened { target, at } => PlaneEvent::BreakerOpened {
                    target: target.clone(),
                    at: *at,
                },
                BreakerEvent::Closed { target, at } => PlaneEvent::BreakerClosed {
                    target: target.clone(),
                    at: *at,
                },
                BreakerEvent::HalfOpened { target, at } => PlaneEvent::BreakerHalfOpen {
                    target: target.clone(),
                    at: *at,
                },
                BreakerEvent::Reset { target, at } => PlaneEvent::BreakerReset {
                    target: target.clone(),
                    at: *at,
                },
                BreakerEvent::CallRejected { .. } => return,
            };
            let _ = bridge.send(plane_event);
        }));
        let registry = Arc::new(registry);

        let controller = Arc::new(ModeController::new(
            Arc::clone(&clock),
            Arc::clone(&registry),
            self.mode,
        ));
        let bridge = events_tx.clone();
        controller.add_listener(FnListener::new(move |event: &ModeEvent| {
            let plane_event = match event {
                ModeEvent::Changed { from, to, at } => PlaneEvent::ModeChanged {
                    from: *from,
                    to: *to,
                    at: *at,
                },
                ModeEvent::EmergencyActivated { reason, by, at } => {
                    PlaneEvent::EmergencyActivated {
                        reason: reason.clone(),
                        by: by.clone(),
                        at: *at,
                    }
                }
                ModeEvent::EmergencyExited { by, at } => PlaneEvent::EmergencyExited {
                    by: by.clone(),
                    at: *at,
                },
                ModeEvent::RuleFired { .. } => return,
            };
            let _ = bridge.send(plane_event);
        }));

        let engine = FallbackEngine::new(Arc::clone(&clock), cache, queues);
        let runtime = Runtime::new(
            Arc::clone(&clock),
            Arc::clone(&ledger),
            Arc::clone(&registry),
            engine.clone(),
            controller.handle(),
        );
        engine.set_alternative_caller(Arc::new(runtime.clone()));

        let monitor = Arc::new(HealthMonitor::new(
            Arc::clone(&clock),
            Arc::clone(&ledger),
            Arc::clone(&registry),
            engine.clone(),
            Arc::clone(&controller),
            self.monitor,
        ));

        ControlPlane {
            inner: Arc::new(PlaneInner {
                clock,
                ledger,
                registry,
                engine,
                runtime,
                controller,
                monitor,
                events: events_tx,
                catalog: RwLock::new(HashMap::new()),
            }),
        }
    }
}

impl Default for ControlPlaneBuilder {
    fn default() -> Self {
        Self::new()
    }
}
