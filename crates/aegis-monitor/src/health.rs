//! The periodic health monitor.
//!
//! Probes registered targets (or derives health from breaker state),
//! records probe outcomes in the metrics ledger only, nudges recovered
//! breakers toward half-open, drains offline queues once a target's
//! breaker is closed again, sweeps the response cache, and hands a fresh
//! tier tally to the mode controller each cycle.

use crate::events::MonitorEvent;
use crate::mode::{ModeController, TierTallies};
use aegis_breaker::{Admission, BreakerRegistry, BreakerState, Outcome};
use aegis_core::{
    BoxError, CancelToken, Clock, ErrorKind, EventListener, EventListeners, Ledger,
    SystemHealthSnapshot, TargetInfo, Tier,
};
use aegis_fallback::{FallbackEngine, QueueEntry};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Health reported by a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// The target responds normally.
    Healthy,
    /// The target responds, but degraded.
    Degraded,
    /// The target is down.
    Unhealthy,
}

impl HealthStatus {
    /// Whether the target is usable (healthy or degraded).
    pub fn is_usable(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }

    /// Whether the target is fully healthy.
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// A caller-supplied health probe for one target.
///
/// Closures returning a future work directly:
///
/// ```rust
/// use aegis_monitor::{HealthStatus, Probe};
///
/// let probe = || async { HealthStatus::Healthy };
/// let _boxed: Box<dyn Probe> = Box::new(probe);
/// ```
pub trait Probe: Send + Sync {
    /// Checks the target's health.
    fn probe(&self) -> BoxFuture<'static, HealthStatus>;
}

impl<F, Fut> Probe for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = HealthStatus> + Send + 'static,
{
    fn probe(&self) -> BoxFuture<'static, HealthStatus> {
        Box::pin(self())
    }
}

/// Redelivers one queued entry once its target is reachable again.
pub type RedeliveryHandler =
    Arc<dyn Fn(QueueEntry) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync>;

/// Monitor cadence configuration.
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    /// Time between cycles.
    pub interval: Duration,
    /// Timeout applied to each probe invocation.
    pub probe_timeout: Duration,
}

impl MonitorConfig {
    /// Sets the cycle interval.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the per-probe timeout.
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

struct MonitoredTarget {
    info: TargetInfo,
    probe: Option<Arc<dyn Probe>>,
    drain: Option<RedeliveryHandler>,
    healthy: bool,
}

/// The periodic health monitor.
pub struct HealthMonitor {
    clock: Arc<dyn Clock>,
    ledger: Arc<Ledger>,
    registry: Arc<BreakerRegistry>,
    engine: FallbackEngine,
    controller: Arc<ModeController>,
    config: MonitorConfig,
    targets: Mutex<HashMap<String, MonitoredTarget>>,
    listeners: RwLock<EventListeners<MonitorEvent>>,
}

impl HealthMonitor {
    /// Creates a monitor over the given components.
    pub fn new(
        clock: Arc<dyn Clock>,
        ledger: Arc<Ledger>,
        registry: Arc<BreakerRegistry>,
        engine: FallbackEngine,
        controller: Arc<ModeController>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            clock,
            ledger,
            registry,
            engine,
            controller,
            config,
            targets: Mutex::new(HashMap::new()),
            listeners: RwLock::new(EventListeners::new()),
        }
    }

    /// Registers a target for monitoring, or updates its descriptor and
    /// probe on re-registration.
    pub fn register_target(&self, info: TargetInfo, probe: Option<Arc<dyn Probe>>) {
        let mut targets = self.targets.lock().unwrap();
        match targets.get_mut(&info.id) {
            Some(existing) => {
                existing.info = info;
                existing.probe = probe;
            }
            None => {
                let id = info.id.clone();
                targets.insert(
                    id,
                    MonitoredTarget {
                        info,
                        probe,
                        drain: None,
                        healthy: true,
                    },
                );
            }
        }
    }

    /// Updates a target's descriptor, leaving its probe and redelivery
    /// handler in place.
    pub fn update_info(&self, info: TargetInfo) {
        if let Some(entry) = self.targets.lock().unwrap().get_mut(&info.id) {
            entry.info = info;
        }
    }

    /// Registers the redelivery handler used to drain a target's offline
    /// queue.
    pub fn set_redelivery_handler(&self, target: &str, handler: RedeliveryHandler) {
        if let Some(entry) = self.targets.lock().unwrap().get_mut(target) {
            entry.drain = Some(handler);
        }
    }

    /// Adds a monitor event listener.
    pub fn add_listener<L>(&self, listener: L)
    where
        L: EventListener<MonitorEvent> + 'static,
    {
        self.listeners.write().unwrap().add(listener);
    }

    /// The target's healthy flag as of the last cycle.
    pub fn is_healthy(&self, target: &str) -> Option<bool> {
        self.targets
            .lock()
            .unwrap()
            .get(target)
            .map(|entry| entry.healthy)
    }

    /// Runs cycles at the configured interval until cancelled.
    pub async fn run(&self, cancel: CancelToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.clock.sleep(self.config.interval) => {
                    self.cycle().await;
                }
            }
        }
    }

    /// Runs one full monitor cycle and returns the resulting snapshot.
    pub async fn cycle(&self) -> SystemHealthSnapshot {
        struct CycleEntry {
            id: String,
            tier: Tier,
            impact: f64,
            probe: Option<Arc<dyn Probe>>,
            drain: Option<RedeliveryHandler>,
        }

        let entries: Vec<CycleEntry> = {
            let targets = self.targets.lock().unwrap();
            targets
                .values()
                .map(|entry| CycleEntry {
                    id: entry.info.id.clone(),
                    tier: entry.info.tier,
                    impact: entry.info.business_impact_per_minute,
                    probe: entry.probe.clone(),
                    drain: entry.drain.clone(),
                })
                .collect()
        };

        let mut tallies = TierTallies::default();
        let mut impact = 0.0;
        let mut flags: Vec<(String, bool)> = Vec::with_capacity(entries.len());

        for entry in &entries {
            let state = self
                .registry
                .state(&entry.id)
                .unwrap_or(BreakerState::Closed);

            let healthy = match &entry.probe {
                Some(probe) => self.run_probe(&entry.id, probe).await,
                // No probe: derive from breaker state. Half-open counts as
                // unhealthy for system-mode purposes.
                None => state == BreakerState::Closed,
            };

            if state == BreakerState::Open && healthy {
                self.registry.nudge_half_open(&entry.id);
            }

            if state == BreakerState::Closed && !self.engine.queues().is_empty(&entry.id) {
                if let Some(handler) = &entry.drain {
                    self.drain_queue(&entry.id, handler).await;
                }
            }

            let tier = match entry.tier {
                Tier::Critical => &mut tallies.critical,
                Tier::Essential => &mut tallies.essential,
                Tier::Standard => &mut tallies.standard,
                Tier::Optional => &mut tallies.optional,
            };
            tier.total += 1;
            if healthy {
                tier.healthy += 1;
            } else {
                impact += entry.impact;
            }
            flags.push((entry.id.clone(), healthy));
        }

        {
            let mut targets = self.targets.lock().unwrap();
            for (id, healthy) in flags {
                if let Some(entry) = targets.get_mut(&id) {
                    entry.healthy = healthy;
                }
            }
        }

        let swept = self.engine.cache().sweep();

        #[cfg(feature = "tracing")]
        tracing::debug!(targets = entries.len(), swept, "monitor cycle");
        #[cfg(not(feature = "tracing"))]
        let _ = swept;

        let snapshot = self.controller.evaluate_cycle(tallies, impact);

        self.listeners
            .read()
            .unwrap()
            .emit(&MonitorEvent::CycleCompleted {
                at: self.clock.now(),
                targets: entries.len(),
                mode: snapshot.mode,
            });

        snapshot
    }

    /// Runs one probe with the configured timeout. Outcomes land in the
    /// ledger only; probes never open the breaker.
    async fn run_probe(&self, target: &str, probe: &Arc<dyn Probe>) -> bool {
        let started = self.clock.now();
        let status = tokio::select! {
            status = probe.probe() => status,
            _ = self.clock.sleep(self.config.probe_timeout) => HealthStatus::Unhealthy,
        };
        let elapsed = self.clock.now().saturating_sub(started);

        if status.is_usable() {
            self.ledger.record_success(target, elapsed);
        } else {
            self.ledger
                .record_failure(target, ErrorKind::RemoteUnavailable);
        }
        status.is_usable()
    }

    /// Drains queued entries through the redelivery handler while the
    /// breaker keeps admitting. Stops at the first failure or rejection,
    /// restoring the entry it was working on.
    async fn drain_queue(&self, target: &str, handler: &RedeliveryHandler) {
        let Some(config) = self.registry.config(target) else {
            return;
        };
        let timeout = config.call_timeout;

        while let Some(entry) = self.engine.queues().pop_next(target) {
            match self.registry.admit(target) {
                Some(Admission::Admitted) => {
                    let started = self.clock.now();
                    let outcome = tokio::select! {
                        result = handler(entry.clone()) => Some(result),
                        _ = self.clock.sleep(timeout) => None,
                    };
                    let elapsed = self.clock.now().saturating_sub(started);

                    match outcome {
                        Some(Ok(_)) => {
                            self.registry.observe(target, Outcome::Success(elapsed));
                            self.ledger.record_success(target, elapsed);
                        }
                        Some(Err(_err)) => {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(id = target, error = %_err, "queue redelivery failed");

                            self.registry
                                .observe(target, Outcome::Failure(ErrorKind::RemoteError));
                            self.ledger.record_failure(target, ErrorKind::RemoteError);
                            self.engine.queues().restore(entry);
                            break;
                        }
                        None => {
                            self.registry
                                .observe(target, Outcome::Failure(ErrorKind::Timeout));
                            self.ledger.record_failure(target, ErrorKind::Timeout);
                            self.engine.queues().restore(entry);
                            break;
                        }
                    }
                }
                _ => {
                    self.engine.queues().restore(entry);
                    break;
                }
            }
        }
    }
}
