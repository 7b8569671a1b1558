//! aegis — a resilience control plane for backend services.
//!
//! aegis supervises outbound calls (databases, caches, HTTP APIs, internal
//! services) and enforces availability policy on top of them. For every
//! protected operation it answers: may this call proceed now? if it fails,
//! what substitute response should the caller receive? when should the
//! subsystem refuse new work? when should the whole process downgrade to a
//! reduced operating mode?
//!
//! ## Components
//!
//! - **Breaker registry** ([`aegis_breaker`]): one consecutive-failure
//!   state machine per target, with cooldowns, half-open probe budgets,
//!   and an emergency tier gate.
//! - **Protected execution** ([`aegis_runtime`]): admission, per-attempt
//!   timeouts, bounded exponential retry, cancellation, and fallback
//!   orchestration around a single call.
//! - **Fallback engine** ([`aegis_fallback`]): cached responses,
//!   alternative providers, simplified operations, graceful degradation,
//!   offline queueing for writes, emergency payloads, static responses.
//! - **Health monitor and mode controller** ([`aegis_monitor`]): periodic
//!   probing, queue draining, and the Normal / Degraded / Emergency /
//!   Maintenance / Recovery system mode.
//!
//! [`ControlPlane`] wires all of it behind one handle:
//!
//! ```rust
//! use aegis::{ControlPlane, ExecuteOptions, StrategySpec, TargetSpec};
//! use aegis_core::{CancelToken, Tier};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let plane = ControlPlane::builder().build();
//!
//! plane.register_target(
//!     "catalog-api",
//!     TargetSpec::builder(Tier::Essential)
//!         .cacheable_tag("get-product")
//!         .max_cache_age(Duration::from_secs(120))
//!         .fallback_chain(vec![
//!             StrategySpec::CachedResponse,
//!             StrategySpec::GracefulDegradation { note: None },
//!         ])
//!         .build()?,
//! )?;
//!
//! let cancel = CancelToken::new();
//! let outcome = plane
//!     .execute(
//!         "catalog-api",
//!         || Box::pin(async { Ok(json!({"sku": "A-7"})) }),
//!         ExecuteOptions::new()
//!             .operation_tag("get-product")
//!             .cache_key("product:A-7"),
//!         &cancel,
//!     )
//!     .await?;
//!
//! assert!(!outcome.is_fallback());
//! # Ok(())
//! # }
//! ```

mod events;
mod plane;
mod target;

pub use events::PlaneEvent;
pub use plane::{ControlPlane, ControlPlaneBuilder, PlaneMetrics, TargetMetrics};
pub use target::{TargetConfigUpdate, TargetSpec, TargetSpecBuilder};

pub use aegis_breaker::{
    Admission, BreakerConfig, BreakerEvent, BreakerRegistry, BreakerSnapshot, BreakerState,
    BreakerStore, InMemoryBreakerStore, Outcome, PersistedBreaker, RejectReason,
};
pub use aegis_core::{
    BoxError, CallError, CancelToken, Clock, ConfigError, ErrorKind, FinalError, Ledger,
    ManualClock, ModeHandle, StatsSnapshot, SystemHealthSnapshot, SystemMode, TargetInfo, Tier,
    TierHealth, TokioClock,
};
pub use aegis_fallback::{
    CacheStats, FallbackContext, FallbackEngine, FallbackStrategy, FallbackSuccess, Marks,
    NoFallback, OfflineQueues, ProducerFn, QueueAck, QueueEntry, ResponseCache, StrategyKind,
    StrategySpec, TargetPolicy,
};
pub use aegis_monitor::{
    ActionHandler, ContinuityRule, HealthMonitor, HealthStatus, ModeConfig, ModeController,
    MonitorConfig, Probe, RedeliveryHandler,
};
pub use aegis_runtime::{BackoffPolicy, ExecuteOptions, ExecuteOutcome, Runtime};
