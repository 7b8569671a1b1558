//! The strategy trait and the built-in substitute-response producers.

use crate::context::FallbackContext;
use crate::error::StrategyError;
use crate::EngineShared;
use aegis_core::SystemMode;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::sync::Arc;

/// Identifies a strategy in results, events, and configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StrategyKind {
    /// Serve a previously cached response.
    CachedResponse,
    /// Re-enter the runtime against an alternative target.
    AlternativeProvider,
    /// Run a registered simplified producer.
    SimplifiedOperation,
    /// Serve a structured payload naming the limitation.
    GracefulDegradation,
    /// Queue the payload for later redelivery.
    QueueDelayed,
    /// Minimal emergency-mode payload.
    EmergencyOnly,
    /// Serve a configured static response.
    Static,
}

impl StrategyKind {
    /// Stable label for events and assertions.
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::CachedResponse => "cached-response",
            StrategyKind::AlternativeProvider => "alternative-provider",
            StrategyKind::SimplifiedOperation => "simplified-operation",
            StrategyKind::GracefulDegradation => "graceful-degradation",
            StrategyKind::QueueDelayed => "queue-delayed",
            StrategyKind::EmergencyOnly => "emergency-only",
            StrategyKind::Static => "static",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a target's configured fallback chain.
#[derive(Debug, Clone)]
pub enum StrategySpec {
    /// Serve from the response cache.
    CachedResponse,
    /// Re-enter the runtime against the named target.
    AlternativeProvider {
        /// The substitute target.
        target: String,
    },
    /// Run the simplified producer registered for the target and tag.
    SimplifiedOperation,
    /// Serve a degraded payload; `note` names the limitation.
    GracefulDegradation {
        /// Human-readable limitation description.
        note: Option<String>,
    },
    /// Queue the write payload for redelivery.
    QueueDelayed,
    /// Serve a minimal emergency payload when the system mode is Emergency.
    EmergencyOnly,
    /// Serve the configured value.
    Static {
        /// The response to serve.
        value: Value,
    },
}

impl StrategySpec {
    /// The kind this spec resolves to.
    pub fn kind(&self) -> StrategyKind {
        match self {
            StrategySpec::CachedResponse => StrategyKind::CachedResponse,
            StrategySpec::AlternativeProvider { .. } => StrategyKind::AlternativeProvider,
            StrategySpec::SimplifiedOperation => StrategyKind::SimplifiedOperation,
            StrategySpec::GracefulDegradation { .. } => StrategyKind::GracefulDegradation,
            StrategySpec::QueueDelayed => StrategyKind::QueueDelayed,
            StrategySpec::EmergencyOnly => StrategyKind::EmergencyOnly,
            StrategySpec::Static { .. } => StrategyKind::Static,
        }
    }
}

/// Flags distinguishing a fallback result from a primary success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Marks {
    /// The value came from the response cache.
    pub cache_hit: bool,
    /// The value is a reduced-fidelity substitute.
    pub degraded: bool,
    /// The operation was queued rather than performed.
    pub queued: bool,
    /// The value is an emergency-mode placeholder.
    pub emergency: bool,
}

/// A substitute response produced by a strategy. Always distinguishable
/// from a primary success: the strategy name and marks travel with it.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackSuccess {
    /// The strategy that produced the value.
    pub strategy: StrategyKind,
    /// The substitute payload.
    pub value: Value,
    /// Result marks.
    pub marks: Marks,
}

/// A pluggable substitute-response producer.
///
/// The engine walks a target's configured chain in order; the first
/// strategy whose [`FallbackStrategy::can_serve`] accepts the context and
/// whose [`FallbackStrategy::serve`] succeeds wins.
pub trait FallbackStrategy: Send + Sync {
    /// The strategy's kind.
    fn kind(&self) -> StrategyKind;

    /// Whether this strategy can serve the given error context.
    fn can_serve(&self, ctx: &FallbackContext) -> bool;

    /// Produces the substitute response.
    fn serve(&self, ctx: FallbackContext) -> BoxFuture<'static, Result<FallbackSuccess, StrategyError>>;
}

pub(crate) struct CachedResponse {
    pub(crate) shared: Arc<EngineShared>,
}

impl FallbackStrategy for CachedResponse {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CachedResponse
    }

    fn can_serve(&self, ctx: &FallbackContext) -> bool {
        let (Some(tag), Some(key)) = (&ctx.operation_tag, &ctx.cache_key) else {
            return false;
        };
        self.shared.is_cacheable(&ctx.target, tag) && self.shared.cache.contains_fresh(&ctx.target, key)
    }

    fn serve(&self, ctx: FallbackContext) -> BoxFuture<'static, Result<FallbackSuccess, StrategyError>> {
        let shared = Arc::clone(&self.shared);
        Box::pin(async move {
            let key = ctx
                .cache_key
                .as_deref()
                .ok_or_else(|| StrategyError::Declined("no cache key".into()))?;
            let value = shared
                .cache
                .get(&ctx.target, key)
                .ok_or_else(|| StrategyError::Declined("cache entry gone".into()))?;
            Ok(FallbackSuccess {
                strategy: StrategyKind::CachedResponse,
                value,
                marks: Marks {
                    cache_hit: true,
                    ..Marks::default()
                },
            })
        })
    }
}

pub(crate) struct AlternativeProvider {
    pub(crate) shared: Arc<EngineShared>,
    pub(crate) alternative: String,
}

impl FallbackStrategy for AlternativeProvider {
    fn kind(&self) -> StrategyKind {
        StrategyKind::AlternativeProvider
    }

    fn can_serve(&self, ctx: &FallbackContext) -> bool {
        // Re-entry is depth-limited to one level.
        ctx.depth == 0
            && self.shared.alternative_caller().is_some()
            && self.shared.has_provider(&self.alternative)
    }

    fn serve(&self, ctx: FallbackContext) -> BoxFuture<'static, Result<FallbackSuccess, StrategyError>> {
        let shared = Arc::clone(&self.shared);
        let alternative = self.alternative.clone();
        Box::pin(async move {
            let caller = shared
                .alternative_caller()
                .ok_or_else(|| StrategyError::Declined("no runtime attached".into()))?;
            let value = caller
                .call_alternative(alternative, ctx)
                .await
                .map_err(|err| StrategyError::Failed(err.to_string()))?;
            Ok(FallbackSuccess {
                strategy: StrategyKind::AlternativeProvider,
                value,
                marks: Marks::default(),
            })
        })
    }
}

pub(crate) struct SimplifiedOperation {
    pub(crate) shared: Arc<EngineShared>,
}

impl FallbackStrategy for SimplifiedOperation {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SimplifiedOperation
    }

    fn can_serve(&self, ctx: &FallbackContext) -> bool {
        ctx.operation_tag
            .as_deref()
            .is_some_and(|tag| self.shared.simplified_producer(&ctx.target, tag).is_some())
    }

    fn serve(&self, ctx: FallbackContext) -> BoxFuture<'static, Result<FallbackSuccess, StrategyError>> {
        let shared = Arc::clone(&self.shared);
        Box::pin(async move {
            let tag = ctx
                .operation_tag
                .as_deref()
                .ok_or_else(|| StrategyError::Declined("no operation tag".into()))?;
            let producer = shared
                .simplified_producer(&ctx.target, tag)
                .ok_or_else(|| StrategyError::Declined("no simplified producer".into()))?;
            let value = producer(ctx.clone())
                .await
                .map_err(|err| StrategyError::Failed(err.to_string()))?;
            Ok(FallbackSuccess {
                strategy: StrategyKind::SimplifiedOperation,
                value,
                marks: Marks {
                    degraded: true,
                    ..Marks::default()
                },
            })
        })
    }
}

pub(crate) struct GracefulDegradation {
    pub(crate) note: Option<String>,
}

impl FallbackStrategy for GracefulDegradation {
    fn kind(&self) -> StrategyKind {
        StrategyKind::GracefulDegradation
    }

    fn can_serve(&self, _ctx: &FallbackContext) -> bool {
        true
    }

    fn serve(&self, ctx: FallbackContext) -> BoxFuture<'static, Result<FallbackSuccess, StrategyError>> {
        let note = self
            .note
            .clone()
            .unwrap_or_else(|| "service degraded; partial data only".to_string());
        Box::pin(async move {
            let value = json!({
                "degraded": true,
                "limitations": note,
                "target": ctx.target,
                "data": ctx.degraded_data.unwrap_or(Value::Null),
            });
            Ok(FallbackSuccess {
                strategy: StrategyKind::GracefulDegradation,
                value,
                marks: Marks {
                    degraded: true,
                    ..Marks::default()
                },
            })
        })
    }
}

pub(crate) struct QueueDelayed {
    pub(crate) shared: Arc<EngineShared>,
}

impl FallbackStrategy for QueueDelayed {
    fn kind(&self) -> StrategyKind {
        StrategyKind::QueueDelayed
    }

    fn can_serve(&self, ctx: &FallbackContext) -> bool {
        ctx.payload.is_some() && self.shared.queues.is_registered(&ctx.target)
    }

    fn serve(&self, ctx: FallbackContext) -> BoxFuture<'static, Result<FallbackSuccess, StrategyError>> {
        let shared = Arc::clone(&self.shared);
        Box::pin(async move {
            let payload = ctx
                .payload
                .clone()
                .ok_or_else(|| StrategyError::Declined("no payload to queue".into()))?;
            let tag = ctx.operation_tag.clone().unwrap_or_default();
            let ack = shared
                .queues
                .enqueue(&ctx.target, &tag, payload, ctx.priority)
                .ok_or_else(|| StrategyError::Failed("queue refused the entry".into()))?;
            Ok(FallbackSuccess {
                strategy: StrategyKind::QueueDelayed,
                value: json!({
                    "queued": true,
                    "queue_position": ack.position,
                    "queue_depth": ack.depth,
                }),
                marks: Marks {
                    queued: true,
                    ..Marks::default()
                },
            })
        })
    }
}

pub(crate) struct EmergencyOnly;

impl FallbackStrategy for EmergencyOnly {
    fn kind(&self) -> StrategyKind {
        StrategyKind::EmergencyOnly
    }

    fn can_serve(&self, ctx: &FallbackContext) -> bool {
        ctx.mode == SystemMode::Emergency
    }

    fn serve(&self, ctx: FallbackContext) -> BoxFuture<'static, Result<FallbackSuccess, StrategyError>> {
        Box::pin(async move {
            let value = json!({
                "emergency": true,
                "requires_manual_verification": true,
                "target": ctx.target,
                "operation_tag": ctx.operation_tag,
            });
            Ok(FallbackSuccess {
                strategy: StrategyKind::EmergencyOnly,
                value,
                marks: Marks {
                    emergency: true,
                    ..Marks::default()
                },
            })
        })
    }
}

pub(crate) struct StaticResponse {
    pub(crate) value: Value,
}

impl FallbackStrategy for StaticResponse {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Static
    }

    fn can_serve(&self, _ctx: &FallbackContext) -> bool {
        true
    }

    fn serve(&self, _ctx: FallbackContext) -> BoxFuture<'static, Result<FallbackSuccess, StrategyError>> {
        let value = self.value.clone();
        Box::pin(async move {
            Ok(FallbackSuccess {
                strategy: StrategyKind::Static,
                value,
                marks: Marks::default(),
            })
        })
    }
}
