//! Per-target counters and rolling latency statistics.
//!
//! The ledger is authoritative for reporting. It is deliberately not the
//! breaker's decision source: the breaker keeps its own consecutive-failure
//! counter so the two cannot race each other into inconsistent decisions.

use crate::clock::Clock;
use crate::error::ErrorKind;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Smoothing factor for the latency EMA, applied on each success.
const EMA_ALPHA: f64 = 0.1;

#[derive(Debug, Default)]
struct StatsInner {
    total: u64,
    successes: u64,
    failures: u64,
    failures_by_kind: [u64; ErrorKind::ALL.len()],
    latency_ema_secs: Option<f64>,
    last_success_at: Option<Duration>,
    last_failure_at: Option<Duration>,
}

/// Point-in-time view of one target's counters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StatsSnapshot {
    /// Total observations (successes plus failures).
    pub total: u64,
    /// Successful observations.
    pub successes: u64,
    /// Failed observations.
    pub failures: u64,
    /// Lifetime failure rate in `[0, 1]`; zero when nothing was observed.
    pub failure_rate: f64,
    /// Rolling latency average, absent until the first success.
    pub latency_ema: Option<Duration>,
    /// Clock offset of the most recent success.
    pub last_success_at: Option<Duration>,
    /// Clock offset of the most recent failure.
    pub last_failure_at: Option<Duration>,
    /// Failure counts broken down by error kind (only non-zero kinds).
    pub failures_by_kind: Vec<(ErrorKind, u64)>,
}

/// Thread-safe per-target statistics.
pub struct Ledger {
    clock: Arc<dyn Clock>,
    targets: RwLock<HashMap<String, Arc<Mutex<StatsInner>>>>,
}

impl Ledger {
    /// Creates an empty ledger.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            targets: RwLock::new(HashMap::new()),
        }
    }

    fn entry(&self, target: &str) -> Arc<Mutex<StatsInner>> {
        if let Some(stats) = self.targets.read().unwrap().get(target) {
            return Arc::clone(stats);
        }
        let mut targets = self.targets.write().unwrap();
        Arc::clone(
            targets
                .entry(target.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(StatsInner::default()))),
        )
    }

    /// Records a successful observation and folds the latency into the EMA.
    pub fn record_success(&self, target: &str, latency: Duration) {
        let entry = self.entry(target);
        let mut stats = entry.lock().unwrap();
        stats.total += 1;
        stats.successes += 1;
        stats.last_success_at = Some(self.clock.now());

        let sample = latency.as_secs_f64();
        stats.latency_ema_secs = Some(match stats.latency_ema_secs {
            Some(ema) => EMA_ALPHA * sample + (1.0 - EMA_ALPHA) * ema,
            None => sample,
        });

        #[cfg(feature = "metrics")]
        {
            metrics::counter!(
                "aegis_calls_total",
                "target" => target.to_string(),
                "outcome" => "success"
            )
            .increment(1);
            metrics::histogram!(
                "aegis_call_duration_seconds",
                "target" => target.to_string()
            )
            .record(sample);
        }
    }

    /// Records a failed observation of the given kind. Failures never move
    /// the latency EMA.
    pub fn record_failure(&self, target: &str, kind: ErrorKind) {
        let entry = self.entry(target);
        let mut stats = entry.lock().unwrap();
        stats.total += 1;
        stats.failures += 1;
        stats.failures_by_kind[kind.index()] += 1;
        stats.last_failure_at = Some(self.clock.now());

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "aegis_calls_total",
            "target" => target.to_string(),
            "outcome" => "failure",
            "kind" => kind.as_str()
        )
        .increment(1);
    }

    /// Clears one target's counters.
    pub fn reset(&self, target: &str) {
        let entry = self.entry(target);
        *entry.lock().unwrap() = StatsInner::default();
    }

    /// Snapshot of one target, if it has ever been observed.
    pub fn snapshot(&self, target: &str) -> Option<StatsSnapshot> {
        let stats = {
            let targets = self.targets.read().unwrap();
            Arc::clone(targets.get(target)?)
        };
        let stats = stats.lock().unwrap();
        Some(Self::snapshot_inner(&stats))
    }

    /// Snapshot of every known target.
    pub fn snapshot_all(&self) -> HashMap<String, StatsSnapshot> {
        let targets = self.targets.read().unwrap();
        targets
            .iter()
            .map(|(id, stats)| {
                let stats = stats.lock().unwrap();
                (id.clone(), Self::snapshot_inner(&stats))
            })
            .collect()
    }

    fn snapshot_inner(stats: &StatsInner) -> StatsSnapshot {
        let failure_rate = if stats.total > 0 {
            stats.failures as f64 / stats.total as f64
        } else {
            0.0
        };
        StatsSnapshot {
            total: stats.total,
            successes: stats.successes,
            failures: stats.failures,
            failure_rate,
            latency_ema: stats.latency_ema_secs.map(Duration::from_secs_f64),
            last_success_at: stats.last_success_at,
            last_failure_at: stats.last_failure_at,
            failures_by_kind: ErrorKind::ALL
                .iter()
                .filter_map(|kind| {
                    let count = stats.failures_by_kind[kind.index()];
                    (count > 0).then_some((*kind, count))
                })
                .collect(),
        }
    }
}
