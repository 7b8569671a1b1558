//! Core infrastructure for the aegis resilience control plane.
//!
//! This crate carries the pieces every other aegis crate builds on:
//!
//! - [`Clock`]: the single source of monotonic time and timers. Nothing in
//!   the workspace reads wall-clock time; tests substitute a [`ManualClock`]
//!   or run under a paused tokio runtime.
//! - [`Ledger`]: thread-safe per-target counters and rolling latency
//!   statistics. Reporting-authoritative, never a breaker decision input.
//! - [`ErrorKind`] and friends: the closed error taxonomy the control plane
//!   reasons about. Callers classify their own errors into these kinds.
//! - [`EventListeners`]: the listener registry used by every component for
//!   observability callbacks.
//! - [`CancelToken`]: cooperative cancellation for protected calls and
//!   background tasks.
//! - Shared vocabulary: [`Tier`], [`SystemMode`], [`SystemHealthSnapshot`],
//!   [`ModeHandle`].
//!
//! ## Example
//!
//! ```rust
//! use aegis_core::{Clock, TokioClock, Ledger, ErrorKind};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
//! let ledger = Ledger::new(Arc::clone(&clock));
//!
//! ledger.record_success("billing-db", Duration::from_millis(12));
//! ledger.record_failure("billing-db", ErrorKind::Timeout);
//!
//! let stats = ledger.snapshot("billing-db").unwrap();
//! assert_eq!(stats.total, 2);
//! assert_eq!(stats.failures, 1);
//! # }
//! ```

mod cancel;
mod clock;
mod error;
mod events;
mod ledger;
mod mode;
mod target;

pub use cancel::CancelToken;
pub use clock::{validate_timeout, Clock, ManualClock, TokioClock};
pub use error::{BoxError, CallError, ConfigError, ErrorKind, FinalError};
pub use events::{BoxedListener, ControlEvent, EventListener, EventListeners, FnListener};
pub use ledger::{Ledger, StatsSnapshot};
pub use mode::{ModeHandle, SystemHealthSnapshot, SystemMode, TierHealth};
pub use target::{TargetInfo, Tier};
