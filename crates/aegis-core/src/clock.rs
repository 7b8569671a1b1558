//! Monotonic time source and timers.
//!
//! The clock is the only source of time in the control plane. Durations are
//! measured from the clock's creation, so snapshots report offsets rather
//! than wall-clock instants. Timeouts and cooldowns are expressed as races
//! against [`Clock::sleep`].

use crate::error::ConfigError;
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// A monotonic time source with a timer primitive.
///
/// `now` returns the time elapsed since the clock was created. `sleep`
/// completes after the requested amount of *clock* time has passed, which
/// for [`TokioClock`] is tokio time (virtual under a paused test runtime)
/// and for [`ManualClock`] is whatever the test advances.
pub trait Clock: Send + Sync {
    /// Monotonic time since the clock's origin.
    fn now(&self) -> Duration;

    /// Completes after `duration` of clock time has elapsed.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Rejects a zero duration configured as a timeout.
pub fn validate_timeout(timeout: Duration) -> Result<(), ConfigError> {
    if timeout.is_zero() {
        Err(ConfigError::ZeroTimeout)
    } else {
        Ok(())
    }
}

/// Production clock backed by `tokio::time`.
///
/// Under `#[tokio::test(start_paused = true)]` this clock is fully virtual:
/// `sleep` resolves as the test runtime auto-advances.
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    /// Creates a clock anchored at the current instant.
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

struct Sleeper {
    due: Duration,
    notify: Arc<Notify>,
}

struct ManualClockInner {
    now: Mutex<Duration>,
    sleepers: Mutex<Vec<Sleeper>>,
}

/// A hand-driven clock for deterministic unit tests.
///
/// Time only moves when [`ManualClock::advance`] is called; sleepers whose
/// deadline has been reached are woken at that point.
#[derive(Clone)]
pub struct ManualClock {
    inner: Arc<ManualClockInner>,
}

impl ManualClock {
    /// Creates a clock at time zero.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ManualClockInner {
                now: Mutex::new(Duration::ZERO),
                sleepers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Moves time forward and wakes every sleeper whose deadline passed.
    pub fn advance(&self, by: Duration) {
        let now = {
            let mut guard = self.inner.now.lock().unwrap();
            *guard += by;
            *guard
        };

        let mut sleepers = self.inner.sleepers.lock().unwrap();
        sleepers.retain(|sleeper| {
            if sleeper.due <= now {
                // notify_one stores a permit, so a sleeper that has not yet
                // awaited its Notified future still observes the wakeup.
                sleeper.notify.notify_one();
                false
            } else {
                true
            }
        });
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.inner.now.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let notify = Arc::new(Notify::new());
            {
                // Register under the sleepers lock so a concurrent advance
                // either sees the sleeper or the deadline check below wins.
                let mut sleepers = inner.sleepers.lock().unwrap();
                let now = *inner.now.lock().unwrap();
                let due = now + duration;
                if due <= now {
                    return;
                }
                sleepers.push(Sleeper {
                    due,
                    notify: Arc::clone(&notify),
                });
            }
            notify.notified().await;
        })
    }
}
