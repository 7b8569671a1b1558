//! Breaker configuration and builder.

use crate::events::BreakerEvent;
use aegis_core::{validate_timeout, ConfigError, EventListeners, FnListener};
use std::time::Duration;

/// Per-target breaker configuration.
#[derive(Clone)]
pub struct BreakerConfig {
    /// Consecutive failures at which the breaker opens.
    pub failure_threshold: u32,
    /// How long an open breaker rejects before probing. Zero means the next
    /// admission immediately probes through half-open.
    pub cooldown: Duration,
    /// Probe admissions permitted in the half-open state.
    pub half_open_budget: u32,
    /// Default per-attempt timeout for calls against this target.
    pub call_timeout: Duration,
    pub(crate) listeners: EventListeners<BreakerEvent>,
}

impl BreakerConfig {
    /// Returns a builder with the default configuration.
    pub fn builder() -> BreakerConfigBuilder {
        BreakerConfigBuilder::new()
    }
}

impl std::fmt::Debug for BreakerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerConfig")
            .field("failure_threshold", &self.failure_threshold)
            .field("cooldown", &self.cooldown)
            .field("half_open_budget", &self.half_open_budget)
            .field("call_timeout", &self.call_timeout)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Builder for [`BreakerConfig`].
pub struct BreakerConfigBuilder {
    failure_threshold: u32,
    cooldown: Duration,
    half_open_budget: u32,
    call_timeout: Duration,
    listeners: EventListeners<BreakerEvent>,
}

impl BreakerConfigBuilder {
    /// Creates a builder with default values.
    pub fn new() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            half_open_budget: 1,
            call_timeout: Duration::from_secs(10),
            listeners: EventListeners::new(),
        }
    }

    /// Consecutive failures at which the breaker opens.
    ///
    /// Default: 5
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Duration an open breaker rejects admissions.
    ///
    /// Default: 30 seconds. Zero is permitted: the breaker still opens but
    /// the next admission probes immediately.
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Probe admissions permitted while half-open.
    ///
    /// Default: 1
    pub fn half_open_budget(mut self, budget: u32) -> Self {
        self.half_open_budget = budget;
        self
    }

    /// Default per-attempt call timeout for this target.
    ///
    /// Default: 10 seconds. Must be non-zero.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Register a callback invoked when this breaker opens.
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.listeners
            .add(FnListener::new(move |event: &BreakerEvent| {
                if let BreakerEvent::Opened { target, .. } = event {
                    f(target);
                }
            }));
        self
    }

    /// Register a callback invoked when this breaker closes.
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.listeners
            .add(FnListener::new(move |event: &BreakerEvent| {
                if let BreakerEvent::Closed { target, .. } = event {
                    f(target);
                }
            }));
        self
    }

    /// Register a callback invoked when this breaker transitions to
    /// half-open.
    pub fn on_half_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.listeners
            .add(FnListener::new(move |event: &BreakerEvent| {
                if let BreakerEvent::HalfOpened { target, .. } = event {
                    f(target);
                }
            }));
        self
    }

    /// Validates and builds the configuration.
    pub fn build(self) -> Result<BreakerConfig, ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        if self.half_open_budget == 0 {
            return Err(ConfigError::ZeroProbeBudget);
        }
        validate_timeout(self.call_timeout)?;

        Ok(BreakerConfig {
            failure_threshold: self.failure_threshold,
            cooldown: self.cooldown,
            half_open_budget: self.half_open_budget,
            call_timeout: self.call_timeout,
            listeners: self.listeners,
        })
    }
}

impl Default for BreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
