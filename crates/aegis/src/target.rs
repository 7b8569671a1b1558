//! Target registration records.

use aegis_breaker::BreakerConfig;
use aegis_core::{ConfigError, Tier};
use aegis_fallback::StrategySpec;
use aegis_monitor::Probe;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Everything the control plane needs to know about one protected target.
///
/// Built with [`TargetSpec::builder`]; re-registering the same id updates
/// the configuration and leaves breaker state intact.
#[derive(Clone)]
pub struct TargetSpec {
    /// Importance tier.
    pub tier: Tier,
    /// Critical-service flag for reporting.
    pub critical_service: bool,
    /// Estimated business impact per minute of outage, for reporting.
    pub business_impact_per_minute: f64,
    /// Declared dependencies on other targets.
    pub dependencies: Vec<String>,
    /// Operation tags whose successful responses are cached.
    pub cacheable_tags: HashSet<String>,
    /// TTL for cached responses.
    pub max_cache_age: Duration,
    /// Breaker configuration.
    pub breaker: BreakerConfig,
    /// Ordered fallback strategy chain.
    pub fallback_chain: Vec<StrategySpec>,
    /// Offline queue bound; zero disables queueing.
    pub queue_bound: usize,
    /// Optional health probe.
    pub probe: Option<Arc<dyn Probe>>,
}

impl TargetSpec {
    /// Returns a builder for the given tier.
    pub fn builder(tier: Tier) -> TargetSpecBuilder {
        TargetSpecBuilder::new(tier)
    }
}

impl std::fmt::Debug for TargetSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetSpec")
            .field("tier", &self.tier)
            .field("critical_service", &self.critical_service)
            .field("business_impact_per_minute", &self.business_impact_per_minute)
            .field("dependencies", &self.dependencies)
            .field("cacheable_tags", &self.cacheable_tags)
            .field("max_cache_age", &self.max_cache_age)
            .field("breaker", &self.breaker)
            .field("fallback_chain", &self.fallback_chain)
            .field("queue_bound", &self.queue_bound)
            .field("probe", &self.probe.is_some())
            .finish()
    }
}

/// Builder for [`TargetSpec`].
pub struct TargetSpecBuilder {
    tier: Tier,
    critical_service: Option<bool>,
    business_impact_per_minute: f64,
    dependencies: Vec<String>,
    cacheable_tags: HashSet<String>,
    max_cache_age: Duration,
    breaker: Option<BreakerConfig>,
    fallback_chain: Vec<StrategySpec>,
    queue_bound: usize,
    probe: Option<Arc<dyn Probe>>,
}

impl TargetSpecBuilder {
    fn new(tier: Tier) -> Self {
        Self {
            tier,
            critical_service: None,
            business_impact_per_minute: 0.0,
            dependencies: Vec::new(),
            cacheable_tags: HashSet::new(),
            max_cache_age: Duration::from_secs(60),
            breaker: None,
            fallback_chain: Vec::new(),
            queue_bound: 100,
            probe: None,
        }
    }

    /// Overrides the critical-service reporting flag. Defaults to true for
    /// critical-tier targets.
    pub fn critical_service(mut self, flag: bool) -> Self {
        self.critical_service = Some(flag);
        self
    }

    /// Estimated business impact per minute of outage.
    pub fn business_impact_per_minute(mut self, impact: f64) -> Self {
        self.business_impact_per_minute = impact.max(0.0);
        self
    }

    /// Declares a dependency on another target.
    pub fn depends_on(mut self, target: impl Into<String>) -> Self {
        self.dependencies.push(target.into());
        self
    }

    /// Marks an operation tag as cacheable.
    pub fn cacheable_tag(mut self, tag: impl Into<String>) -> Self {
        self.cacheable_tags.insert(tag.into());
        self
    }

    /// TTL for cached responses. Default: 60 seconds.
    pub fn max_cache_age(mut self, age: Duration) -> Self {
        self.max_cache_age = age;
        self
    }

    /// Breaker configuration. Default: [`BreakerConfig::builder`] defaults.
    pub fn breaker(mut self, config: BreakerConfig) -> Self {
        self.breaker = Some(config);
        self
    }

    /// Ordered fallback chain.
    pub fn fallback_chain(mut self, chain: Vec<StrategySpec>) -> Self {
        self.fallback_chain = chain;
        self
    }

    /// Offline queue bound. Default: 100. Zero disables queueing.
    pub fn queue_bound(mut self, bound: usize) -> Self {
        self.queue_bound = bound;
        self
    }

    /// Attaches a health probe.
    pub fn probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Validates and builds the spec.
    pub fn build(self) -> Result<TargetSpec, ConfigError> {
        let breaker = match self.breaker {
            Some(config) => config,
            None => BreakerConfig::builder().build()?,
        };
        Ok(TargetSpec {
            tier: self.tier,
            critical_service: self.critical_service.unwrap_or(self.tier == Tier::Critical),
            business_impact_per_minute: self.business_impact_per_minute,
            dependencies: self.dependencies,
            cacheable_tags: self.cacheable_tags,
            max_cache_age: self.max_cache_age,
            breaker,
            fallback_chain: self.fallback_chain,
            queue_bound: self.queue_bound,
            probe: self.probe,
        })
    }
}

/// Field-wise partial update applied by `update_config`. Unset fields keep
/// their current values; the update affects subsequent calls only.
#[derive(Debug, Default, Clone)]
pub struct TargetConfigUpdate {
    /// New tier.
    pub tier: Option<Tier>,
    /// New failure threshold.
    pub failure_threshold: Option<u32>,
    /// New cooldown.
    pub cooldown: Option<Duration>,
    /// New half-open probe budget.
    pub half_open_budget: Option<u32>,
    /// New default call timeout.
    pub call_timeout: Option<Duration>,
    /// Replacement cacheable tag set.
    pub cacheable_tags: Option<HashSet<String>>,
    /// New cache TTL.
    pub max_cache_age: Option<Duration>,
    /// Replacement fallback chain.
    pub fallback_chain: Option<Vec<StrategySpec>>,
    /// New queue bound.
    pub queue_bound: Option<usize>,
}

impl TargetConfigUpdate {
    /// An update that changes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tier.
    pub fn tier(mut self, tier: Tier) -> Self {
        self.tier = Some(tier);
        self
    }

    /// Sets the failure threshold.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = Some(threshold);
        self
    }

    /// Sets the cooldown.
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    /// Sets the half-open probe budget.
    pub fn half_open_budget(mut self, budget: u32) -> Self {
        self.half_open_budget = Some(budget);
        self
    }

    /// Sets the default call timeout.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Replaces the cacheable tag set.
    pub fn cacheable_tags(mut self, tags: HashSet<String>) -> Self {
        self.cacheable_tags = Some(tags);
        self
    }

    /// Sets the cache TTL.
    pub fn max_cache_age(mut self, age: Duration) -> Self {
        self.max_cache_age = Some(age);
        self
    }

    /// Replaces the fallback chain.
    pub fn fallback_chain(mut self, chain: Vec<StrategySpec>) -> Self {
        self.fallback_chain = Some(chain);
        self
    }

    /// Sets the queue bound.
    pub fn queue_bound(mut self, bound: usize) -> Self {
        self.queue_bound = Some(bound);
        self
    }
}
