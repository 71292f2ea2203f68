//! Metrics port: one counter/gauge surface for every stat the
//! core produces. Failures observing a metric must never affect request
//! handling — implementations are expected to be
//! infallible; the trait has no `Result` returns.

use std::time::Duration;

/// The special-domain class a short-circuit response belongs to
///, for per-class counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialDomainClass {
    Ddr,
    ResolverArpaMalformed,
    FirefoxCanary,
    PrivateRelay,
    ChromePrefetch,
    AndroidMetric,
}

pub trait CoreMetricsPort: Send + Sync {
    /// One cache lookup outcome: hit or miss, and whether the key carried a
    /// subnet (ECS-dependent tier).
    fn inc_lookups(&self, hit: bool, supports_ecs: bool);

    /// Current occupancy of one cache tier.
    fn set_cache_size(&self, supports_ecs: bool, n: u64);

    /// Latency of a per-profile rule-matcher's first (lazy) compilation.
    fn observe_profile_init(&self, duration: Duration);

    /// One special-domain short-circuit of the given class was served.
    fn inc_special_domain(&self, class: SpecialDomainClass);

    /// A plain-DNS request was silently dropped because its dedicated
    /// address matched no profile.
    fn inc_unknown_dedicated_drop(&self);
}

