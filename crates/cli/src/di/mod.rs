//! Dependency wiring: builds one [`CorePipeline`] from a [`CoreConfig`] and
//! the handful of adapters this binary supplies for the core's external
//! collaborators.

pub mod adapters;

use std::net::SocketAddr;
use std::sync::Arc;

use ferrous_dns_application::ports::SystemClock;
use ferrous_dns_domain::{CoreConfig, ProfileFlags};
use ferrous_dns_infrastructure::dns::access::{GlobalAccessFilter, ProfileAccessManager};
use ferrous_dns_infrastructure::dns::{CorePipeline, EcsAwareCache};
use ferrous_dns_infrastructure::dns::pipeline::PipelineConfig;
use ferrous_dns_infrastructure::dns::special::DdrTemplates;

use adapters::{NullGeoIp, NullProfileDb, TracingMetrics, UdpUpstream};

/// Build the one [`CorePipeline`] this binary runs every request through.
///
/// The global filter starts empty (no static domain/subnet blocklist is
/// wired up at this layer — scopes blocklist sourcing to the
/// profile database, which this binary stands in for with
/// [`NullProfileDb`]); per-profile access therefore has nothing to compose
/// with, and runs with no shared "standard" blocker either.
pub fn build_pipeline(config: &CoreConfig, upstream_addr: SocketAddr) -> anyhow::Result<CorePipeline> {
    let global = Arc::new(GlobalAccessFilter::from_lines("", &[])?);
    let profile_access = ProfileAccessManager::new(None);
    let cache = EcsAwareCache::new(config);

    let ddr = DdrTemplates {
        public_target: config.ddr_public_target.as_deref().map(Arc::from),
        device_target_suffix: config.ddr_device_target_suffix.as_deref().map(Arc::from),
    };

    let pipeline_config = PipelineConfig {
        device_wildcard_domains: config.device_id_wildcards.clone(),
        linked_ip_enabled: config.linked_ip_enabled,
        binds_to_interfaces: config.binds_to_interfaces,
        server_addresses: Vec::new(),
        ddr,
        ddr_enabled: config.ddr_enabled,
        default_flags: ProfileFlags::default(),
    };

    Ok(CorePipeline::new(
        global,
        profile_access,
        cache,
        Arc::new(NullProfileDb),
        Arc::new(NullGeoIp),
        Arc::new(UdpUpstream::new(upstream_addr)),
        Arc::new(TracingMetrics::new()),
        Arc::new(SystemClock),
        pipeline_config,
    ))
}

