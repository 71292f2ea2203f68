//! Concrete adapters wiring the core's ports to something a
//! standalone binary can run against. `NullProfileDb`/`NullGeoIp` stand in
//! for the profile database and GeoIP collaborators this crate treats as
//! external services; `UdpUpstream` is grounded directly on
//! an established `UdpTransport::send_without_pool` (ephemeral per-query
//! socket, `tokio::time::timeout`-guarded send/recv); `TracingMetrics`
//! reports `CoreMetricsPort`'s counters through `tracing` the way the
//! teacher's background loggers report through it rather than a metrics
//! registry this workspace does not depend on.

use async_trait::async_trait;
use ferrous_dns_application::context::RequestContext;
use ferrous_dns_application::ports::{
    CoreMetricsPort, GeoIpPort, ProfileDbPort, SpecialDomainClass, UpstreamHandlerPort,
};
use ferrous_dns_domain::{
    Device, DomainError, EcsFamily, GeoLocation, KeySubnet, Profile, ProfileId, WireMessage,
};
use hickory_proto::serialize::binary::{BinEncodable, BinEncoder};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// A profile database that never has any profiles. Every lookup resolves
/// to "anonymous".
pub struct NullProfileDb;

#[async_trait]
impl ProfileDbPort for NullProfileDb {
    async fn profile_by_device_id(
        &self,
        _device_id: &str,
    ) -> Result<Option<(Arc<Profile>, Arc<Device>)>, DomainError> {
        Ok(None)
    }

    async fn profile_by_dedicated_ip(
        &self,
        _ip: IpAddr,
    ) -> Result<Option<Arc<Profile>>, DomainError> {
        Ok(None)
    }

    async fn profile_by_linked_ip(
        &self,
        _ip: IpAddr,
    ) -> Result<Option<(Arc<Profile>, Arc<Device>)>, DomainError> {
        Ok(None)
    }

    async fn profile_by_human_id(
        &self,
        _profile_id: ProfileId,
        _normalized_human_id: &str,
    ) -> Result<Option<(Arc<Profile>, Option<Arc<Device>>)>, DomainError> {
        Ok(None)
    }

    async fn create_auto_device(
        &self,
        _profile_id: ProfileId,
        _normalized_human_id: &str,
        _device_type: &str,
    ) -> Result<(Arc<Profile>, Arc<Device>), DomainError> {
        Err(DomainError::DeviceId(
            "no profile database configured".to_string(),
        ))
    }
}

/// A GeoIP collaborator with no database loaded. Every lookup is absent
/// ( `GeoIp`: non-critical, the pipeline proceeds with a null
/// location).
pub struct NullGeoIp;

#[async_trait]
impl GeoIpPort for NullGeoIp {
    async fn locate(&self, _host: &str, _ip: IpAddr) -> Result<Option<GeoLocation>, DomainError> {
        Ok(None)
    }

    fn subnet_by_location(&self, _location: GeoLocation, _family: EcsFamily) -> Option<KeySubnet> {
        None
    }
}

const MAX_UDP_RESPONSE_SIZE: usize = 4096;
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5);

/// Forwards a cache miss to a single fixed upstream resolver over UDP. One
/// ephemeral socket per query, matching an established unpooled
/// `UdpTransport` fallback path.
pub struct UdpUpstream {
    server_addr: SocketAddr,
}

impl UdpUpstream {
    pub fn new(server_addr: SocketAddr) -> Self {
        Self { server_addr }
    }
}

#[async_trait]
impl UpstreamHandlerPort for UdpUpstream {
    async fn serve(
        &self,
        ctx: &RequestContext,
        request: &WireMessage,
    ) -> Result<WireMessage, DomainError> {
        let mut buf = Vec::with_capacity(512);
        let mut encoder = BinEncoder::new(&mut buf);
        request
            .message
            .emit(&mut encoder)
            .map_err(|e| DomainError::Upstream(format!("failed to serialize query: {e}")))?;

        let bind_addr: SocketAddr = if self.server_addr.is_ipv4() {
            "0.0.0.0:0".parse().unwrap()
        } else {
            "[::]:0".parse().unwrap()
        };

        let exchange = async {
            let socket = UdpSocket::bind(bind_addr)
                .await
                .map_err(|e| DomainError::Upstream(format!("failed to bind UDP socket: {e}")))?;

            tokio::time::timeout(UPSTREAM_TIMEOUT, socket.send_to(&buf, self.server_addr))
                .await
                .map_err(|_| DomainError::Upstream(format!("timeout sending query to {}", self.server_addr)))?
                .map_err(|e| DomainError::Upstream(format!("failed to send query to {}: {e}", self.server_addr)))?;

            let mut recv_buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
            let (n, from) = tokio::time::timeout(UPSTREAM_TIMEOUT, socket.recv_from(&mut recv_buf))
                .await
                .map_err(|_| DomainError::Upstream(format!("timeout awaiting response from {}", self.server_addr)))?
                .map_err(|e| DomainError::Upstream(format!("failed to receive response from {}: {e}", self.server_addr)))?;

            if from.ip() != self.server_addr.ip() {
                warn!(expected = %self.server_addr, received_from = %from, "upstream response from unexpected source");
            }
            recv_buf.truncate(n);
            Ok(recv_buf)
        };

        let bytes = ctx
            .run(exchange)
            .await
            .ok_or_else(|| DomainError::Upstream("request deadline exceeded".to_string()))??;

        let message = hickory_proto::op::Message::from_vec(&bytes)
            .map_err(|e| DomainError::Upstream(format!("malformed upstream response: {e}")))?;
        debug!(server = %self.server_addr, bytes = bytes.len(), "upstream response received");
        Ok(WireMessage::new(message))
    }
}

/// Reports [`CoreMetricsPort`]'s counters through `tracing`, backed by
/// atomics for the gauges a caller might want to poll directly.
#[derive(Default)]
pub struct TracingMetrics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    access_blocked: AtomicU64,
    unknown_dedicated_drops: AtomicU64,
}

impl TracingMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CoreMetricsPort for TracingMetrics {
    fn inc_lookups(&self, hit: bool, supports_ecs: bool) {
        if hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
        debug!(hit, supports_ecs, "cache lookup");
    }

    fn set_cache_size(&self, supports_ecs: bool, n: u64) {
        debug!(supports_ecs, size = n, "cache size");
    }

    fn observe_profile_init(&self, duration: Duration) {
        debug!(?duration, "profile rule index compiled");
    }

    fn inc_special_domain(&self, class: SpecialDomainClass) {
        debug!(?class, "special-domain response served");
    }

    fn inc_unknown_dedicated_drop(&self) {
        self.unknown_dedicated_drops.fetch_add(1, Ordering::Relaxed);
        debug!("dropped: dedicated address matched no profile");
    }

    fn inc_access_blocked(&self) {
        self.access_blocked.fetch_add(1, Ordering::Relaxed);
        debug!("dropped: blocked by access filter");
    }
}
