//! Port for the GeoIP collaborator.

use async_trait::async_trait;
use ferrous_dns_domain::{DomainError, EcsFamily, GeoLocation, KeySubnet};
use std::net::IpAddr;

#[async_trait]
pub trait GeoIpPort: Send + Sync {
    /// Locate `ip` (the lookup is parameterized by `host` too, since some
    /// backends key policy overrides by queried name as well as address).
    /// Absence of data is `Ok(None)`, not an error.
    async fn locate(&self, host: &str, ip: IpAddr) -> Result<Option<GeoLocation>, DomainError>;

    /// The network a `(country, ASN)` pair maps to, for the given address
    /// family. Used to derive the ECS-dependent cache key's subnet
    ///. Synchronous: backed by an in-memory database once
    /// loaded, not a per-call I/O round trip.
    fn subnet_by_location(&self, location: GeoLocation, family: EcsFamily) -> Option<KeySubnet>;
}

