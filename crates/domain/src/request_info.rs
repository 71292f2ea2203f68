//! `RequestInfo`: the pooled, short-lived per-request struct.
//!
//! Lifecycle: created at pipeline entry from a pool, all fields cleared;
//! mutated by C5 (assembler), C4 (device extractor), C3 (profile access);
//! returned to the pool at pipeline exit on all paths. Downstream
//! components must not retain references after the response is written.

use crate::ecs::EcsOption;
use crate::profile::{Device, Profile};
use hickory_proto::rr::{DNSClass, RecordType};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// GeoIP location data: country code plus originating-network ASN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeoLocation {
    pub country: [u8; 2],
    pub asn: u32,
}

/// The static policy bucket a request falls into absent any profile
///.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilteringGroupId(pub i64);

/// ECS state attached to a request: the decoded option (if present) plus
/// the GeoIP location resolved for its subnet.
#[derive(Debug, Clone, Default)]
pub struct RequestEcs {
    pub option: Option<EcsOption>,
    pub location: Option<GeoLocation>,
}

/// The pooled per-request context threaded through the middleware pipeline.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// Lowercased, trailing-dot-stripped question name (root `.` preserved).
    pub host: Arc<str>,
    pub qtype: RecordType,
    pub qclass: DNSClass,
    pub remote_ip: IpAddr,
    pub local_addr: SocketAddr,
    pub location: Option<GeoLocation>,
    pub ecs: RequestEcs,
    pub profile: Option<Arc<Profile>>,
    pub device: Option<Arc<Device>>,
    pub filtering_group: FilteringGroupId,
    pub id: u64,
}

impl RequestInfo {
    /// Construct a fresh, fully-cleared `RequestInfo` for one request.
    ///
    /// Used by the pool's `get()` in place of a zero-allocation in-place
    /// reset when no pooled instance is available.
    pub fn new(remote_ip: IpAddr, local_addr: SocketAddr, id: u64) -> Self {
        Self {
            host: Arc::from(""),
            qtype: RecordType::A,
            qclass: DNSClass::IN,
            remote_ip,
            local_addr,
            location: None,
            ecs: RequestEcs::default(),
            profile: None,
            device: None,
            filtering_group: FilteringGroupId::default(),
            id,
        }
    }

    /// Clear all mutable fields in place, preserving the allocation backing
    /// `host` where possible. Used by the object pool on `get()`.
    pub fn reset(&mut self, remote_ip: IpAddr, local_addr: SocketAddr, id: u64) {
        self.host = Arc::from("");
        self.qtype = RecordType::A;
        self.qclass = DNSClass::IN;
        self.remote_ip = remote_ip;
        self.local_addr = local_addr;
        self.location = None;
        self.ecs = RequestEcs::default();
        self.profile = None;
        self.device = None;
        self.filtering_group = FilteringGroupId::default();
        self.id = id;
    }

    /// True if the attached ECS option declined personalization
    /// (`bits == 0`)
    pub fn ecs_declined(&self) -> bool {
        self.ecs
            .option
            .as_ref()
            .map(|o| o.is_declined())
            .unwrap_or(false)
    }
}

/// Lowercase a question name and strip a single trailing dot, preserving the
/// root name `.` itself.
pub fn normalize_host(raw: &str) -> Arc<str> {
    let lower = raw.to_ascii_lowercase();
    if lower == "." {
        return Arc::from(".");
    }
    Arc::from(lower.strip_suffix('.').unwrap_or(&lower))
}
