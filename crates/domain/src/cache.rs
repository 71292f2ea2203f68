//! Cache data model.
//!
//! Generalized from an established `dns::cache::key::CacheKey` /
//! `dns::cache::data::CachedData` (which cache resolved IP addresses) to
//! caching a full `hickory_proto::op::Message`, keyed on the richer tuple
//! the ECS-aware cache needs.

use crate::message::WireMessage;
use hickory_proto::rr::{DNSClass, RecordType};
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

/// The subnet component of a cache key: present only for the ECS-dependent
/// cache tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeySubnet {
    pub addr: IpAddr,
    pub bits: u8,
}

/// A fully-computed lookup/insert key for one cache tier.
///
/// Two logical caches exist: the ECS-independent
/// cache is keyed without a subnet; the ECS-dependent cache's key includes
/// `(subnet.addr, subnet.bits)`. An instance of this type always belongs to
/// exactly one tier — `subnet.is_none()` for the independent tier.
#[derive(Debug, Clone, Eq)]
pub struct CacheKey {
    pub host: Arc<str>,
    pub qtype: RecordType,
    pub qclass: DNSClass,
    pub req_do: bool,
    pub subnet: Option<KeySubnet>,
}

impl CacheKey {
    pub fn independent(host: Arc<str>, qtype: RecordType, qclass: DNSClass, req_do: bool) -> Self {
        Self {
            host,
            qtype,
            qclass,
            req_do,
            subnet: None,
        }
    }

    pub fn ecs_dependent(
        host: Arc<str>,
        qtype: RecordType,
        qclass: DNSClass,
        req_do: bool,
        subnet: KeySubnet,
    ) -> Self {
        Self {
            host,
            qtype,
            qclass,
            req_do,
            subnet: Some(subnet),
        }
    }
}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.qtype.hash(state);
        self.qclass.hash(state);
        self.req_do.hash(state);
        self.subnet.hash(state);
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.qtype == other.qtype
            && self.qclass == other.qclass
            && self.req_do == other.req_do
            && self.subnet == other.subnet
            && self.host == other.host
    }
}

/// A request's computed cache coordinates.
#[derive(Debug, Clone)]
pub struct CacheRequest {
    pub host: Arc<str>,
    pub qtype: RecordType,
    pub qclass: DNSClass,
    pub req_do: bool,
    pub is_ecs_declined: bool,
    /// The subnet to key the ECS-dependent tier on, when not declined.
    pub subnet: Option<KeySubnet>,
}

impl CacheRequest {
    /// The key for probing/populating the ECS-independent tier.
    pub fn independent_key(&self) -> CacheKey {
        CacheKey::independent(self.host.clone(), self.qtype, self.qclass, self.req_do)
    }

    /// The key for probing/populating the ECS-dependent tier, if the
    /// request carries a usable subnet ( only consulted "when
    /// the first misses and ECS is not declined").
    pub fn dependent_key(&self) -> Option<CacheKey> {
        if self.is_ecs_declined {
            return None;
        }
        self.subnet.map(|subnet| {
            CacheKey::ecs_dependent(self.host.clone(), self.qtype, self.qclass, self.req_do, subnet)
        })
    }
}

/// A cached response plus the bookkeeping needed to recompute per-RR TTLs
/// on a later hit.
///
/// `host` is a collision guard: on retrieval, a mismatch between the
/// requested host and the stored host is treated as a cache miss rather
/// than trusted blindly.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub msg: WireMessage,
    pub cached_at: Instant,
    pub host: Arc<str>,
    /// Lowest TTL across all sections at insertion time, in seconds
    ///.
    pub ttl_secs: u32,
}

impl CacheEntry {
    pub fn new(msg: WireMessage, host: Arc<str>, ttl_secs: u32, cached_at: Instant) -> Self {
        Self {
            msg,
            cached_at,
            host,
            ttl_secs,
        }
    }

    /// Remaining TTL at `now`, banker's-rounded to the nearest second, per
    /// and Testable Property 3.
    pub fn remaining_ttl_secs(&self, now: Instant) -> u32 {
        let elapsed = now.saturating_duration_since(self.cached_at).as_secs_f64();
        let remaining = self.ttl_secs as f64 - elapsed;
        if remaining <= 0.0 {
            0
        } else {
            remaining.round_ties_even() as u32
        }
    }

    /// Whether `host` matches the stored collision guard.
    pub fn guard_matches(&self, host: &str) -> bool {
        &*self.host == host
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::{Message, MessageType, OpCode};
    use std::time::Duration;

    fn empty_wire() -> WireMessage {
        WireMessage::new(Message::new(1, MessageType::Response, OpCode::Query))
    }

    #[test]
    fn remaining_ttl_decreases_with_elapsed_time() {
        let start = Instant::now();
        let entry = CacheEntry::new(empty_wire(), Arc::from("example.com"), 100, start);
        assert_eq!(entry.remaining_ttl_secs(start), 100);
        assert_eq!(entry.remaining_ttl_secs(start + Duration::from_secs(40)), 60);
    }

    #[test]
    fn remaining_ttl_floors_at_zero() {
        let start = Instant::now();
        let entry = CacheEntry::new(empty_wire(), Arc::from("example.com"), 10, start);
        assert_eq!(entry.remaining_ttl_secs(start + Duration::from_secs(100)), 0);
    }

    #[test]
    fn guard_rejects_mismatched_host() {
        let entry = CacheEntry::new(empty_wire(), Arc::from("example.com"), 10, Instant::now());
        assert!(entry.guard_matches("example.com"));
        assert!(!entry.guard_matches("other.com"));
    }

    #[test]
    fn independent_and_dependent_keys_differ() {
        let req = CacheRequest {
            host: Arc::from("example.com"),
            qtype: RecordType::A,
            qclass: DNSClass::IN,
            req_do: false,
            is_ecs_declined: false,
            subnet: Some(KeySubnet {
                addr: "1.2.0.0".parse().unwrap(),
                bits: 16,
            }),
        };
        let ind = req.independent_key();
        let dep = req.dependent_key().unwrap();
        assert!(ind.subnet.is_none());
        assert!(dep.subnet.is_some());
        assert_ne!(ind, dep);
    }

    #[test]
    fn declined_ecs_has_no_dependent_key() {
        let req = CacheRequest {
            host: Arc::from("example.com"),
            qtype: RecordType::A,
            qclass: DNSClass::IN,
            req_do: false,
            is_ecs_declined: true,
            subnet: None,
        };
        assert!(req.dependent_key().is_none());
    }
}

