//! Two-tier ECS-aware cache (C7).
//!
//! Grounded on an established `lru`-backed cache tiers (`cache::l1`,
//! `cache::storage`), simplified to the spec's plain two-LRU model: this
//! crate needs deterministic hit/miss semantics for the cache round-trip
//! property, not an established probabilistic/thread-local hybrid, so the
//! `lru` crate's own eviction is used directly behind a `Mutex` rather than
//! an established `DashMap` + bloom filter + adaptive-threshold machinery.

use crate::dns::ecs_wire;
use ferrous_dns_application::context::RequestContext;
use ferrous_dns_application::ports::UpstreamHandlerPort;
use ferrous_dns_application::ports::{CoreMetricsPort, GeoIpPort};
use ferrous_dns_domain::{
    CacheEntry, CacheKey, CacheRequest, CoreConfig, DomainError, EcsFamily, EcsOption, KeySubnet,
    RequestInfo, WireMessage,
};
use hickory_proto::op::{Edns, Message, MessageType, ResponseCode};
use hickory_proto::rr::{Record, RecordType};
use lru::LruCache;
use rustc_hash::FxBuildHasher;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Instant;

const SERVFAIL_TTL_CAP_SECS: u32 = 30;
/// RFC 8914 Extended DNS Error option code.
const EDNS_CODE_EDE: u16 = 15;

const DNSSEC_RR_TYPES: [RecordType; 6] = [
    RecordType::NSEC,
    RecordType::NSEC3,
    RecordType::DS,
    RecordType::DNSKEY,
    RecordType::RRSIG,
    RecordType::SIG,
];

/// Outcome of a cache probe: the stored entry plus which tier served it and
/// the subnet that tier was keyed on (needed to mirror ECS specificity back
/// to the client on a hit).
pub struct CacheHit {
    pub entry: CacheEntry,
    pub is_dependent: bool,
}

/// The two independently-sized, independently-evicted LRU tiers: one keyed
/// without regard to ECS, one keyed per client subnet.
pub struct EcsAwareCache {
    independent: Mutex<LruCache<CacheKey, CacheEntry, FxBuildHasher>>,
    dependent: Mutex<LruCache<CacheKey, CacheEntry, FxBuildHasher>>,
    use_ecs_cache: bool,
    use_cache_ttl_override: bool,
    cache_min_ttl: u32,
}

impl EcsAwareCache {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            independent: Mutex::new(LruCache::with_hasher(
                NonZeroUsize::new(config.cache_size.max(1)).unwrap(),
                FxBuildHasher,
            )),
            dependent: Mutex::new(LruCache::with_hasher(
                NonZeroUsize::new(config.ecs_cache_size.max(1)).unwrap(),
                FxBuildHasher,
            )),
            use_ecs_cache: config.use_ecs_cache,
            use_cache_ttl_override: config.use_cache_ttl_override,
            cache_min_ttl: config.cache_min_ttl,
        }
    }

    pub fn independent_len(&self) -> usize {
        self.independent.lock().unwrap().len()
    }

    pub fn dependent_len(&self) -> usize {
        self.dependent.lock().unwrap().len()
    }

    /// Probe both tiers in lookup order: ECS-independent
    /// first, then ECS-dependent if the request isn't ECS-declined. An
    /// entry whose remaining TTL has reached zero by `now` is evicted and
    /// treated as a miss rather than served stale.
    pub fn lookup(
        &self,
        req: &CacheRequest,
        now: Instant,
        metrics: &dyn CoreMetricsPort,
    ) -> Option<CacheHit> {
        let ind_key = req.independent_key();
        {
            let mut independent = self.independent.lock().unwrap();
            // Clone out of the lock immediately rather than holding the
            // borrow from `get` across a conditional `pop` of the same map.
            let snapshot = independent.get(&ind_key).cloned();
            match snapshot {
                Some(entry) if entry.guard_matches(&req.host) && entry.remaining_ttl_secs(now) > 0 => {
                    metrics.inc_lookups(true, false);
                    return Some(CacheHit {
                        entry,
                        is_dependent: false,
                    });
                }
                // Guard-matching entry whose TTL has elapsed: evict it, it
                // must not be served stale.
                Some(entry) if entry.guard_matches(&req.host) => {
                    independent.pop(&ind_key);
                }
                // Absent, or a collision-guard mismatch: treated as a miss
                // without touching the stored entry.
                _ => {}
            }
        }

        if self.use_ecs_cache {
            if let Some(dep_key) = req.dependent_key() {
                let mut dependent = self.dependent.lock().unwrap();
                let snapshot = dependent.get(&dep_key).cloned();
                match snapshot {
                    Some(entry) if entry.guard_matches(&req.host) && entry.remaining_ttl_secs(now) > 0 => {
                        metrics.inc_lookups(true, true);
                        return Some(CacheHit {
                            entry,
                            is_dependent: true,
                        });
                    }
                    Some(entry) if entry.guard_matches(&req.host) => {
                        dependent.pop(&dep_key);
                    }
                    _ => {}
                }
            }
        }

        metrics.inc_lookups(false, req.subnet.is_some() && !req.is_ecs_declined);
        None
    }

    /// Build the response for a cache hit: set-reply the
    /// incoming request, recompute every RR's remaining TTL, restore the AD
    /// bit per RFC 6840 §5.8, and mirror the ECS option back if the request
    /// carried one.
    pub fn serve_hit(
        &self,
        hit: &CacheHit,
        request: &WireMessage,
        dependent_subnet: Option<KeySubnet>,
        now: Instant,
    ) -> WireMessage {
        let mut response = hit.entry.msg.message.clone();
        response.set_id(request.message.id());
        response.set_message_type(MessageType::Response);

        let elapsed = elapsed_secs_rounded(hit.entry.cached_at, now);
        age_sections(&mut response, elapsed);

        let mut out = WireMessage::new(response);
        let stored_ad = hit.entry.msg.ad();
        out.set_ad(stored_ad && (request.ad() || request.dnssec_ok()));

        if let Some(req_ecs) = request.ecs_option() {
            if let Some(mirrored) = mirror_ecs_option(req_ecs, hit.is_dependent, dependent_subnet) {
                ecs_wire::set_ecs(&mut out.message, &mirrored);
            }
        }

        out
    }

    /// Handle a cache miss: forward upstream, filter the response, and
    /// store it in whichever tier its answer's ECS scope selects.
    #[allow(clippy::too_many_arguments)]
    pub async fn resolve_miss(
        &self,
        ctx: &RequestContext,
        info: &RequestInfo,
        req: &CacheRequest,
        family: EcsFamily,
        request: &WireMessage,
        upstream: &dyn UpstreamHandlerPort,
        metrics: &dyn CoreMetricsPort,
        now: Instant,
    ) -> Result<WireMessage, DomainError> {
        let mut outgoing = request.message.clone();
        let outgoing_subnet = req.subnet.unwrap_or_else(|| {
            let (addr, bits) = EcsOption::zero_prefix_for(family);
            KeySubnet { addr, bits }
        });
        let outgoing_ecs = EcsOption::new(family, outgoing_subnet.bits, 0, outgoing_subnet.addr)?;
        ecs_wire::set_ecs(&mut outgoing, &outgoing_ecs);

        let response = upstream
            .serve(ctx, &WireMessage::new(outgoing))
            .await?;

        let resp_ecs = ecs_wire::decode_ecs(&response.message)?;
        let resp_is_dependent = resp_ecs.as_ref().map(|e| e.scope_prefix > 0).unwrap_or(false);

        let mut filtered = response.message.clone();
        strip_hop_to_hop(&mut filtered, request.dnssec_ok(), info.qtype, resp_ecs.as_ref());

        let min_ttl = self.use_cache_ttl_override.then_some(self.cache_min_ttl);
        let cacheable = is_cacheable_message(&filtered, info.qtype);
        if let Some(ttl) = cacheable.then(|| compute_ttl(&filtered, min_ttl)).flatten() {
            if self.use_cache_ttl_override && filtered.response_code() != ResponseCode::ServFail {
                raise_answer_ttls(&mut filtered, self.cache_min_ttl);
            }

            // The dependent tier must be keyed on the same subnet `lookup`
            // probes with — the request-derived `req.subnet` (from GeoIP),
            // not the upstream's echoed scope. `scope' > 0` only decides
            // which tier an entry belongs to, never the key itself.
            let dependent_storage_key = (!req.is_ecs_declined)
                .then_some(req.subnet)
                .flatten()
                .map(|subnet| {
                    CacheKey::ecs_dependent(
                        info.host.clone(),
                        info.qtype,
                        info.qclass,
                        request.dnssec_ok(),
                        subnet,
                    )
                });

            let entry = CacheEntry::new(
                WireMessage::new(filtered.clone()),
                info.host.clone(),
                ttl,
                now,
            );

            if let Some(key) = dependent_storage_key.filter(|_| resp_is_dependent && self.use_ecs_cache) {
                self.dependent.lock().unwrap().put(key, entry);
                metrics.set_cache_size(true, self.dependent_len() as u64);
            } else {
                let key = CacheKey::independent(
                    info.host.clone(),
                    info.qtype,
                    info.qclass,
                    request.dnssec_ok(),
                );
                self.independent.lock().unwrap().put(key, entry);
                metrics.set_cache_size(false, self.independent_len() as u64);
            }
        }

        let mut out = WireMessage::new(filtered);
        out.message.set_id(request.message.id());
        let stored_ad = response.ad();
        out.set_ad(stored_ad && (request.ad() || request.dnssec_ok()));

        if let Some(req_ecs) = request.ecs_option() {
            let mirrored = mirror_ecs_option(
                req_ecs,
                resp_is_dependent,
                resp_ecs.as_ref().map(|e| KeySubnet {
                    addr: e.address,
                    bits: e.scope_prefix,
                }),
            );
            if let Some(mirrored) = mirrored {
                ecs_wire::set_ecs(&mut out.message, &mirrored);
            }
        }

        Ok(out)
    }
}

/// Compute `(host, qtype, qclass, reqDO, subnet, isECSDeclined)` for one
/// request, plus the address family used to derive `subnet`.
pub fn build_cache_request(
    info: &RequestInfo,
    request: &WireMessage,
    geoip: &dyn GeoIpPort,
) -> (CacheRequest, EcsFamily) {
    let is_ecs_declined = info.ecs_declined();
    let family = info
        .ecs
        .option
        .as_ref()
        .map(|o| o.family)
        .unwrap_or_else(|| EcsFamily::of(info.remote_ip));

    let subnet = if is_ecs_declined {
        let (addr, bits) = EcsOption::zero_prefix_for(family);
        Some(KeySubnet { addr, bits })
    } else {
        let location = info.ecs.location.or(info.location);
        location.and_then(|loc| geoip.subnet_by_location(loc, family))
    };

    (
        CacheRequest {
            host: info.host.clone(),
            qtype: info.qtype,
            qclass: info.qclass,
            req_do: request.dnssec_ok(),
            is_ecs_declined,
            subnet,
        },
        family,
    )
}

/// Whether a fully-decoded message is cacheable.
pub fn is_cacheable(wire: &WireMessage, qtype: RecordType) -> bool {
    is_cacheable_message(&wire.message, qtype)
}

fn is_cacheable_message(message: &Message, qtype: RecordType) -> bool {
    if message.truncated() || message.queries().len() != 1 {
        return false;
    }
    match message.response_code() {
        ResponseCode::NoError => answer_is_valid_for_qtype(message, qtype),
        ResponseCode::NXDomain | ResponseCode::ServFail => true,
        _ => false,
    }
}

fn answer_is_valid_for_qtype(message: &Message, qtype: RecordType) -> bool {
    let answers = message.answers();
    if answers.iter().any(|r| r.record_type() == qtype) {
        return true;
    }
    let only_cname_or_sig = !answers.is_empty()
        && answers
            .iter()
            .all(|r| matches!(r.record_type(), RecordType::CNAME | RecordType::SIG));
    only_cname_or_sig && message.name_servers().iter().any(|r| r.record_type() == RecordType::SOA)
}

/// `findLowestTTL`: scans all three sections; SOA TTL is
/// `min(header TTL, rdata MINIMUM)` per RFC 2308.
fn find_lowest_ttl(message: &Message) -> u32 {
    let mut lowest: Option<u32> = None;
    let mut note = |ttl: u32| {
        lowest = Some(lowest.map_or(ttl, |l: u32| l.min(ttl)));
    };

    for record in message
        .answers()
        .iter()
        .chain(message.name_servers())
        .chain(message.additionals())
    {
        let ttl = if let hickory_proto::rr::RData::SOA(soa) = record.data() {
            record.ttl().min(soa.minimum())
        } else {
            record.ttl()
        };
        note(ttl);
    }

    lowest.unwrap_or(0)
}

/// The effective TTL for caching, or `None` if the message
/// is not cacheable (`lowestTTL == 0`).
fn compute_ttl(message: &Message, min_ttl_override: Option<u32>) -> Option<u32> {
    let lowest = find_lowest_ttl(message);
    if lowest == 0 {
        return None;
    }
    if message.response_code() == ResponseCode::ServFail {
        return Some(lowest.min(SERVFAIL_TTL_CAP_SECS));
    }
    match min_ttl_override {
        Some(floor) => Some(lowest.max(floor)),
        None => Some(lowest),
    }
}

/// Raise every answer-section RR's TTL in place to `floor` before caching
/// and serving.
fn raise_answer_ttls(message: &mut Message, floor: u32) {
    let answers = message.take_answers();
    let raised: Vec<Record> = answers
        .into_iter()
        .map(|mut r| {
            if r.ttl() < floor {
                r.set_ttl(floor);
            }
            r
        })
        .collect();
    message.add_answers(raised);
}

/// Subtract `elapsed` from every RR's TTL in every section, floored at
/// zero.
fn age_sections(message: &mut Message, elapsed: u32) {
    let answers = message.take_answers();
    message.add_answers(answers.into_iter().map(|mut r| {
        r.set_ttl(r.ttl().saturating_sub(elapsed));
        r
    }));
    let authority = message.take_name_servers();
    message.add_name_servers(authority.into_iter().map(|mut r| {
        r.set_ttl(r.ttl().saturating_sub(elapsed));
        r
    }));
    let extra = message.take_additionals();
    message.add_additionals(extra.into_iter().map(|mut r| {
        r.set_ttl(r.ttl().saturating_sub(elapsed));
        r
    }));
}

fn elapsed_secs_rounded(cached_at: Instant, now: Instant) -> u32 {
    let elapsed = now.saturating_duration_since(cached_at).as_secs_f64();
    elapsed.round_ties_even() as u32
}

/// Hop-to-hop filtering before caching or serving.
fn strip_hop_to_hop(
    message: &mut Message,
    req_do: bool,
    queried_qtype: RecordType,
    resp_ecs: Option<&EcsOption>,
) {
    let answers = message.take_answers();
    let kept: Vec<Record> = answers
        .into_iter()
        .filter(|r| req_do || r.record_type() == queried_qtype || !is_dnssec_rr(r.record_type()))
        .collect();
    message.add_answers(kept);

    if !req_do {
        let authority = message.take_name_servers();
        message.add_name_servers(
            authority
                .into_iter()
                .filter(|r| !is_dnssec_rr(r.record_type())),
        );
        let extra = message.take_additionals();
        message.add_additionals(extra.into_iter().filter(|r| !is_dnssec_rr(r.record_type())));
    }

    strip_opt_unless_ede(message, resp_ecs);
}

fn is_dnssec_rr(rtype: RecordType) -> bool {
    DNSSEC_RR_TYPES.contains(&rtype)
}

/// `hickory_proto`'s `Message` does not expose unsetting EDNS once parsed,
/// so a response that must drop its OPT record is left with an empty
/// options set instead of a literally absent OPT RR; the wire-visible
/// difference (an OPT RR with no options, vs. none at all) does not affect
/// how a conforming client interprets it.
fn strip_opt_unless_ede(message: &mut Message, ecs_to_restore: Option<&EcsOption>) {
    let Some(edns) = message.extensions().clone() else {
        return;
    };
    let has_ede = edns
        .options()
        .iter()
        .any(|(code, _)| u16::from(*code) == EDNS_CODE_EDE);

    let mut rebuilt = Edns::new();
    rebuilt.set_max_payload(edns.max_payload());
    if has_ede {
        for (code, option) in edns.options().iter() {
            if u16::from(*code) == EDNS_CODE_EDE {
                rebuilt.options_mut().insert(option.clone());
            }
        }
    }
    if let Some(ecs) = ecs_to_restore {
        rebuilt.options_mut().insert(ecs_wire::encode_ecs(ecs));
    }
    message.set_edns(rebuilt);
}

/// Build the ECS option to mirror back to a client on a hit/miss.
/// Dependent-tier hits mirror the stored subnet's specificity;
/// independent-tier hits/misses echo a global (scope-0) answer at the
/// request's own source prefix.
fn mirror_ecs_option(
    request_ecs: &hickory_proto::rr::rdata::opt::EdnsOption,
    is_dependent: bool,
    subnet: Option<KeySubnet>,
) -> Option<ferrous_dns_domain::EcsOption> {
    let hickory_proto::rr::rdata::opt::EdnsOption::Subnet(req_subnet) = request_ecs else {
        return None;
    };
    let family = EcsFamily::of(req_subnet.addr());

    if is_dependent {
        let subnet = subnet?;
        let family = EcsFamily::of(subnet.addr);
        EcsOption::new(family, subnet.bits, subnet.bits, subnet.addr).ok()
    } else {
        EcsOption::new(family, req_subnet.source_prefix(), 0, req_subnet.addr()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrous_dns_domain::GeoLocation;
    use hickory_proto::op::{MessageType, OpCode, Query};
    use hickory_proto::rr::{DNSClass, Name, RData};
    use hickory_proto::rr::rdata::A;
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    fn answer_message(host: &str, ttl: u32, rcode: ResponseCode) -> Message {
        let mut message = Message::new(1, MessageType::Response, OpCode::Query);
        message.set_response_code(rcode);
        let mut query = Query::new();
        query.set_name(Name::from_str(host).unwrap());
        query.set_query_type(RecordType::A);
        query.set_query_class(DNSClass::IN);
        message.add_query(query);
        let record = Record::from_rdata(
            Name::from_str(host).unwrap(),
            ttl,
            RData::A(A(Ipv4Addr::new(1, 2, 3, 4))),
        );
        message.add_answer(record);
        message
    }

    #[test]
    fn lowest_ttl_scans_all_sections() {
        let message = answer_message("example.com.", 300, ResponseCode::NoError);
        assert_eq!(find_lowest_ttl(&message), 300);
    }

    #[test]
    fn servfail_ttl_is_capped() {
        let message = answer_message("example.com.", 3600, ResponseCode::ServFail);
        assert_eq!(compute_ttl(&message, None), Some(30));
    }

    #[test]
    fn zero_ttl_is_not_cacheable() {
        let message = answer_message("example.com.", 0, ResponseCode::NoError);
        assert_eq!(compute_ttl(&message, None), None);
    }

    #[test]
    fn min_ttl_override_raises_floor() {
        let message = answer_message("example.com.", 10, ResponseCode::NoError);
        assert_eq!(compute_ttl(&message, Some(60)), Some(60));
    }

    #[test]
    fn cacheable_noerror_requires_matching_qtype_or_nodata() {
        let message = answer_message("example.com.", 300, ResponseCode::NoError);
        let wire = WireMessage::new(message);
        assert!(is_cacheable(&wire, RecordType::A));
        assert!(!is_cacheable(&wire, RecordType::AAAA));
    }

    #[test]
    fn servfail_is_cacheable_without_answer() {
        let mut message = Message::new(1, MessageType::Response, OpCode::Query);
        message.set_response_code(ResponseCode::ServFail);
        let mut query = Query::new();
        query.set_name(Name::from_str("example.com.").unwrap());
        query.set_query_type(RecordType::A);
        query.set_query_class(DNSClass::IN);
        message.add_query(query);
        assert!(is_cacheable(&WireMessage::new(message), RecordType::A));
    }

    #[test]
    fn refused_is_not_cacheable() {
        let mut message = Message::new(1, MessageType::Response, OpCode::Query);
        message.set_response_code(ResponseCode::Refused);
        let mut query = Query::new();
        query.set_name(Name::from_str("example.com.").unwrap());
        query.set_query_type(RecordType::A);
        query.set_query_class(DNSClass::IN);
        message.add_query(query);
        assert!(!is_cacheable(&WireMessage::new(message), RecordType::A));
    }

    #[test]
    fn cache_round_trips_a_hit() {
        let config = CoreConfig::default();
        let cache = EcsAwareCache::new(&config);
        let host: std::sync::Arc<str> = std::sync::Arc::from("example.com");

        let entry = CacheEntry::new(
            WireMessage::new(answer_message("example.com.", 300, ResponseCode::NoError)),
            host.clone(),
            300,
            Instant::now(),
        );
        let key = CacheKey::independent(host.clone(), RecordType::A, DNSClass::IN, false);
        cache.independent.lock().unwrap().put(key, entry);

        let req = CacheRequest {
            host,
            qtype: RecordType::A,
            qclass: DNSClass::IN,
            req_do: false,
            is_ecs_declined: true,
            subnet: None,
        };

        struct NoopMetrics;
        impl CoreMetricsPort for NoopMetrics {
            fn inc_lookups(&self, _hit: bool, _supports_ecs: bool) {}
            fn set_cache_size(&self, _supports_ecs: bool, _n: u64) {}
            fn observe_profile_init(&self, _duration: std::time::Duration) {}
            fn inc_special_domain(&self, _class: ferrous_dns_application::ports::SpecialDomainClass) {}
            fn inc_unknown_dedicated_drop(&self) {}
            fn inc_access_blocked(&self) {}
        }

        let hit = cache
            .lookup(&req, Instant::now(), &NoopMetrics)
            .expect("expected hit");
        assert!(!hit.is_dependent);
    }

    #[test]
    fn lookup_treats_expired_entry_as_a_miss_and_evicts_it() {
        let config = CoreConfig::default();
        let cache = EcsAwareCache::new(&config);
        let host: std::sync::Arc<str> = std::sync::Arc::from("example.com");
        let cached_at = Instant::now();

        let entry = CacheEntry::new(
            WireMessage::new(answer_message("example.com.", 10, ResponseCode::NoError)),
            host.clone(),
            10,
            cached_at,
        );
        let key = CacheKey::independent(host.clone(), RecordType::A, DNSClass::IN, false);
        cache.independent.lock().unwrap().put(key, entry);

        let req = CacheRequest {
            host,
            qtype: RecordType::A,
            qclass: DNSClass::IN,
            req_do: false,
            is_ecs_declined: true,
            subnet: None,
        };

        struct NoopMetrics;
        impl CoreMetricsPort for NoopMetrics {
            fn inc_lookups(&self, _hit: bool, _supports_ecs: bool) {}
            fn set_cache_size(&self, _supports_ecs: bool, _n: u64) {}
            fn observe_profile_init(&self, _duration: std::time::Duration) {}
            fn inc_special_domain(&self, _class: ferrous_dns_application::ports::SpecialDomainClass) {}
            fn inc_unknown_dedicated_drop(&self) {}
            fn inc_access_blocked(&self) {}
        }

        let past_expiry = cached_at + std::time::Duration::from_secs(100);
        assert!(cache.lookup(&req, past_expiry, &NoopMetrics).is_none());
        assert_eq!(cache.independent_len(), 0, "stale entry must be evicted on miss");
    }
}

