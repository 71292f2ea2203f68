//! End-to-end scenarios run through `CorePipeline` itself rather than a
//! single component in isolation. Complements the unit tests embedded in
//! `dns::pipeline`/`dns::ecs_cache` with cross-component cases: global IP
//! blocking, SERVFAIL caching, per-profile ASN allow-listing via a resolved
//! linked-IP profile, and an ECS-dependent cache hit driven by a real
//! `GeoIpPort` subnet mapping.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ferrous_dns_application::context::RequestContext;
use ferrous_dns_application::ports::{
    ClockPort, CoreMetricsPort, GeoIpPort, ProfileDbPort, SpecialDomainClass, UpstreamHandlerPort,
};
use ferrous_dns_domain::{
    AsnSet, CidrSet, CoreConfig, Device, DeviceAuth, DeviceId, DomainError, EcsFamily, GeoLocation,
    KeySubnet, Profile, ProfileAccessConfig, ProfileFlags, ProfileId, RequestInfo, WireMessage,
};
use ferrous_dns_infrastructure::dns::access::standard::{
    compile_domain_rules, StandardBlockerConfig, StandardPerProfileBlocker,
};
use ferrous_dns_infrastructure::dns::access::{GlobalAccessFilter, ProfileAccessManager};
use ferrous_dns_infrastructure::dns::device::{TransportMetadata, TransportProtocol};
use ferrous_dns_infrastructure::dns::ecs_cache::EcsAwareCache;
use ferrous_dns_infrastructure::dns::ecs_wire;
use ferrous_dns_infrastructure::dns::pipeline::{CorePipeline, PipelineConfig};
use ferrous_dns_infrastructure::dns::special::DdrTemplates;
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::rdata::opt::{ClientSubnet, EdnsOption};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use std::str::FromStr;

struct NoopMetrics;
impl CoreMetricsPort for NoopMetrics {
    fn inc_lookups(&self, _hit: bool, _supports_ecs: bool) {}
    fn set_cache_size(&self, _supports_ecs: bool, _n: u64) {}
    fn observe_profile_init(&self, _duration: Duration) {}
    fn inc_special_domain(&self, _class: SpecialDomainClass) {}
    fn inc_unknown_dedicated_drop(&self) {}
    fn inc_access_blocked(&self) {}
}

struct FixedClock;
impl ClockPort for FixedClock {
    fn now(&self) -> std::time::Instant {
        std::time::Instant::now()
    }
}

struct EmptyProfileDb;
#[async_trait]
impl ProfileDbPort for EmptyProfileDb {
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
        unreachable!("not exercised by these tests")
    }
}

struct NoopGeoIp;
#[async_trait]
impl GeoIpPort for NoopGeoIp {
    async fn locate(&self, _host: &str, _ip: IpAddr) -> Result<Option<GeoLocation>, DomainError> {
        Ok(None)
    }
    fn subnet_by_location(&self, _location: GeoLocation, _family: EcsFamily) -> Option<KeySubnet> {
        None
    }
}

struct CountingUpstream {
    calls: AtomicU64,
    rcode: hickory_proto::op::ResponseCode,
}

impl CountingUpstream {
    fn new(rcode: hickory_proto::op::ResponseCode) -> Self {
        Self {
            calls: AtomicU64::new(0),
            rcode,
        }
    }
}

#[async_trait]
impl UpstreamHandlerPort for CountingUpstream {
    async fn serve(
        &self,
        _ctx: &RequestContext,
        request: &WireMessage,
    ) -> Result<WireMessage, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let question = request.single_question()?;
        let mut response = request.message.clone();
        response.set_message_type(MessageType::Response);
        response.set_response_code(self.rcode);
        if self.rcode == hickory_proto::op::ResponseCode::NoError {
            let record = Record::from_rdata(
                question.name().clone(),
                3600,
                RData::A(A(Ipv4Addr::new(9, 9, 9, 9))),
            );
            response.add_answer(record);
        }
        Ok(WireMessage::new(response))
    }
}

/// Like `CountingUpstream`, but echoes back a scoped ECS option
/// (`scope_prefix == source_prefix`) instead of leaving the request's
/// scope-0 option untouched. Exercises the ECS-dependent cache tier,
/// which `CountingUpstream`'s scope-0 echo never reaches.
struct ScopedEchoUpstream {
    calls: AtomicU64,
}

impl ScopedEchoUpstream {
    fn new() -> Self {
        Self {
            calls: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl UpstreamHandlerPort for ScopedEchoUpstream {
    async fn serve(
        &self,
        _ctx: &RequestContext,
        request: &WireMessage,
    ) -> Result<WireMessage, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let question = request.single_question()?;
        let mut response = request.message.clone();
        response.set_message_type(MessageType::Response);
        let record = Record::from_rdata(
            question.name().clone(),
            3600,
            RData::A(A(Ipv4Addr::new(9, 9, 9, 9))),
        );
        response.add_answer(record);

        if let Some(req_ecs) = ecs_wire::decode_ecs(&request.message).unwrap_or(None) {
            let scoped = ferrous_dns_domain::EcsOption::new(
                req_ecs.family,
                req_ecs.source_prefix,
                req_ecs.source_prefix,
                req_ecs.address,
            )
            .expect("echoing the request's own source prefix as scope is always valid");
            ecs_wire::set_ecs(&mut response, &scoped);
        }

        Ok(WireMessage::new(response))
    }
}

fn query_message(host: &str, qtype: RecordType) -> WireMessage {
    let mut message = Message::new(1, MessageType::Query, OpCode::Query);
    let mut query = Query::new();
    query.set_name(Name::from_str(host).unwrap());
    query.set_query_type(qtype);
    query.set_query_class(DNSClass::IN);
    message.add_query(query);
    WireMessage::new(message)
}

fn ctx() -> RequestContext {
    RequestContext::new(1, tokio::time::Instant::now() + Duration::from_secs(5))
}

fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        device_wildcard_domains: vec![],
        linked_ip_enabled: true,
        binds_to_interfaces: false,
        server_addresses: vec![],
        ddr: DdrTemplates::default(),
        ddr_enabled: false,
        default_flags: ProfileFlags::default(),
    }
}

#[tokio::test]
async fn global_ip_blocklist_drops_request_before_upstream_is_called() {
    let global = Arc::new(GlobalAccessFilter::from_lines("", &["10.0.0.0/8"]).unwrap());
    let upstream = Arc::new(CountingUpstream::new(hickory_proto::op::ResponseCode::NoError));
    let pipeline = CorePipeline::new(
        global,
        ProfileAccessManager::new(None),
        EcsAwareCache::new(&CoreConfig::default()),
        Arc::new(EmptyProfileDb),
        Arc::new(NoopGeoIp),
        upstream.clone(),
        Arc::new(NoopMetrics),
        Arc::new(FixedClock),
        pipeline_config(),
    );

    let mut info = RequestInfo::new(
        "10.1.2.3".parse().unwrap(),
        "127.0.0.1:53".parse().unwrap(),
        1,
    );
    let request = query_message("example.com.", RecordType::A);
    let response = pipeline
        .handle(&ctx(), &mut info, TransportProtocol::Udp, &TransportMetadata::default(), &request)
        .await;

    assert!(response.is_none());
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn servfail_response_is_cached_and_not_refetched_within_the_ttl_cap() {
    let global = Arc::new(GlobalAccessFilter::from_lines("", &[]).unwrap());
    let upstream = Arc::new(CountingUpstream::new(hickory_proto::op::ResponseCode::ServFail));
    let pipeline = CorePipeline::new(
        global,
        ProfileAccessManager::new(None),
        EcsAwareCache::new(&CoreConfig::default()),
        Arc::new(EmptyProfileDb),
        Arc::new(NoopGeoIp),
        upstream.clone(),
        Arc::new(NoopMetrics),
        Arc::new(FixedClock),
        pipeline_config(),
    );
    let request = query_message("flaky.test.", RecordType::A);

    let mut info1 = RequestInfo::new(
        "127.0.0.1".parse().unwrap(),
        "127.0.0.1:53".parse().unwrap(),
        1,
    );
    let r1 = pipeline
        .handle(&ctx(), &mut info1, TransportProtocol::Udp, &TransportMetadata::default(), &request)
        .await
        .expect("SERVFAIL is still a response");
    assert_eq!(r1.rcode(), hickory_proto::op::ResponseCode::ServFail);
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);

    let mut info2 = RequestInfo::new(
        "127.0.0.1".parse().unwrap(),
        "127.0.0.1:53".parse().unwrap(),
        2,
    );
    let r2 = pipeline
        .handle(&ctx(), &mut info2, TransportProtocol::Udp, &TransportMetadata::default(), &request)
        .await
        .expect("second request should be served from the independent cache");
    assert_eq!(r2.rcode(), hickory_proto::op::ResponseCode::ServFail);
    assert_eq!(
        upstream.calls.load(Ordering::SeqCst),
        1,
        "SERVFAIL answers are cacheable per RFC 2308, so the second lookup must not refetch"
    );
}

struct LinkedIpProfileDb {
    profile: Arc<Profile>,
    device: Arc<Device>,
}

#[async_trait]
impl ProfileDbPort for LinkedIpProfileDb {
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
        Ok(Some((self.profile.clone(), self.device.clone())))
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
        unreachable!("not exercised by this test")
    }
}

fn geo(asn: u32) -> GeoLocation {
    GeoLocation {
        country: *b"US",
        asn,
    }
}

/// A profile whose own access config allow-lists one ASN; a shared
/// "standard" blocker blocks every host outright. The profile's allow-list
/// must short-circuit before the standard blocker is ever consulted.
#[tokio::test]
async fn profile_asn_allowlist_overrides_shared_standard_block() {
    let standard_rules = compile_domain_rules("||blocked-everywhere.test^\n").unwrap();
    let standard = Arc::new(StandardPerProfileBlocker::new(StandardBlockerConfig::compile(
        CidrSet::empty(),
        CidrSet::empty(),
        AsnSet::empty(),
        AsnSet::empty(),
        &standard_rules,
    )));

    let profile = Arc::new(Profile {
        id: ProfileId(1),
        access: ProfileAccessConfig {
            allowed_nets: CidrSet::empty(),
            blocked_nets: CidrSet::empty(),
            allowed_asn: AsnSet::from_asns([64500]),
            blocked_asn: AsnSet::empty(),
            blocklist_domain_rules: Arc::from([]),
            standard_enabled: true,
        },
        blocking_mode: ferrous_dns_domain::BlockingMode::Nxdomain,
        filtered_response_ttl: 300,
        deleted: false,
        devices: Arc::from([]),
        flags: ProfileFlags::default(),
    });
    let device = Arc::new(Device {
        id: DeviceId(Arc::from("d1")),
        linked_ip: Some("127.0.0.1".parse().unwrap()),
        dedicated_ips: Arc::from([]),
        auth: DeviceAuth::disabled(),
    });

    struct AsnGeoIp;
    #[async_trait]
    impl GeoIpPort for AsnGeoIp {
        async fn locate(&self, _host: &str, _ip: IpAddr) -> Result<Option<GeoLocation>, DomainError> {
            Ok(Some(geo(64500)))
        }
        fn subnet_by_location(&self, _location: GeoLocation, _family: EcsFamily) -> Option<KeySubnet> {
            None
        }
    }

    let global = Arc::new(GlobalAccessFilter::from_lines("", &[]).unwrap());
    let upstream = Arc::new(CountingUpstream::new(hickory_proto::op::ResponseCode::NoError));
    let pipeline = CorePipeline::new(
        global,
        ProfileAccessManager::new(Some(standard)),
        EcsAwareCache::new(&CoreConfig::default()),
        Arc::new(LinkedIpProfileDb { profile, device }),
        Arc::new(AsnGeoIp),
        upstream.clone(),
        Arc::new(NoopMetrics),
        Arc::new(FixedClock),
        pipeline_config(),
    );

    let mut info = RequestInfo::new(
        "127.0.0.1".parse().unwrap(),
        "127.0.0.1:53".parse().unwrap(),
        1,
    );
    let request = query_message("blocked-everywhere.test.", RecordType::A);
    let response = pipeline
        .handle(&ctx(), &mut info, TransportProtocol::Udp, &TransportMetadata::default(), &request)
        .await;

    assert!(
        response.is_some(),
        "the profile's own ASN allow-list should short-circuit before the standard blocker runs"
    );
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
}

/// A request carrying an ECS option whose GeoIP-resolved subnet maps to a
/// real `/24`, through a `GeoIpPort` that actually implements
/// `subnet_by_location`, produces an ECS-dependent cache entry that a
/// second request from a different address sharing the same subnet hits.
#[tokio::test]
async fn ecs_dependent_cache_hit_is_driven_by_geoip_subnet_mapping() {
    struct SubnetGeoIp;
    #[async_trait]
    impl GeoIpPort for SubnetGeoIp {
        async fn locate(&self, _host: &str, ip: IpAddr) -> Result<Option<GeoLocation>, DomainError> {
            let _ = ip;
            Ok(Some(geo(64500)))
        }
        fn subnet_by_location(&self, location: GeoLocation, family: EcsFamily) -> Option<KeySubnet> {
            if location.asn != 64500 || family != EcsFamily::V4 {
                return None;
            }
            Some(KeySubnet {
                addr: IpAddr::V4(Ipv4Addr::new(203, 0, 113, 0)),
                bits: 24,
            })
        }
    }

    let global = Arc::new(GlobalAccessFilter::from_lines("", &[]).unwrap());
    let upstream = Arc::new(ScopedEchoUpstream::new());
    let pipeline = CorePipeline::new(
        global,
        ProfileAccessManager::new(None),
        EcsAwareCache::new(&CoreConfig::default()),
        Arc::new(EmptyProfileDb),
        Arc::new(SubnetGeoIp),
        upstream.clone(),
        Arc::new(NoopMetrics),
        Arc::new(FixedClock),
        pipeline_config(),
    );

    fn ecs_query(host: &str, client_addr: Ipv4Addr) -> WireMessage {
        let mut wire = query_message(host, RecordType::A);
        let mut edns = hickory_proto::op::Edns::new();
        edns.set_max_payload(1232);
        edns.options_mut().insert(EdnsOption::Subnet(ClientSubnet::new(
            IpAddr::V4(client_addr),
            24,
            0,
        )));
        wire.message.set_edns(edns);
        wire
    }

    let mut info1 = RequestInfo::new(
        IpAddr::V4(Ipv4Addr::new(198, 51, 100, 7)),
        "127.0.0.1:53".parse().unwrap(),
        1,
    );
    let request1 = ecs_query("geo.test.", Ipv4Addr::new(198, 51, 100, 7));
    let r1 = pipeline
        .handle(&ctx(), &mut info1, TransportProtocol::Udp, &TransportMetadata::default(), &request1)
        .await
        .expect("expected a response");
    assert_eq!(r1.message.answers().len(), 1);
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);

    // A different client address, but GeoIP maps its ASN to the same
    // stored subnet: the dependent-tier cache entry must be shared.
    let mut info2 = RequestInfo::new(
        IpAddr::V4(Ipv4Addr::new(198, 51, 100, 200)),
        "127.0.0.1:53".parse().unwrap(),
        2,
    );
    let request2 = ecs_query("geo.test.", Ipv4Addr::new(198, 51, 100, 200));
    let r2 = pipeline
        .handle(&ctx(), &mut info2, TransportProtocol::Udp, &TransportMetadata::default(), &request2)
        .await
        .expect("expected a cached response");
    assert_eq!(r2.message.answers().len(), 1);
    assert_eq!(
        upstream.calls.load(Ordering::SeqCst),
        1,
        "both clients resolve to the same GeoIP subnet and should share the dependent cache entry"
    );
}
