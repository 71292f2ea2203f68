//! Special-domain short-circuit handler (C6).
//!
//! Grounded on an established access-filter short-circuit style (a table of
//! `(predicate, response)` pairs evaluated in order, any match stopping the
//! pipeline) already used by [`crate::dns::access::global`], generalized to
//! DDR/SVCB synthesis and the fixed-hostname triggers this spec adds.

use ferrous_dns_application::ports::{CoreMetricsPort, SpecialDomainClass};
use ferrous_dns_domain::{DomainError, Profile, ProfileFlags, RequestInfo, WireMessage};
use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::rdata::svcb::SVCB;
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use std::sync::Arc;

use crate::dns::device::TransportProtocol;

/// The per-server-group DDR templates: a single public target shared by
/// every device, plus the suffix a per-device target is built from
/// (`<deviceID>.<suffix>`).
#[derive(Debug, Clone, Default)]
pub struct DdrTemplates {
    pub public_target: Option<Arc<str>>,
    pub device_target_suffix: Option<Arc<str>>,
}

pub enum SpecialOutcome {
    Handled(WireMessage),
    NotSpecial,
}

const DDR_ANSWER_TTL: u32 = 60;

/// Evaluate the special-domain table against one request. Returns
/// `NotSpecial` if nothing matched; the caller then continues the pipeline.
pub fn handle(
    info: &RequestInfo,
    request: &WireMessage,
    protocol: TransportProtocol,
    ddr: &DdrTemplates,
    ddr_enabled: bool,
    default_flags: ProfileFlags,
    metrics: &dyn CoreMetricsPort,
) -> Result<SpecialOutcome, DomainError> {
    use hickory_proto::rr::DNSClass as Class;
    if info.qclass != Class::IN {
        return Ok(SpecialOutcome::NotSpecial);
    }

    if info.qtype == RecordType::SVCB {
        if let Some(target) = matching_ddr_target(&info.host, info.device_id(), ddr) {
            metrics.inc_special_domain(SpecialDomainClass::Ddr);
            return Ok(SpecialOutcome::Handled(build_ddr_response(
                info, request, ddr_enabled, protocol, &target,
            )));
        }
    }

    if is_resolver_arpa_subdomain(&info.host) {
        metrics.inc_special_domain(SpecialDomainClass::ResolverArpaMalformed);
        return Ok(SpecialOutcome::Handled(nodata_response(request)));
    }

    if &*info.host == "use-application-dns.net"
        && class_blocked(info.profile.as_deref(), default_flags, |f| f.blocks_firefox_canary)
    {
        metrics.inc_special_domain(SpecialDomainClass::FirefoxCanary);
        return Ok(SpecialOutcome::Handled(rcode_response(
            request,
            ResponseCode::Refused,
        )));
    }

    const PRIVATE_RELAY_HOSTS: [&str; 3] =
        ["mask.icloud.com", "mask-h2.icloud.com", "mask-canary.icloud.com"];
    if PRIVATE_RELAY_HOSTS.contains(&&*info.host)
        && matches!(info.qtype, RecordType::A | RecordType::AAAA)
        && class_blocked(info.profile.as_deref(), default_flags, |f| f.blocks_private_relay)
    {
        metrics.inc_special_domain(SpecialDomainClass::PrivateRelay);
        return Ok(SpecialOutcome::Handled(rcode_response(
            request,
            ResponseCode::NXDomain,
        )));
    }

    if &*info.host == "dns-tunnel-check.googlezip.net"
        && matches!(info.qtype, RecordType::A | RecordType::AAAA)
        && class_blocked(info.profile.as_deref(), default_flags, |f| f.blocks_chrome_prefetch)
    {
        metrics.inc_special_domain(SpecialDomainClass::ChromePrefetch);
        return Ok(SpecialOutcome::Handled(rcode_response(
            request,
            ResponseCode::NXDomain,
        )));
    }

    Ok(SpecialOutcome::NotSpecial)
}

fn class_blocked(
    profile: Option<&Profile>,
    default_flags: ProfileFlags,
    pick: impl Fn(&ProfileFlags) -> bool,
) -> bool {
    match profile {
        Some(p) => pick(&p.flags),
        None => pick(&default_flags),
    }
}

fn is_resolver_arpa_subdomain(host: &str) -> bool {
    host == "resolver.arpa" || host.ends_with(".resolver.arpa")
}

enum DdrTarget {
    Public(Arc<str>),
    PerDevice(String),
}

fn matching_ddr_target(host: &str, device_id: Option<&str>, ddr: &DdrTemplates) -> Option<DdrTarget> {
    if host == "_dns.resolver.arpa" {
        return ddr
            .public_target
            .clone()
            .map(DdrTarget::Public)
            .or(Some(DdrTarget::Public(Arc::from("resolver.arpa"))));
    }
    if let Some(public_target) = &ddr.public_target {
        if host == format!("_dns.{public_target}") {
            return Some(DdrTarget::Public(public_target.clone()));
        }
    }
    if let (Some(device_id), Some(suffix)) = (device_id, &ddr.device_target_suffix) {
        if host == format!("_dns.{device_id}.{suffix}") {
            return Some(DdrTarget::PerDevice(format!("{device_id}.{suffix}")));
        }
    }
    None
}

fn build_ddr_response(
    info: &RequestInfo,
    request: &WireMessage,
    ddr_enabled: bool,
    protocol: TransportProtocol,
    target: &DdrTarget,
) -> WireMessage {
    if !ddr_enabled {
        return rcode_response(request, ResponseCode::NXDomain);
    }

    let doh_only_on_wrong_transport = info
        .device
        .as_ref()
        .map(|d| d.auth.doh_auth_only && !protocol.is_doh())
        .unwrap_or(false);
    if doh_only_on_wrong_transport {
        return nodata_response(request);
    }

    let target_name = match target {
        DdrTarget::Public(t) => t.to_string(),
        DdrTarget::PerDevice(t) => t.clone(),
    };

    let mut response = set_reply(request, ResponseCode::NoError);
    if let Ok(target) = target_name.parse::<Name>() {
        let svcb = SVCB::new(1, target, vec![]);
        let record = Record::from_rdata(
            question_name(request),
            DDR_ANSWER_TTL,
            RData::SVCB(svcb),
        );
        response.add_answer(record);
    }
    WireMessage::new(response)
}

fn question_name(request: &WireMessage) -> Name {
    request
        .message
        .queries()
        .first()
        .map(|q| q.name().clone())
        .unwrap_or_else(|| Name::root())
}

fn nodata_response(request: &WireMessage) -> WireMessage {
    WireMessage::new(set_reply(request, ResponseCode::NoError))
}

/// FORMERR response for a malformed ECS option (`BadECSError`).
pub fn formerr_response(request: &WireMessage) -> WireMessage {
    WireMessage::new(set_reply(request, ResponseCode::FormErr))
}

fn rcode_response(request: &WireMessage, rcode: ResponseCode) -> WireMessage {
    WireMessage::new(set_reply(request, rcode))
}

fn set_reply(request: &WireMessage, rcode: ResponseCode) -> Message {
    let mut response = request.message.clone();
    response.set_message_type(MessageType::Response);
    response.set_response_code(rcode);
    let _ = response.take_answers();
    let _ = response.take_name_servers();
    let _ = response.take_additionals();
    response
}

trait RequestInfoExt {
    fn device_id(&self) -> Option<&str>;
}

impl RequestInfoExt for RequestInfo {
    fn device_id(&self) -> Option<&str> {
        self.device.as_ref().map(|d| &*d.id.0)
    }
}
