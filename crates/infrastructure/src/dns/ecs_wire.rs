//! Wire-format adapter between `hickory_proto`'s EDNS Client Subnet option
//! and `ferrous_dns_domain::EcsOption`.
//!
//! Isolated in its own module so the one genuinely uncertain corner of the
//! `hickory-proto` surface this crate touches — the `ClientSubnet` rdata
//! shape — has a single call site to fix if the field order changes across
//! `hickory-proto` releases.

use ferrous_dns_domain::{DomainError, EcsFamily, EcsOption};
use hickory_proto::op::Message;
use hickory_proto::rr::rdata::opt::{ClientSubnet, EdnsCode, EdnsOption};

/// Decode the ECS option carried in `message`'s OPT record, if any.
///
/// Per `BadEcsError`: a malformed option (unsupported family,
/// address/prefix mismatch) is reported rather than silently ignored, since
/// it must turn into a FORMERR response.
pub fn decode_ecs(message: &Message) -> Result<Option<EcsOption>, DomainError> {
    let Some(edns) = message.extensions() else {
        return Ok(None);
    };
    let Some(EdnsOption::Subnet(subnet)) = edns.options().get(EdnsCode::Subnet) else {
        return Ok(None);
    };
    let family = EcsFamily::from_u16(family_of(subnet))
        .ok_or_else(|| DomainError::BadEcs("unsupported address family".to_string()))?;
    let option = EcsOption::new(
        family,
        subnet.source_prefix(),
        subnet.scope_prefix(),
        subnet.addr(),
    )?;
    Ok(Some(option))
}

/// Build the wire-format EDNS option for outgoing requests/responses.
pub fn encode_ecs(ecs: &EcsOption) -> EdnsOption {
    EdnsOption::Subnet(ClientSubnet::new(
        ecs.address,
        ecs.source_prefix,
        ecs.scope_prefix,
    ))
}

fn family_of(subnet: &ClientSubnet) -> u16 {
    match subnet.addr() {
        std::net::IpAddr::V4(_) => 1,
        std::net::IpAddr::V6(_) => 2,
    }
}

/// Insert or replace the ECS option on `message`'s OPT record, creating the
/// OPT record with the default EDNS UDP payload size if the
/// message does not yet carry one.
pub fn set_ecs(message: &mut Message, ecs: &EcsOption) {
    const DEFAULT_EDNS_UDP_SIZE: u16 = 1232;

    if message.extensions().is_none() {
        let mut edns = hickory_proto::op::Edns::new();
        edns.set_max_payload(DEFAULT_EDNS_UDP_SIZE);
        message.set_edns(edns);
    }
    if let Some(edns) = message.extensions_mut() {
        edns.options_mut().insert(encode_ecs(ecs));
    }
}
