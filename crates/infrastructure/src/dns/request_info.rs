//! Request-info assembler (C5, "Request Info").
//!
//! Normalizes the question, decodes ECS, enriches with GeoIP, and attaches
//! the resolved profile/device. Grounded on an established
//! `RequestContextBuilder`-style assembly step (one function building the
//! per-request struct from wire + transport inputs before the middleware
//! chain runs), generalized around this crate's pooled `RequestInfo`.

use crate::dns::device::{self, DeviceIdentity, Resolution, TransportMetadata, TransportProtocol};
use crate::dns::ecs_wire;
use ferrous_dns_application::ports::{GeoIpPort, ProfileDbPort};
use ferrous_dns_domain::{normalize_host, DomainError, RequestEcs, RequestInfo, WireMessage};
use std::net::SocketAddr;
use tracing::warn;

/// Static configuration the assembler consults: SNI-wildcard domains,
/// linked-IP resolution, dedicated-address binding.
pub struct AssemblerConfig<'a> {
    pub device_wildcard_domains: &'a [String],
    pub linked_ip_enabled: bool,
    pub binds_to_interfaces: bool,
    pub server_addresses: &'a [SocketAddr],
}

/// Outcome of assembling one request: a ready `RequestInfo`, or a signal
/// that the request must be silently dropped (`UnknownDedicated`).
pub enum Assembled {
    Ready,
    Drop,
}

/// Fill `info` in place from `wire`, transport metadata, and the
/// profile-DB/GeoIP collaborators. `info` must already have been reset by
/// the caller (object-pool convention).
#[allow(clippy::too_many_arguments)]
pub async fn assemble(
    info: &mut RequestInfo,
    wire: &WireMessage,
    protocol: TransportProtocol,
    transport: &TransportMetadata,
    profile_db: &dyn ProfileDbPort,
    geoip: &dyn GeoIpPort,
    config: &AssemblerConfig<'_>,
) -> Result<Assembled, DomainError> {
    let question = wire.single_question()?;
    info.host = normalize_host(&question.name().to_utf8());
    info.qtype = question.query_type();
    info.qclass = question.query_class();

    info.location = locate_or_none(geoip, &info.host, info.remote_ip).await;

    if let Some(ecs) = ecs_wire::decode_ecs(&wire.message)? {
        let ecs_location = locate_or_none(geoip, &info.host, ecs.address).await;
        info.ecs = RequestEcs {
            option: Some(ecs),
            location: ecs_location,
        };
    }

    let identity = device::extract_device_identity(
        protocol,
        transport,
        config.device_wildcard_domains,
    )
    .unwrap_or(DeviceIdentity::None);

    let resolution = device::resolve(
        identity,
        profile_db,
        protocol,
        info.remote_ip,
        info.local_addr,
        config.server_addresses,
        config.binds_to_interfaces,
        config.linked_ip_enabled,
    )
    .await?;

    match resolution {
        Resolution::Found(profile, Some(dev)) => {
            let authenticated = device::authenticate(
                &dev,
                protocol,
                transport.http_user.is_some(),
                transport.http_password.as_deref(),
            );
            if authenticated {
                info.profile = Some(profile);
                info.device = Some(dev);
            }
        }
        Resolution::Found(profile, None) => {
            info.profile = Some(profile);
        }
        Resolution::None => {}
        Resolution::UnknownDedicated => return Ok(Assembled::Drop),
    }

    Ok(Assembled::Ready)
}

/// GeoIP lookups are non-critical: a failure is logged
/// and the request proceeds with a null location rather than aborting.
async fn locate_or_none(
    geoip: &dyn GeoIpPort,
    host: &str,
    ip: std::net::IpAddr,
) -> Option<ferrous_dns_domain::GeoLocation> {
    match geoip.locate(host, ip).await {
        Ok(location) => location,
        Err(e) => {
            warn!("geoip lookup failed, proceeding with null location: {e}");
            None
        }
    }
}
