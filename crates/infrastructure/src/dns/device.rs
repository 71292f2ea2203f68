//! Device-identity extraction, resolution, and authentication (C4).
//!
//! New: no direct teacher counterpart exists (prior art resolves clients
//! by ARP/IP only, see `infrastructure::system::arp_reader` in the original
//! tree). Grounded on `ferrous_dns_domain::validators` for device-ID/extended
//! human-ID parsing and on an established `argon2`-backed password hashing
//! dependency (already declared in this crate's `Cargo.toml` for its own
//! auth surface) for `passwordHash.authenticate`.

use argon2::password_hash::{PasswordHash, PasswordVerifier};
use argon2::Argon2;
use ferrous_dns_application::ports::ProfileDbPort;
use ferrous_dns_domain::{
    parse_extended_human_id, validate_device_id_label, Device, DeviceId, DomainError, Profile,
    ProfileId,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, warn};

/// The transport a query arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportProtocol {
    Udp,
    Tcp,
    Dot,
    Doq,
    Doh,
    DnsCrypt,
}

impl TransportProtocol {
    pub fn is_doh(self) -> bool {
        matches!(self, TransportProtocol::Doh)
    }

    /// Whether this transport is one of the encrypted, stream-oriented
    /// transports the SNI-wildcard fallback applies to.
    pub fn is_encrypted(self) -> bool {
        matches!(
            self,
            TransportProtocol::Dot | TransportProtocol::Doq | TransportProtocol::Doh
        )
    }

    pub fn is_plain_dns(self) -> bool {
        matches!(self, TransportProtocol::Udp | TransportProtocol::Tcp)
    }
}

/// Transport metadata a listener hands the core alongside the decoded query
///.
#[derive(Debug, Clone, Default)]
pub struct TransportMetadata {
    pub tls_server_name: Option<String>,
    pub http_path: Option<String>,
    pub http_user: Option<String>,
    pub http_password: Option<String>,
    /// Raw CPE-ID (EDNS0 option code 65074) payload, if present.
    pub edns_cpe_id: Option<Vec<u8>>,
}

/// The recognized DNS-over-HTTPS query path prefix ( item 2:
/// "`<dns-path>` is the recognized DNS query path").
pub const DOH_QUERY_PATH: &str = "dns-query";

/// C4's output: a device-ID, an unresolved extended human ID, or nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceIdentity {
    DeviceId(Arc<str>),
    ExtendedHumanId {
        device_type: Arc<str>,
        profile_id: ProfileId,
        human_id: Arc<str>,
    },
    None,
}

/// Extract a device identity from transport metadata.
///
/// Returns `Ok(DeviceIdentity::None)` when no candidate applies — that is
/// not an error. Returns `Err(DomainError::DeviceId)` only when a candidate
/// was found but failed hostname-label validation;
/// error is non-fatal to the pipeline (the caller continues anonymously)
/// but must be surfaced to the error collector.
pub fn extract_device_identity(
    protocol: TransportProtocol,
    meta: &TransportMetadata,
    wildcard_domains: &[String],
) -> Result<DeviceIdentity, DomainError> {
    if protocol == TransportProtocol::DnsCrypt {
        return Ok(DeviceIdentity::None);
    }

    if protocol.is_doh() {
        if let Some(user) = &meta.http_user {
            validate_device_id_label(user)?;
            return Ok(DeviceIdentity::DeviceId(Arc::from(user.as_str())));
        }
        if let Some(candidate) = doh_path_device_candidate(meta.http_path.as_deref()) {
            return classify_doh_path_candidate(&candidate);
        }
    }

    if protocol.is_encrypted() {
        if let Some(sni) = &meta.tls_server_name {
            if let Some(candidate) = sni_wildcard_candidate(sni, wildcard_domains) {
                validate_device_id_label(&candidate)?;
                return Ok(DeviceIdentity::DeviceId(Arc::from(candidate.as_str())));
            }
        }
        return Ok(DeviceIdentity::None);
    }

    // Plain DNS (UDP/TCP): EDNS0 CPE-ID option (code 65074).
    if let Some(bytes) = &meta.edns_cpe_id {
        let candidate = String::from_utf8(bytes.clone())
            .map_err(|e| DomainError::DeviceId(format!("non-utf8 CPE-ID option: {e}")))?;
        validate_device_id_label(&candidate)?;
        return Ok(DeviceIdentity::DeviceId(Arc::from(candidate.as_str())));
    }

    Ok(DeviceIdentity::None)
}

/// The second path segment of a DoH URL shaped `/<dns-path>/<id>`, if the
/// first segment names the recognized DNS query path.
fn doh_path_device_candidate(path: Option<&str>) -> Option<String> {
    let path = path?;
    let mut segments = path.trim_matches('/').split('/');
    let first = segments.next()?;
    if first != DOH_QUERY_PATH {
        return None;
    }
    let second = segments.next()?;
    if second.is_empty() || segments.next().is_some() {
        return None;
    }
    Some(second.to_string())
}

/// A DoH path's second segment is either a plain device-ID or an extended
/// human ID token. Extended human IDs always embed a numeric profile-id
/// segment; a plain device-ID does not.
fn classify_doh_path_candidate(candidate: &str) -> Result<DeviceIdentity, DomainError> {
    match parse_extended_human_id(candidate) {
        Ok(parsed) => Ok(DeviceIdentity::ExtendedHumanId {
            device_type: parsed.device_type,
            profile_id: ProfileId(parsed.profile_id),
            human_id: parsed.human_id,
        }),
        Err(_) => {
            validate_device_id_label(candidate)?;
            Ok(DeviceIdentity::DeviceId(Arc::from(candidate)))
        }
    }
}

/// Strip `sni`'s first label and check the remainder is an immediate
/// subdomain of one of `wildcard_domains` ( item 3, e.g. sni
/// `phone.dns.example` with wildcard `*.dns.example` yields `phone`).
fn sni_wildcard_candidate(sni: &str, wildcard_domains: &[String]) -> Option<String> {
    let (label, rest) = sni.split_once('.')?;
    if label.is_empty() {
        return None;
    }
    wildcard_domains.iter().any(|pattern| {
        let suffix = pattern.strip_prefix("*.").unwrap_or(pattern);
        suffix.eq_ignore_ascii_case(rest)
    }).then(|| label.to_string())
}

/// Result of device/profile resolution: a resolved pair, an
/// explicit "drop this request" signal (`UnknownDedicated`), or absence.
pub enum Resolution {
    Found(Arc<Profile>, Option<Arc<Device>>),
    /// Plain DNS landed on a server-local dedicated address with no
    /// matching profile: silently drop, no response.
    UnknownDedicated,
    None,
}

/// Device/profile resolution algorithm.
#[allow(clippy::too_many_arguments)]
pub async fn resolve(
    identity: DeviceIdentity,
    profile_db: &dyn ProfileDbPort,
    protocol: TransportProtocol,
    remote_ip: IpAddr,
    local_addr: SocketAddr,
    server_addresses: &[SocketAddr],
    binds_to_interfaces: bool,
    linked_ip_enabled: bool,
) -> Result<Resolution, DomainError> {
    match identity {
        DeviceIdentity::DeviceId(id) => {
            match profile_db.profile_by_device_id(&id).await? {
                Some((profile, device)) if profile.is_usable() => {
                    Ok(Resolution::Found(profile, Some(device)))
                }
                _ => Ok(Resolution::None),
            }
        }
        DeviceIdentity::ExtendedHumanId {
            device_type,
            profile_id,
            human_id,
        } => match profile_db.profile_by_human_id(profile_id, &human_id).await? {
            Some((profile, Some(device))) if profile.is_usable() => {
                Ok(Resolution::Found(profile, Some(device)))
            }
            Some((profile, None)) if profile.is_usable() => {
                let (profile, device) = profile_db
                    .create_auto_device(profile_id, &human_id, &device_type)
                    .await?;
                Ok(Resolution::Found(profile, Some(device)))
            }
            _ => Ok(Resolution::None),
        },
        DeviceIdentity::None if protocol.is_plain_dns() => {
            if binds_to_interfaces && !server_addresses.iter().any(|a| a.ip() == local_addr.ip()) {
                return match profile_db.profile_by_dedicated_ip(local_addr.ip()).await? {
                    Some(profile) if profile.is_usable() => Ok(Resolution::Found(profile, None)),
                    Some(_) => Ok(Resolution::None),
                    None => Ok(Resolution::UnknownDedicated),
                };
            }
            if linked_ip_enabled {
                return match profile_db.profile_by_linked_ip(remote_ip).await? {
                    Some((profile, device)) if profile.is_usable() => {
                        Ok(Resolution::Found(profile, Some(device)))
                    }
                    _ => Ok(Resolution::None),
                };
            }
            Ok(Resolution::None)
        }
        DeviceIdentity::None => Ok(Resolution::None),
    }
}

/// Device authentication. `doh_password` is the HTTP Basic
/// password, when the request is DoH and carried userinfo.
pub fn authenticate(
    device: &Device,
    protocol: TransportProtocol,
    has_doh_userinfo: bool,
    doh_password: Option<&str>,
) -> bool {
    if !device.auth.enabled {
        return true;
    }
    if !protocol.is_doh() {
        return !device.auth.doh_auth_only;
    }
    if !has_doh_userinfo {
        return !device.auth.doh_auth_only;
    }
    let Some(password) = doh_password else {
        return false;
    };
    let Some(hash) = &device.auth.password_hash else {
        return false;
    };
    verify_password(hash, password)
}

fn verify_password(hash: &str, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        warn!("device auth: stored password hash failed to parse");
        return false;
    };
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => true,
        Err(_) => {
            debug!("device auth: password verification failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrous_dns_domain::DeviceAuth;

    fn device(auth: DeviceAuth) -> Device {
        Device {
            id: DeviceId(Arc::from("d1")),
            linked_ip: None,
            dedicated_ips: Arc::from([]),
            auth,
        }
    }

    #[test]
    fn doh_userinfo_wins_over_path() {
        let meta = TransportMetadata {
            http_user: Some("phone-1".to_string()),
            http_path: Some("/dns-query/other".to_string()),
            ..Default::default()
        };
        let identity =
            extract_device_identity(TransportProtocol::Doh, &meta, &[]).unwrap();
        assert_eq!(identity, DeviceIdentity::DeviceId(Arc::from("phone-1")));
    }

    #[test]
    fn doh_path_with_profile_id_segment_is_extended_human_id() {
        let meta = TransportMetadata {
            http_path: Some("/dns-query/ios-42-johns-phone".to_string()),
            ..Default::default()
        };
        let identity = extract_device_identity(TransportProtocol::Doh, &meta, &[]).unwrap();
        assert_eq!(
            identity,
            DeviceIdentity::ExtendedHumanId {
                device_type: Arc::from("ios"),
                profile_id: ProfileId(42),
                human_id: Arc::from("johns-phone"),
            }
        );
    }

    #[test]
    fn doh_path_without_profile_id_is_plain_device_id() {
        let meta = TransportMetadata {
            http_path: Some("/dns-query/phone1".to_string()),
            ..Default::default()
        };
        let identity = extract_device_identity(TransportProtocol::Doh, &meta, &[]).unwrap();
        assert_eq!(identity, DeviceIdentity::DeviceId(Arc::from("phone1")));
    }

    #[test]
    fn sni_wildcard_strips_first_label() {
        let meta = TransportMetadata {
            tls_server_name: Some("phone1.dns.example".to_string()),
            ..Default::default()
        };
        let wildcards = vec!["*.dns.example".to_string()];
        let identity = extract_device_identity(TransportProtocol::Dot, &meta, &wildcards).unwrap();
        assert_eq!(identity, DeviceIdentity::DeviceId(Arc::from("phone1")));
    }

    #[test]
    fn sni_not_matching_any_wildcard_yields_none() {
        let meta = TransportMetadata {
            tls_server_name: Some("phone1.other.example".to_string()),
            ..Default::default()
        };
        let wildcards = vec!["*.dns.example".to_string()];
        let identity = extract_device_identity(TransportProtocol::Dot, &meta, &wildcards).unwrap();
        assert_eq!(identity, DeviceIdentity::None);
    }

    #[test]
    fn plain_dns_reads_cpe_id_option() {
        let meta = TransportMetadata {
            edns_cpe_id: Some(b"cpe-device-1".to_vec()),
            ..Default::default()
        };
        let identity = extract_device_identity(TransportProtocol::Udp, &meta, &[]).unwrap();
        assert_eq!(identity, DeviceIdentity::DeviceId(Arc::from("cpe-device-1")));
    }

    #[test]
    fn dnscrypt_never_yields_identity() {
        let meta = TransportMetadata {
            edns_cpe_id: Some(b"ignored".to_vec()),
            ..Default::default()
        };
        let identity = extract_device_identity(TransportProtocol::DnsCrypt, &meta, &[]).unwrap();
        assert_eq!(identity, DeviceIdentity::None);
    }

    #[test]
    fn auth_disabled_always_passes() {
        let d = device(DeviceAuth::disabled());
        assert!(authenticate(&d, TransportProtocol::Udp, false, None));
    }

    #[test]
    fn doh_only_device_rejects_plain_dns() {
        let d = device(DeviceAuth {
            enabled: true,
            doh_auth_only: true,
            password_hash: None,
        });
        assert!(!authenticate(&d, TransportProtocol::Udp, false, None));
    }

    #[test]
    fn non_doh_only_device_allows_plain_dns_without_password() {
        let d = device(DeviceAuth {
            enabled: true,
            doh_auth_only: false,
            password_hash: None,
        });
        assert!(authenticate(&d, TransportProtocol::Udp, false, None));
    }

    #[test]
    fn doh_without_password_on_doh_only_device_fails() {
        let d = device(DeviceAuth {
            enabled: true,
            doh_auth_only: true,
            password_hash: Some(Arc::from("unused")),
        });
        assert!(!authenticate(&d, TransportProtocol::Doh, false, None));
    }

    #[test]
    fn doh_with_userinfo_but_no_password_fails() {
        let d = device(DeviceAuth {
            enabled: true,
            doh_auth_only: false,
            password_hash: Some(Arc::from("unused")),
        });
        assert!(!authenticate(&d, TransportProtocol::Doh, true, None));
    }
}

