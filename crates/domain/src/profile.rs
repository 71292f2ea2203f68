//! Profile and device identity: `Profile`, `Device`, `ProfileAccessConfig`.
//!
//! Grounded on an established `Group` (`id: Option<i64>`, `Arc<str>` fields,
//! `validate_*` associated functions) but reshaped around profile/device
//! resolution rather than group administration.

use crate::cidr::{AsnSet, CidrSet};
use std::net::IpAddr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProfileId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(pub Arc<str>);

/// Policy describing how a profile's own CIDR/ASN/domain-rule access
/// control behaves.
///
/// Order semantics: allow lists short-circuit to "not
/// blocked"; block lists are then consulted; an empty allow list does not
/// imply "allow all".
#[derive(Debug, Clone)]
pub struct ProfileAccessConfig {
    pub allowed_nets: CidrSet,
    pub blocked_nets: CidrSet,
    pub allowed_asn: AsnSet,
    pub blocked_asn: AsnSet,
    /// Ad-block-style rule source lines, compiled
    /// lazily by the infrastructure layer's rule matcher.
    pub blocklist_domain_rules: Arc<[Arc<str>]>,
    pub standard_enabled: bool,
}

impl ProfileAccessConfig {
    pub fn empty() -> Self {
        Self {
            allowed_nets: CidrSet::empty(),
            blocked_nets: CidrSet::empty(),
            allowed_asn: AsnSet::empty(),
            blocked_asn: AsnSet::empty(),
            blocklist_domain_rules: Arc::from([]),
            standard_enabled: false,
        }
    }
}

/// DNSSEC/auth settings and IP bindings for one device under a profile
///.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: DeviceId,
    pub linked_ip: Option<IpAddr>,
    pub dedicated_ips: Arc<[IpAddr]>,
    pub auth: DeviceAuth,
}

/// Password-hash-backed authentication settings for a device.
#[derive(Debug, Clone)]
pub struct DeviceAuth {
    pub enabled: bool,
    pub doh_auth_only: bool,
    /// Opaque password hash; verified via `PasswordHasher::authenticate`.
    pub password_hash: Option<Arc<str>>,
}

impl DeviceAuth {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            doh_auth_only: false,
            password_hash: None,
        }
    }
}

/// A client profile: access policy, blocking mode, devices.
#[derive(Debug, Clone)]
pub struct Profile {
    pub id: ProfileId,
    pub access: ProfileAccessConfig,
    pub blocking_mode: BlockingMode,
    pub filtered_response_ttl: u32,
    pub deleted: bool,
    pub devices: Arc<[Device]>,
    pub flags: ProfileFlags,
}

impl Profile {
    /// A deleted profile is treated as absent everywhere in the pipeline
    ///.
    pub fn is_usable(&self) -> bool {
        !self.deleted
    }

    pub fn device(&self, id: &DeviceId) -> Option<&Device> {
        self.devices.iter().find(|d| &d.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockingMode {
    Nxdomain,
    Refused,
    CustomIp,
}

/// Per-profile feature toggles consulted by the special-domain handler
///.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileFlags {
    pub ddr_enabled: bool,
    pub blocks_firefox_canary: bool,
    pub blocks_private_relay: bool,
    pub blocks_chrome_prefetch: bool,
}
