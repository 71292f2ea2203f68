//! EDNS Client Subnet (ECS) option, decoded form.
//!
//! See "ECS Option": `{family, prefix, scope, address}`, with the
//! invariant that the address family matches `family` and the address is
//! 4 bytes for IPv4 / 16 bytes for IPv6.

use crate::errors::DomainError;
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EcsFamily {
    V4,
    V6,
}

impl EcsFamily {
    /// IANA Address Family Number, as carried on the wire (1 = IPv4, 2 = IPv6).
    pub fn as_u16(self) -> u16 {
        match self {
            EcsFamily::V4 => 1,
            EcsFamily::V6 => 2,
        }
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            1 => Some(EcsFamily::V4),
            2 => Some(EcsFamily::V6),
            _ => None,
        }
    }

    pub fn of(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => EcsFamily::V4,
            IpAddr::V6(_) => EcsFamily::V6,
        }
    }

    pub fn max_prefix(self) -> u8 {
        match self {
            EcsFamily::V4 => 32,
            EcsFamily::V6 => 128,
        }
    }
}

/// A decoded EDNS Client Subnet option.
///
/// `source_prefix == 0` means the client explicitly declined ECS
/// personalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EcsOption {
    pub family: EcsFamily,
    pub source_prefix: u8,
    pub scope_prefix: u8,
    pub address: IpAddr,
}

impl EcsOption {
    pub fn new(
        family: EcsFamily,
        source_prefix: u8,
        scope_prefix: u8,
        address: IpAddr,
    ) -> Result<Self, DomainError> {
        if EcsFamily::of(address) != family {
            return Err(DomainError::BadEcs(format!(
                "address family mismatch: option declares {:?}, address is {}",
                family, address
            )));
        }
        if source_prefix > family.max_prefix() || scope_prefix > family.max_prefix() {
            return Err(DomainError::BadEcs(format!(
                "prefix length {} exceeds {:?} maximum of {}",
                source_prefix.max(scope_prefix),
                family,
                family.max_prefix()
            )));
        }
        Ok(Self {
            family,
            source_prefix,
            scope_prefix,
            address,
        })
    }

    /// True when the client explicitly declined ECS personalization.
    pub fn is_declined(&self) -> bool {
        self.source_prefix == 0
    }

    /// A zero-length-prefix subnet marker for `family`, used when the client
    /// declined ECS or when the upstream's echoed scope collapses to global.
    pub fn zero_prefix_for(family: EcsFamily) -> (IpAddr, u8) {
        let addr = match family {
            EcsFamily::V4 => IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
            EcsFamily::V6 => IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED),
        };
        (addr, 0)
    }
}
