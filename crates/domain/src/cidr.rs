//! CIDR membership sets, used by the global access filter (C2) and the
//! standard per-profile blocker (C3) for allow/block network checks.
//!
//! Generalized from an established `SubnetMatcher` (which resolves an IP to a
//! `group_id` via longest-prefix match) to a plain membership predicate,
//! since access control only needs "is this address in the set", not which
//! network matched.

use crate::errors::DomainError;
use ipnetwork::IpNetwork;
use std::net::IpAddr;

/// An immutable set of CIDR networks supporting O(n) membership checks.
///
/// `n` is expected to be small (tens to low hundreds of entries per
/// profile); a linear scan avoids the complexity of a radix trie while
/// remaining well within budget for per-request checks.
#[derive(Debug, Clone, Default)]
pub struct CidrSet {
    networks: Vec<IpNetwork>,
}

impl CidrSet {
    pub fn empty() -> Self {
        Self {
            networks: Vec::new(),
        }
    }

    pub fn from_cidrs<I, S>(cidrs: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let networks = cidrs
            .into_iter()
            .map(|s| {
                s.as_ref()
                    .parse::<IpNetwork>()
                    .map_err(|e| DomainError::InvalidCidr(format!("{}: {e}", s.as_ref())))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { networks })
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    /// Returns true if `ip` belongs to any network in the set.
    #[inline]
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.networks.iter().any(|net| net.contains(ip))
    }
}

/// An immutable set of ASN integers.
#[derive(Debug, Clone, Default)]
pub struct AsnSet {
    asns: Vec<u32>,
}

impl AsnSet {
    pub fn empty() -> Self {
        Self { asns: Vec::new() }
    }

    pub fn from_asns<I>(asns: I) -> Self
    where
        I: IntoIterator<Item = u32>,
    {
        Self {
            asns: asns.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.asns.is_empty()
    }

    #[inline]
    pub fn contains(&self, asn: u32) -> bool {
        self.asns.contains(&asn)
    }
}
