//! Standard per-profile blocker (C3): a reconfigurable
//! variant of the global filter. Grounded directly on an established
//! `BlockFilterEngine`: the entire config is rebuilt off to the side and
//! installed with a single `ArcSwap::store`, so a reader never observes a
//! half-updated snapshot and never blocks on a writer.

use arc_swap::ArcSwap;
use ferrous_dns_domain::{AsnSet, CidrSet, DomainError, GeoLocation, Rule};
use hickory_proto::rr::RecordType;
use std::net::IpAddr;
use std::sync::Arc;

use crate::dns::rules::RuleIndex;

pub struct StandardBlockerConfig {
    pub allowed_nets: CidrSet,
    pub blocked_nets: CidrSet,
    pub allowed_asn: AsnSet,
    pub blocked_asn: AsnSet,
    pub domain_rules: RuleIndex,
}

impl StandardBlockerConfig {
    pub fn empty() -> Self {
        Self {
            allowed_nets: CidrSet::empty(),
            blocked_nets: CidrSet::empty(),
            allowed_asn: AsnSet::empty(),
            blocked_asn: AsnSet::empty(),
            domain_rules: RuleIndex::compile(&[]),
        }
    }

    pub fn compile(
        allowed_nets: CidrSet,
        blocked_nets: CidrSet,
        allowed_asn: AsnSet,
        blocked_asn: AsnSet,
        domain_rule_lines: &[Rule],
    ) -> Self {
        Self {
            allowed_nets,
            blocked_nets,
            allowed_asn,
            blocked_asn,
            domain_rules: RuleIndex::compile(domain_rule_lines),
        }
    }
}

/// Reconfigurable network+domain blocker. `set_config` atomically replaces
/// every field at once; `is_blocked` reads a single `Arc` snapshot for the
/// whole call, so concurrent reconfiguration never produces a decision
/// mixing old and new fields.
pub struct StandardPerProfileBlocker {
    config: ArcSwap<StandardBlockerConfig>,
}

impl StandardPerProfileBlocker {
    pub fn new(config: StandardBlockerConfig) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
        }
    }

    pub fn empty() -> Self {
        Self::new(StandardBlockerConfig::empty())
    }

    pub fn set_config(&self, config: StandardBlockerConfig) {
        self.config.store(Arc::new(config));
    }

    /// Evaluate the blocking decision for one request. Order is fixed:
    /// allow short-circuit, then block lists, then the domain-rule
    /// matcher.
    pub fn is_blocked(
        &self,
        remote_addr: IpAddr,
        host: &str,
        qtype: RecordType,
        geo: Option<GeoLocation>,
    ) -> bool {
        let cfg = self.config.load();

        let allowed_by_asn = geo.is_some_and(|g| cfg.allowed_asn.contains(g.asn));
        if cfg.allowed_nets.contains(remote_addr) || allowed_by_asn {
            return false;
        }

        let blocked_by_asn = geo.is_some_and(|g| cfg.blocked_asn.contains(g.asn));
        if cfg.blocked_nets.contains(remote_addr) || blocked_by_asn {
            return true;
        }

        cfg.domain_rules.eval(host, qtype).is_blocked()
    }
}

pub fn compile_domain_rules(text: &str) -> Result<Vec<Rule>, DomainError> {
    ferrous_dns_domain::parse_rule_text(text).map_err(|e| DomainError::RuleCompile(e.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geo(asn: u32) -> GeoLocation {
        GeoLocation {
            country: *b"US",
            asn,
        }
    }

    #[test]
    fn empty_allow_list_does_not_imply_allow_all() {
        let blocker = StandardPerProfileBlocker::new(StandardBlockerConfig::compile(
            CidrSet::empty(),
            CidrSet::from_cidrs(["10.0.0.0/8"]).unwrap(),
            AsnSet::empty(),
            AsnSet::empty(),
            &[],
        ));
        assert!(blocker.is_blocked("10.1.1.1".parse().unwrap(), "x.test", RecordType::A, None));
        assert!(!blocker.is_blocked("1.1.1.1".parse().unwrap(), "x.test", RecordType::A, None));
    }

    #[test]
    fn allow_list_beats_block_list() {
        let blocker = StandardPerProfileBlocker::new(StandardBlockerConfig::compile(
            CidrSet::from_cidrs(["10.0.0.0/8"]).unwrap(),
            CidrSet::from_cidrs(["10.0.0.0/8"]).unwrap(),
            AsnSet::empty(),
            AsnSet::empty(),
            &[],
        ));
        assert!(!blocker.is_blocked("10.1.1.1".parse().unwrap(), "x.test", RecordType::A, None));
    }

    #[test]
    fn asn_checks_require_geo_location() {
        let blocker = StandardPerProfileBlocker::new(StandardBlockerConfig::compile(
            CidrSet::empty(),
            CidrSet::empty(),
            AsnSet::empty(),
            AsnSet::from_asns([64500]),
            &[],
        ));
        // No geo location: ASN block list is never consulted.
        assert!(!blocker.is_blocked("1.1.1.1".parse().unwrap(), "x.test", RecordType::A, None));
        assert!(blocker.is_blocked(
            "1.1.1.1".parse().unwrap(),
            "x.test",
            RecordType::A,
            Some(geo(64500))
        ));
    }

    #[test]
    fn falls_through_to_domain_rules() {
        let rules = compile_domain_rules("||ads.test^\n").unwrap();
        let blocker = StandardPerProfileBlocker::new(StandardBlockerConfig::compile(
            CidrSet::empty(),
            CidrSet::empty(),
            AsnSet::empty(),
            AsnSet::empty(),
            &rules,
        ));
        assert!(blocker.is_blocked("1.1.1.1".parse().unwrap(), "ads.test", RecordType::A, None));
        assert!(!blocker.is_blocked("1.1.1.1".parse().unwrap(), "safe.test", RecordType::A, None));
    }

    #[test]
    fn reconfiguration_replaces_entire_snapshot() {
        let blocker = StandardPerProfileBlocker::empty();
        assert!(!blocker.is_blocked("10.1.1.1".parse().unwrap(), "x.test", RecordType::A, None));
        blocker.set_config(StandardBlockerConfig::compile(
            CidrSet::empty(),
            CidrSet::from_cidrs(["10.0.0.0/8"]).unwrap(),
            AsnSet::empty(),
            AsnSet::empty(),
            &[],
        ));
        assert!(blocker.is_blocked("10.1.1.1".parse().unwrap(), "x.test", RecordType::A, None));
    }
}

