//! Global access filter (C2): a static, process-wide
//! blocklist built once at startup and never reconfigured afterward.
//! Concurrently callable with no internal mutation, per the stated
//! invariant — there is no lock because there is nothing to swap.

use crate::dns::rules::RuleIndex;
use ferrous_dns_domain::{CidrSet, DomainError, Rule};
use hickory_proto::rr::RecordType;
use std::net::IpAddr;

pub struct GlobalAccessFilter {
    domains: RuleIndex,
    subnets: CidrSet,
}

impl GlobalAccessFilter {
    pub fn new(blocked_domain_rules: &[Rule], blocked_subnets: CidrSet) -> Self {
        Self {
            domains: RuleIndex::compile(blocked_domain_rules),
            subnets: blocked_subnets,
        }
    }

    pub fn from_lines(blocked_domains: &str, blocked_cidrs: &[&str]) -> Result<Self, DomainError> {
        let rules = ferrous_dns_domain::parse_rule_text(blocked_domains)
            .map_err(|e| DomainError::RuleCompile(e.0))?;
        let subnets = CidrSet::from_cidrs(blocked_cidrs)?;
        Ok(Self::new(&rules, subnets))
    }

    pub fn is_blocked_host(&self, host: &str, qtype: RecordType) -> bool {
        self.domains.eval(host, qtype).is_blocked()
    }

    pub fn is_blocked_ip(&self, ip: IpAddr) -> bool {
        self.subnets.contains(ip)
    }
}
