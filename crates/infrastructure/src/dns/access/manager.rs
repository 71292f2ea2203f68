//! Per-profile access manager: composes an optional shared
//! "standard" blocker with each profile's own independently configured
//! blocker.

use super::standard::StandardBlockerConfig;
use super::StandardPerProfileBlocker;
use ferrous_dns_domain::{DomainError, GeoLocation, Profile};
use hickory_proto::rr::RecordType;
use std::net::IpAddr;

pub struct ProfileAccessManager {
    standard: Option<std::sync::Arc<StandardPerProfileBlocker>>,
}

impl ProfileAccessManager {
    pub fn new(standard: Option<std::sync::Arc<StandardPerProfileBlocker>>) -> Self {
        Self { standard }
    }

    /// Evaluate a profile's own access config without a
    /// caller-held `StandardPerProfileBlocker` instance: the profile's
    /// `ProfileAccessConfig` is already an `Arc`-shared snapshot fetched
    /// fresh from the profile DB for this request, so its rule lines are
    /// compiled on the fly rather than through a separately reconfigured
    /// blocker (there is nothing to reconfigure in place — a new profile
    /// fetch already is the new snapshot).
    pub fn is_profile_blocked(
        &self,
        profile: &Profile,
        remote_addr: IpAddr,
        host: &str,
        qtype: RecordType,
        geo: Option<GeoLocation>,
    ) -> Result<bool, DomainError> {
        let mut rules = Vec::with_capacity(profile.access.blocklist_domain_rules.len());
        for line in profile.access.blocklist_domain_rules.iter() {
            if let Some(rule) = ferrous_dns_domain::parse_rule_line(line)
                .map_err(|e| DomainError::RuleCompile(e.0))?
            {
                rules.push(rule);
            }
        }
        let own = StandardPerProfileBlocker::new(StandardBlockerConfig::compile(
            profile.access.allowed_nets.clone(),
            profile.access.blocked_nets.clone(),
            profile.access.allowed_asn.clone(),
            profile.access.blocked_asn.clone(),
            &rules,
        ));
        Ok(self.is_blocked(
            profile.access.standard_enabled,
            &own,
            remote_addr,
            host,
            qtype,
            geo,
        ))
    }

    /// `standard_enabled` comes from the profile's own access config
    ///; `own` is the
    /// profile's independent blocker.
    pub fn is_blocked(
        &self,
        standard_enabled: bool,
        own: &StandardPerProfileBlocker,
        remote_addr: IpAddr,
        host: &str,
        qtype: RecordType,
        geo: Option<GeoLocation>,
    ) -> bool {
        if standard_enabled {
            if let Some(standard) = &self.standard {
                if standard.is_blocked(remote_addr, host, qtype, geo) {
                    return true;
                }
            }
        }
        own.is_blocked(remote_addr, host, qtype, geo)
    }
}
