//! Domain layer: wire/cache/profile/rule types shared by every other crate
//! in the workspace. No I/O, no async — pure data and the invariants that
//! govern it.

pub mod cache;
pub mod cidr;
pub mod config;
pub mod ecs;
pub mod errors;
pub mod message;
pub mod profile;
pub mod request_info;
pub mod rules;
pub mod validators;

pub use cache::{CacheEntry, CacheKey, CacheRequest, KeySubnet};
pub use cidr::{AsnSet, CidrSet};
pub use config::CoreConfig;
pub use ecs::{EcsFamily, EcsOption};
pub use errors::DomainError;
pub use message::WireMessage;
pub use profile::{
    BlockingMode, Device, DeviceAuth, DeviceId, Profile, ProfileAccessConfig, ProfileFlags,
    ProfileId,
};
pub use request_info::{normalize_host, FilteringGroupId, GeoLocation, RequestEcs, RequestInfo};
pub use rules::{parse_rule_line, parse_rule_text, Rule, RuleParseError};
pub use validators::{parse_extended_human_id, validate_device_id_label, ExtendedHumanId};
