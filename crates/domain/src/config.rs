//! Core configuration options, loaded the way
//! `ferrous_dns_domain::config` loads the rest of the server configuration:
//! `serde` + `toml`, every field `#[serde(default)]` so a partial fragment
//! loads cleanly and a core can be built without a config file in tests.

use serde::{Deserialize, Serialize};

fn default_cache_size() -> usize {
    65_536
}

fn default_ecs_cache_size() -> usize {
    65_536
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Capacity of the ECS-independent cache. Must be > 0 if caching is
    /// enabled.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,

    /// Capacity of the ECS-dependent cache.
    #[serde(default = "default_ecs_cache_size")]
    pub ecs_cache_size: usize,

    /// TTL floor (seconds) applied to cached non-SERVFAIL responses when
    /// `use_cache_ttl_override` is set.
    #[serde(default)]
    pub cache_min_ttl: u32,

    #[serde(default)]
    pub use_cache_ttl_override: bool,

    /// Selects the two-tier ECS-aware cache vs. a simpler single cache.
    #[serde(default = "default_true")]
    pub use_ecs_cache: bool,

    /// `*.dns.example`-style patterns for SNI-based device-ID extraction.
    #[serde(default)]
    pub device_id_wildcards: Vec<String>,

    #[serde(default)]
    pub linked_ip_enabled: bool,

    /// Whether this server binds to specific interfaces/addresses (gates
    /// the plain-DNS dedicated-IP fallback in device resolution).
    #[serde(default)]
    pub binds_to_interfaces: bool,

    /// Whether Discovery of Designated Resolvers (RFC 9462) is served at
    /// all, absent a more specific per-profile override.
    #[serde(default)]
    pub ddr_enabled: bool,

    /// The server group's public DDR target (server-group template),
    /// e.g. `resolver.example.net`.
    #[serde(default)]
    pub ddr_public_target: Option<String>,

    /// The suffix a per-device DDR target is built from:
    /// `<deviceID>.<suffix>`.
    #[serde(default)]
    pub ddr_device_target_suffix: Option<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            cache_size: default_cache_size(),
            ecs_cache_size: default_ecs_cache_size(),
            cache_min_ttl: 0,
            use_cache_ttl_override: false,
            use_ecs_cache: true,
            device_id_wildcards: Vec::new(),
            linked_ip_enabled: false,
            binds_to_interfaces: false,
            ddr_enabled: false,
            ddr_public_target: None,
            ddr_device_target_suffix: None,
        }
    }
}

impl CoreConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}
