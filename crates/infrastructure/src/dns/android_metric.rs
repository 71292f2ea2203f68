//! Android-metric hostname canonicalization (C8).
//!
//! Android's private DNS probe queries a hex-prefixed hostname unique to
//! the device (`<hex>-dnsohttps-ds.metric.gstatic.com`); canonicalizing it
//! to a fixed name before forwarding/caching lets every device share one
//! upstream query and one cache entry. Grounded on an established
//! `block_filter`-adjacent hostname-pattern matchers (fixed suffix, variable
//! hex prefix, `aho-corasick`-free since there is only one pattern per
//! suffix).

use hickory_proto::rr::Name;
use std::str::FromStr;
use std::sync::Arc;

const HTTPS_SUFFIX: &str = "-dnsohttps-ds.metric.gstatic.com";
const TLS_SUFFIX: &str = "-dnsotls-ds.metric.gstatic.com";
const CANONICAL_HEX: &str = "0000000000000000";

/// The matched pattern and the hex prefix it carried, captured so the
/// answer can be rewritten back to the client's original name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidMetricMatch {
    pub original_host: Arc<str>,
    pub canonical_host: Arc<str>,
}

/// Detect an Android-metric hostname and compute its canonical form.
pub fn detect(host: &str) -> Option<AndroidMetricMatch> {
    let (hex, suffix) = if let Some(hex) = host.strip_suffix(HTTPS_SUFFIX) {
        (hex, HTTPS_SUFFIX)
    } else if let Some(hex) = host.strip_suffix(TLS_SUFFIX) {
        (hex, TLS_SUFFIX)
    } else {
        return None;
    };

    if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    let canonical = format!("{}{}", &CANONICAL_HEX[..hex.len().min(CANONICAL_HEX.len())], suffix);
    Some(AndroidMetricMatch {
        original_host: Arc::from(host),
        canonical_host: Arc::from(canonical.as_str()),
    })
}

/// Rewrite `name` to the canonical hostname for the outgoing upstream
/// query.
pub fn canonical_name(m: &AndroidMetricMatch) -> Option<Name> {
    Name::from_str(&format!("{}.", m.canonical_host)).ok()
}

/// Rewrite every owner name in `names` that equals the canonical hostname
/// back to the client's originally-queried hostname, so the response
/// correlates with the question the client actually sent.
pub fn rewrite_owner_name(name: &Name, m: &AndroidMetricMatch) -> Option<Name> {
    let canonical: Name = Name::from_str(&format!("{}.", m.canonical_host)).ok()?;
    if name == &canonical {
        Name::from_str(&format!("{}.", m.original_host)).ok()
    } else {
        None
    }
}
