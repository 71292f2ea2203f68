use thiserror::Error;

/// Error taxonomy for the request-handling core.
///
/// Each variant is a leaf with a stable kind; `reportable()` says whether the
/// variant should be surfaced to an error collector (sentry-style) or is an
/// expected, non-actionable outcome of validating untrusted input.
#[derive(Error, Debug)]
pub enum DomainError {
    /// ECS option failed to parse (malformed family/address length). Causes
    /// a FORMERR response and stops the pipeline.
    #[error("malformed EDNS client subnet option: {0}")]
    BadEcs(String),

    /// Device-ID could not be extracted or failed hostname-label validation.
    /// Non-fatal: the pipeline continues with the request treated as
    /// anonymous, but the error is surfaced to the collector.
    #[error("device identification failed: {0}")]
    DeviceId(String),

    /// A plain-DNS query landed on a server-local address dedicated to a
    /// profile that does not exist. The request must be silently dropped.
    #[error("no profile for dedicated address")]
    UnknownDedicated,

    /// The upstream collaborator failed (I/O, timeout, malformed response).
    /// The error is surfaced to the caller; the response is not cached.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Programmer error in cache bookkeeping (serialization misuse, a key
    /// computed inconsistently with its value). Indicates a bug, not a
    /// runtime condition callers should handle.
    #[error("cache internal error: {0}")]
    CacheInternal(String),

    /// GeoIP lookup failed. Non-critical: the pipeline proceeds with a null
    /// location.
    #[error("geoip lookup failed: {0}")]
    GeoIp(String),

    /// A rule line failed to compile (static blocklists: fatal at
    /// construction; per-profile blocklists: only reachable for
    /// already-validated input, so treated as a logic error upstream).
    #[error("rule compilation failed: {0}")]
    RuleCompile(String),

    #[error("invalid domain name: {0}")]
    InvalidDomainName(String),

    #[error("invalid CIDR: {0}")]
    InvalidCidr(String),

    #[error("invalid DNS message: {0}")]
    InvalidDnsMessage(String),
}

impl DomainError {
    /// Whether this error kind should be surfaced to an error collector.
    ///
    /// `false` for conditions that are expected outcomes of handling
    /// untrusted input (validation errors); `true` for conditions that
    /// indicate an unexpected internal failure.
    pub fn reportable(&self) -> bool {
        match self {
            DomainError::BadEcs(_) => false,
            DomainError::DeviceId(_) => true,
            DomainError::UnknownDedicated => false,
            DomainError::Upstream(_) => true,
            DomainError::CacheInternal(_) => true,
            DomainError::GeoIp(_) => false,
            DomainError::RuleCompile(_) => true,
            DomainError::InvalidDomainName(_) => false,
            DomainError::InvalidCidr(_) => false,
            DomainError::InvalidDnsMessage(_) => false,
        }
    }
}
