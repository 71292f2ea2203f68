//! Device-ID and extended-human-ID validation.
//!
//! Grounded on an established `validators.rs` convention (small free
//! functions returning `Result<(), String>`-style validation), adapted to
//! the hostname-label rules a device-ID candidate must satisfy.

use crate::errors::DomainError;
use std::sync::Arc;

const MAX_DEVICE_ID_LEN: usize = 63;

/// Validate a candidate device-ID against hostname-label rules: ASCII
/// letters, digits, hyphen; bounded length; must not start or end with a
/// hyphen.
pub fn validate_device_id_label(candidate: &str) -> Result<(), DomainError> {
    if candidate.is_empty() {
        return Err(DomainError::DeviceId("empty device-id".to_string()));
    }
    if candidate.len() > MAX_DEVICE_ID_LEN {
        return Err(DomainError::DeviceId(format!(
            "device-id exceeds {MAX_DEVICE_ID_LEN} characters"
        )));
    }
    if candidate.starts_with('-') || candidate.ends_with('-') {
        return Err(DomainError::DeviceId(
            "device-id cannot start or end with a hyphen".to_string(),
        ));
    }
    if !candidate
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-')
    {
        return Err(DomainError::DeviceId(format!(
            "device-id contains invalid characters: {candidate}"
        )));
    }
    Ok(())
}

/// A decoded "extended human ID" token:
/// `<device-type>-<profile-id>-<human-name>[-<suffix>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedHumanId {
    pub device_type: Arc<str>,
    pub profile_id: i64,
    pub human_id: Arc<str>,
}

/// Parse an extended human ID token. The profile-id segment is the first
/// purely-numeric segment; everything before it is the device type,
/// everything after (joined back with `-`) is the human name (optionally
/// followed by a disambiguating suffix, which is kept as part of the name
/// since the source format does not delimit it separately).
pub fn parse_extended_human_id(token: &str) -> Result<ExtendedHumanId, DomainError> {
    let segments: Vec<&str> = token.split('-').collect();
    let profile_idx = segments
        .iter()
        .position(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| {
            DomainError::DeviceId(format!("no profile-id segment in extended human id: {token}"))
        })?;

    if profile_idx == 0 || profile_idx + 1 >= segments.len() {
        return Err(DomainError::DeviceId(format!(
            "malformed extended human id: {token}"
        )));
    }

    let device_type = segments[..profile_idx].join("-");
    let profile_id: i64 = segments[profile_idx].parse().map_err(|_| {
        DomainError::DeviceId(format!("invalid profile-id in extended human id: {token}"))
    })?;
    let human_id = segments[profile_idx + 1..].join("-").to_ascii_lowercase();

    if human_id.is_empty() {
        return Err(DomainError::DeviceId(format!(
            "empty human-id in extended human id: {token}"
        )));
    }

    Ok(ExtendedHumanId {
        device_type: Arc::from(device_type.as_str()),
        profile_id,
        human_id: Arc::from(human_id.as_str()),
    })
}
