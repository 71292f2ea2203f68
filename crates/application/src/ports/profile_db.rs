//! Port for the profile database collaborator.
//!
//! "Not found" is not an error: it is `Ok(None)`. Only genuine I/O/
//! infrastructure failures surface as `Err(DomainError)`. Mirrors the
//! teacher's `GroupRepositoryPort`/`ClientRepositoryPort` split between
//! fallible I/O and "absent" results.

use async_trait::async_trait;
use ferrous_dns_domain::{Device, DomainError, Profile, ProfileId};
use std::net::IpAddr;
use std::sync::Arc;

#[async_trait]
pub trait ProfileDbPort: Send + Sync {
    /// Resolve a profile and device from a raw device-ID string.
    async fn profile_by_device_id(
        &self,
        device_id: &str,
    ) -> Result<Option<(Arc<Profile>, Arc<Device>)>, DomainError>;

    /// Resolve a profile from a server-local dedicated address. No device is
    /// returned: dedicated-IP assignment identifies a profile, not a device.
    async fn profile_by_dedicated_ip(&self, ip: IpAddr)
        -> Result<Option<Arc<Profile>>, DomainError>;

    /// Resolve a profile and device from the client's remote (linked) IP.
    async fn profile_by_linked_ip(
        &self,
        ip: IpAddr,
    ) -> Result<Option<(Arc<Profile>, Arc<Device>)>, DomainError>;

    /// Resolve a profile, and its device if already registered, from an
    /// extended human ID's `(profileID, normalizedHumanID)` pair.
    async fn profile_by_human_id(
        &self,
        profile_id: ProfileId,
        normalized_human_id: &str,
    ) -> Result<Option<(Arc<Profile>, Option<Arc<Device>>)>, DomainError>;

    /// Auto-create a device of `device_type` under `profile_id` named
    /// `normalized_human_id`. Called when an extended human ID resolves to a
    /// known profile but no matching device yet exists.
    async fn create_auto_device(
        &self,
        profile_id: ProfileId,
        normalized_human_id: &str,
        device_type: &str,
    ) -> Result<(Arc<Profile>, Arc<Device>), DomainError>;
}

