//! Backend profile repository.

use crate::error::MetadataResult;
use crate::models::{Page, SearchParams};
use async_trait::async_trait;
use depot_core::BackendProfile;

/// Repository for backend profile configuration.
#[async_trait]
pub trait ProfileRepo: Send + Sync {
    /// Insert a profile and return its id. `profile.id` is ignored.
    async fn create_profile(&self, profile: &BackendProfile) -> MetadataResult<i64>;

    /// Get a profile scoped to a tenant.
    async fn get_profile(&self, domain_id: i64, id: i64) -> MetadataResult<Option<BackendProfile>>;

    /// Get a profile by id alone. Used by the resolver, which only has the
    /// profile id recorded on a file.
    async fn get_profile_by_id(&self, id: i64) -> MetadataResult<Option<BackendProfile>>;

    /// Replace the mutable fields of an existing profile.
    ///
    /// The stored `updated_at` is taken from `profile` and becomes the new
    /// version stamp. Returns `NotFound` if no such profile exists for the tenant.
    async fn update_profile(&self, profile: &BackendProfile) -> MetadataResult<()>;

    /// Delete a profile and its grants.
    ///
    /// Refused with `Constraint` while any file row still references it,
    /// including soft-deleted files whose bytes are not yet removed.
    async fn delete_profile(&self, domain_id: i64, id: i64) -> MetadataResult<()>;

    /// List a tenant's profiles ordered by priority, then id.
    async fn list_profiles(
        &self,
        domain_id: i64,
        search: &SearchParams,
    ) -> MetadataResult<Page<BackendProfile>>;

    /// List profiles readable by any of `groups`.
    async fn list_profiles_by_groups(
        &self,
        domain_id: i64,
        groups: &[i64],
        search: &SearchParams,
    ) -> MetadataResult<Page<BackendProfile>>;

    /// Set the access bits `subject` holds on a profile, replacing any previous grant.
    async fn grant_profile_access(
        &self,
        domain_id: i64,
        profile_id: i64,
        subject: i64,
        access: i32,
    ) -> MetadataResult<()>;

    /// True if any of `groups` holds all bits of `access` on the profile.
    async fn check_profile_access(
        &self,
        domain_id: i64,
        profile_id: i64,
        groups: &[i64],
        access: i32,
    ) -> MetadataResult<bool>;
}
