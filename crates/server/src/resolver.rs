//! Backend resolution and driver caching.
//!
//! Drivers are cached per profile id and carry the profile version stamp
//! they were built from. A lookup with a different stamp rebuilds the
//! driver from the current profile row and replaces the cache entry.
//!
//! The cache is local to this process. Nothing here coordinates with other
//! processes; job ownership is decided by the metadata store alone.

use dashmap::DashMap;
use depot_core::BackendProfile;
use depot_metadata::{MetadataError, MetadataStore};
use depot_storage::{BackendDriver, StorageError};
use std::sync::Arc;
use time::OffsetDateTime;

/// Failure to produce a driver.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no default store configured")]
    NoDefaultStore,

    #[error("backend profile {0} not found")]
    ProfileNotFound(i64),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Read-through cache of backend drivers keyed by profile id.
pub struct BackendResolver {
    metadata: Arc<dyn MetadataStore>,
    default_store: Option<Arc<dyn BackendDriver>>,
    cache: DashMap<i64, Arc<dyn BackendDriver>>,
}

impl BackendResolver {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        default_store: Option<Arc<dyn BackendDriver>>,
    ) -> Self {
        Self {
            metadata,
            default_store,
            cache: DashMap::new(),
        }
    }

    /// The process-wide default store, if configured.
    pub fn default_store(&self) -> Option<&Arc<dyn BackendDriver>> {
        self.default_store.as_ref()
    }

    /// Resolve the driver for a file.
    ///
    /// `profile_id = None` selects the default store. Otherwise a cached
    /// driver is returned only if its version equals `version`; any other
    /// case loads the profile and rebuilds.
    pub async fn resolve(
        &self,
        profile_id: Option<i64>,
        version: Option<OffsetDateTime>,
    ) -> Result<Arc<dyn BackendDriver>, ResolveError> {
        let Some(profile_id) = profile_id else {
            return self.default_store.clone().ok_or(ResolveError::NoDefaultStore);
        };

        if let Some(version) = version
            && let Some(driver) = self.cached(profile_id, version)
        {
            return Ok(driver);
        }

        let profile = self
            .metadata
            .get_profile_by_id(profile_id)
            .await?
            .ok_or(ResolveError::ProfileNotFound(profile_id))?;
        self.install(&profile)
    }

    /// Resolve the driver for an already loaded profile.
    pub fn resolve_profile(
        &self,
        profile: &BackendProfile,
    ) -> Result<Arc<dyn BackendDriver>, ResolveError> {
        match self.cached(profile.id, profile.updated_at) {
            Some(driver) => Ok(driver),
            None => self.install(profile),
        }
    }

    /// Drop the cached driver for a profile.
    pub fn invalidate(&self, profile_id: i64) {
        self.cache.remove(&profile_id);
    }

    /// Snapshot of cached drivers.
    pub fn cached_drivers(&self) -> Vec<(i64, Arc<dyn BackendDriver>)> {
        self.cache
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    fn cached(&self, profile_id: i64, version: OffsetDateTime) -> Option<Arc<dyn BackendDriver>> {
        self.cache
            .get(&profile_id)
            .filter(|driver| driver.version() == version)
            .map(|driver| driver.value().clone())
    }

    /// Build a driver, then publish it. Readers never see a partial driver.
    fn install(&self, profile: &BackendProfile) -> Result<Arc<dyn BackendDriver>, ResolveError> {
        let driver = depot_storage::new_backend(profile)?;
        tracing::debug!(
            profile_id = profile.id,
            domain_id = profile.domain_id,
            version = %profile.updated_at,
            "backend driver built"
        );
        self.cache.insert(profile.id, driver.clone());
        Ok(driver)
    }
}
