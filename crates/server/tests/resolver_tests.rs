//! Backend resolver cache behaviour.

mod common;

use common::{TestMetadata, fixed_now, local_profile, run_metadata_test_both};
use depot_core::{BackendType, PROP_DIRECTORY};
use depot_server::{BackendResolver, ResolveError};
use depot_storage::{BackendDriver, LocalBackend};
use std::sync::Arc;
use time::Duration;

#[tokio::test]
async fn test_same_version_reuses_driver() {
    run_metadata_test_both(|store| async move {
        let dir = tempfile::tempdir().unwrap();
        let profile = local_profile(1, "media", dir.path(), 0);
        let id = store.create_profile(&profile).await.unwrap();
        let resolver = BackendResolver::new(store.clone(), None);

        let first = resolver
            .resolve(Some(id), Some(profile.updated_at))
            .await
            .unwrap();
        let second = resolver
            .resolve(Some(id), Some(profile.updated_at))
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.backend_type(), BackendType::Local);
        assert_eq!(resolver.cached_drivers().len(), 1);
    })
    .await;
}

#[tokio::test]
async fn test_newer_version_rebuilds_driver() {
    run_metadata_test_both(|store| async move {
        let dir = tempfile::tempdir().unwrap();
        let mut profile = local_profile(1, "media", dir.path(), 0);
        profile.id = store.create_profile(&profile).await.unwrap();
        let resolver = BackendResolver::new(store.clone(), None);

        let stale = resolver
            .resolve(Some(profile.id), Some(profile.updated_at))
            .await
            .unwrap();

        let moved = tempfile::tempdir().unwrap();
        profile
            .properties
            .set_str(PROP_DIRECTORY, moved.path().to_string_lossy());
        profile.updated_at = fixed_now() + Duration::minutes(1);
        store.update_profile(&profile).await.unwrap();

        let fresh = resolver
            .resolve(Some(profile.id), Some(profile.updated_at))
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&stale, &fresh));
        assert_eq!(fresh.version(), profile.updated_at);

        // The replacement is what later lookups see.
        let again = resolver
            .resolve(Some(profile.id), Some(profile.updated_at))
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&fresh, &again));
    })
    .await;
}

#[tokio::test]
async fn test_invalidate_drops_cached_driver() {
    let metadata = TestMetadata::new().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let profile = local_profile(1, "media", dir.path(), 0);
    let id = metadata.store.create_profile(&profile).await.unwrap();
    let resolver = BackendResolver::new(metadata.store(), None);

    let first = resolver
        .resolve(Some(id), Some(profile.updated_at))
        .await
        .unwrap();
    resolver.invalidate(id);
    assert!(resolver.cached_drivers().is_empty());

    let rebuilt = resolver
        .resolve(Some(id), Some(profile.updated_at))
        .await
        .unwrap();
    assert!(!Arc::ptr_eq(&first, &rebuilt));
}

#[tokio::test]
async fn test_no_profile_selects_default_store() {
    let metadata = TestMetadata::new().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let default: Arc<dyn BackendDriver> =
        Arc::new(LocalBackend::new("default", dir.path(), "$DOMAIN", fixed_now()));

    let resolver = BackendResolver::new(metadata.store(), Some(default.clone()));
    let resolved = resolver.resolve(None, None).await.unwrap();
    assert!(Arc::ptr_eq(&resolved, &default));
    assert!(resolver.cached_drivers().is_empty());

    let bare = BackendResolver::new(metadata.store(), None);
    assert!(matches!(
        bare.resolve(None, None).await,
        Err(ResolveError::NoDefaultStore)
    ));
}

#[tokio::test]
async fn test_missing_profile_is_reported() {
    let metadata = TestMetadata::new().await.unwrap();
    let resolver = BackendResolver::new(metadata.store(), None);

    assert!(matches!(
        resolver.resolve(Some(999), Some(fixed_now())).await,
        Err(ResolveError::ProfileNotFound(999))
    ));
}

#[tokio::test]
async fn test_profile_without_directory_fails_to_build() {
    let metadata = TestMetadata::new().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let mut profile = local_profile(1, "broken", dir.path(), 0);
    profile.properties = Default::default();
    let id = metadata.store.create_profile(&profile).await.unwrap();
    let resolver = BackendResolver::new(metadata.store(), None);

    assert!(matches!(
        resolver.resolve(Some(id), None).await,
        Err(ResolveError::Storage(_))
    ));
    assert!(resolver.cached_drivers().is_empty());
}
