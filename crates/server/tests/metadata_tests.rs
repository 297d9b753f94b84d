//! Integration tests for MetadataStore implementations.

mod common;

use common::{file_row, fixed_now, local_profile, run_metadata_test_both};
use depot_metadata::MetadataError;
use depot_metadata::models::{SearchParams, UploadJobRow, access};
use std::path::Path;
use time::Duration;

const DOMAIN: i64 = 1;

#[tokio::test]
async fn test_profile_crud() {
    run_metadata_test_both(|store| async move {
        let mut profile = local_profile(DOMAIN, "media", Path::new("/srv/media"), 0);
        profile.id = store.create_profile(&profile).await.unwrap();

        let loaded = store.get_profile(DOMAIN, profile.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "media");
        assert_eq!(loaded.updated_at, profile.updated_at);
        assert_eq!(loaded.properties, profile.properties);
        assert!(store.get_profile(DOMAIN + 1, profile.id).await.unwrap().is_none());
        assert!(store.get_profile_by_id(profile.id).await.unwrap().is_some());

        let mut updated = loaded.clone();
        updated.expire_day = 7;
        updated.updated_at = fixed_now() + Duration::minutes(5);
        store.update_profile(&updated).await.unwrap();
        let reloaded = store.get_profile_by_id(profile.id).await.unwrap().unwrap();
        assert_eq!(reloaded.expire_day, 7);
        assert_eq!(reloaded.updated_at, updated.updated_at);

        let duplicate = local_profile(DOMAIN, "media", Path::new("/srv/other"), 0);
        assert!(matches!(
            store.create_profile(&duplicate).await,
            Err(MetadataError::AlreadyExists(_))
        ));

        store.delete_profile(DOMAIN, profile.id).await.unwrap();
        assert!(store.get_profile_by_id(profile.id).await.unwrap().is_none());
        assert!(matches!(
            store.delete_profile(DOMAIN, profile.id).await,
            Err(MetadataError::NotFound(_))
        ));
    })
    .await;
}

#[tokio::test]
async fn test_profile_listing_pages_and_filters() {
    run_metadata_test_both(|store| async move {
        for (i, name) in ["alpha", "beta", "gamma"].iter().enumerate() {
            let mut profile = local_profile(DOMAIN, name, Path::new("/srv"), 0);
            profile.priority = 3 - i as i32;
            store.create_profile(&profile).await.unwrap();
        }
        store
            .create_profile(&local_profile(DOMAIN + 1, "alpha", Path::new("/srv"), 0))
            .await
            .unwrap();

        let first = store
            .list_profiles(DOMAIN, &SearchParams::new(1, 2))
            .await
            .unwrap();
        let names: Vec<_> = first.items.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["gamma", "beta"]);
        assert!(first.next);

        let second = store
            .list_profiles(DOMAIN, &SearchParams::new(2, 2))
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert!(!second.next);

        let filtered = store
            .list_profiles(DOMAIN, &SearchParams::default().with_query("mm"))
            .await
            .unwrap();
        assert_eq!(filtered.items.len(), 1);
        assert_eq!(filtered.items[0].name, "gamma");
    })
    .await;
}

#[tokio::test]
async fn test_delete_profile_refused_while_files_reference_it() {
    run_metadata_test_both(|store| async move {
        let profile = local_profile(DOMAIN, "media", Path::new("/srv"), 0);
        let profile_id = store.create_profile(&profile).await.unwrap();

        let file_id = store
            .create_file(&file_row(DOMAIN, Some(profile_id), fixed_now(), Duration::ZERO))
            .await
            .unwrap();
        assert!(matches!(
            store.delete_profile(DOMAIN, profile_id).await,
            Err(MetadataError::Constraint(_))
        ));

        // Soft-deleted files still need the profile to remove their bytes.
        store
            .mark_removed(DOMAIN, &[file_id], fixed_now())
            .await
            .unwrap();
        assert!(matches!(
            store.delete_profile(DOMAIN, profile_id).await,
            Err(MetadataError::Constraint(_))
        ));
    })
    .await;
}

#[tokio::test]
async fn test_profile_grants() {
    run_metadata_test_both(|store| async move {
        let shared = store
            .create_profile(&local_profile(DOMAIN, "shared", Path::new("/srv"), 0))
            .await
            .unwrap();
        let private = store
            .create_profile(&local_profile(DOMAIN, "private", Path::new("/srv"), 0))
            .await
            .unwrap();

        store
            .grant_profile_access(DOMAIN, shared, 10, access::READ)
            .await
            .unwrap();
        store
            .grant_profile_access(DOMAIN, private, 20, access::WRITE)
            .await
            .unwrap();

        let visible = store
            .list_profiles_by_groups(DOMAIN, &[10, 20], &SearchParams::default())
            .await
            .unwrap();
        let ids: Vec<_> = visible.items.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![shared]);

        assert!(store
            .check_profile_access(DOMAIN, shared, &[10], access::READ)
            .await
            .unwrap());
        assert!(!store
            .check_profile_access(DOMAIN, shared, &[10], access::WRITE)
            .await
            .unwrap());
        assert!(!store
            .check_profile_access(DOMAIN, shared, &[], access::READ)
            .await
            .unwrap());

        // Granting again replaces the bits.
        store
            .grant_profile_access(DOMAIN, shared, 10, access::ALL)
            .await
            .unwrap();
        assert!(store
            .check_profile_access(DOMAIN, shared, &[10], access::DELETE)
            .await
            .unwrap());

        assert!(matches!(
            store.grant_profile_access(DOMAIN + 1, shared, 10, access::READ).await,
            Err(MetadataError::NotFound(_))
        ));
    })
    .await;
}

#[tokio::test]
async fn test_file_lookup_carries_profile_version() {
    run_metadata_test_both(|store| async move {
        let profile = local_profile(DOMAIN, "media", Path::new("/srv"), 0);
        let profile_id = store.create_profile(&profile).await.unwrap();

        let row = file_row(DOMAIN, Some(profile_id), fixed_now(), Duration::ZERO);
        let file_id = store.create_file(&row).await.unwrap();

        let found = store
            .get_file_with_profile(DOMAIN, file_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.file.name, row.name);
        assert_eq!(found.profile_updated_at, Some(profile.updated_at));

        let by_uuid = store
            .get_file_by_uuid_with_profile(DOMAIN, &row.uuid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_uuid.file.id, file_id);

        assert!(store
            .get_file_with_profile(DOMAIN + 1, file_id)
            .await
            .unwrap()
            .is_none());

        let default_file = store
            .create_file(&file_row(DOMAIN, None, fixed_now(), Duration::ZERO))
            .await
            .unwrap();
        let found = store
            .get_file_with_profile(DOMAIN, default_file)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.profile_updated_at, None);
    })
    .await;
}

#[tokio::test]
async fn test_mark_removed_hides_files() {
    run_metadata_test_both(|store| async move {
        let a = store
            .create_file(&file_row(DOMAIN, None, fixed_now(), Duration::ZERO))
            .await
            .unwrap();
        let b = store
            .create_file(&file_row(DOMAIN, None, fixed_now(), Duration::ZERO))
            .await
            .unwrap();
        let other = store
            .create_file(&file_row(DOMAIN + 1, None, fixed_now(), Duration::ZERO))
            .await
            .unwrap();

        // Ids from another domain are ignored.
        let removed = store
            .mark_removed(DOMAIN, &[a, other], fixed_now())
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(
            store.mark_removed(DOMAIN, &[a], fixed_now()).await.unwrap(),
            0
        );

        assert!(store.get_file_with_profile(DOMAIN, a).await.unwrap().is_none());
        assert!(store.get_file(a).await.unwrap().unwrap().removed);

        let listed = store
            .list_files(DOMAIN, &SearchParams::default())
            .await
            .unwrap();
        let ids: Vec<_> = listed.items.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![b]);
    })
    .await;
}

#[tokio::test]
async fn test_upload_job_lifecycle() {
    run_metadata_test_both(|store| async move {
        let now = fixed_now();
        let job = UploadJobRow {
            id: 0,
            domain_id: DOMAIN,
            uuid: "upload-1".to_string(),
            name: "abc_report.pdf".to_string(),
            view_name: "report.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            size: 42,
            properties: r#"{"directory":"1"}"#.to_string(),
            profile_id: None,
            instance: "test".to_string(),
            state: "pending".to_string(),
            error: None,
            created_at: now,
            updated_at: now,
        };
        let first = store.create_upload_job(&job).await.unwrap();
        let second = store.create_upload_job(&job).await.unwrap();

        let claimed = store.fetch_upload_jobs(1, now).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, first);
        assert_eq!(claimed[0].state, "processing");

        let mut file = file_row(DOMAIN, None, now, Duration::ZERO);
        file.uuid = job.uuid.clone();
        let file_id = store.complete_upload_job(first, &file).await.unwrap();
        assert!(store.get_upload_job(first).await.unwrap().is_none());
        assert_eq!(store.get_file(file_id).await.unwrap().unwrap().uuid, "upload-1");
        assert!(matches!(
            store.complete_upload_job(first, &file).await,
            Err(MetadataError::NotFound(_))
        ));

        store
            .set_upload_job_error(second, "backend down", now)
            .await
            .unwrap();
        assert!(store
            .remove_upload_errors(now)
            .await
            .unwrap()
            .is_empty());
        let purged = store
            .remove_upload_errors(now + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(purged.len(), 1);
        assert_eq!(purged[0].id, second);
        assert_eq!(purged[0].error.as_deref(), Some("backend down"));
    })
    .await;
}
