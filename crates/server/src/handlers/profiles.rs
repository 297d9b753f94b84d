//! Backend profile management.

use crate::error::{ApiError, ApiResult};
use crate::handlers::files::ListQuery;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use depot_core::{BackendProfile, BackendType, ProfilePatch, Properties};
use depot_metadata::models::{Page, access};
use depot_storage::StorageError;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Body of create and full-replace requests.
#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub max_size_mb: i64,
    #[serde(default)]
    pub expire_day: i32,
    #[serde(rename = "type", default = "default_backend_type")]
    pub backend_type: BackendType,
    #[serde(default)]
    pub properties: Properties,
}

fn default_backend_type() -> BackendType {
    BackendType::Local
}

/// Validate a profile and make sure a driver can be built from it.
fn check_profile(profile: &BackendProfile) -> ApiResult<()> {
    profile.validate()?;
    match depot_storage::new_backend(profile) {
        Ok(_) => Ok(()),
        Err(StorageError::Config(msg)) => Err(ApiError::BadRequest(msg)),
        Err(e) => Err(e.into()),
    }
}

async fn load(state: &AppState, domain_id: i64, profile_id: i64) -> ApiResult<BackendProfile> {
    state
        .metadata
        .get_profile(domain_id, profile_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("profile {profile_id}")))
}

/// POST /v1/domains/{domain}/profiles
pub async fn create_profile(
    State(state): State<AppState>,
    Path(domain_id): Path<i64>,
    Json(request): Json<ProfileRequest>,
) -> ApiResult<(StatusCode, Json<BackendProfile>)> {
    let now = OffsetDateTime::now_utc();
    let mut profile = BackendProfile {
        id: 0,
        domain_id,
        name: request.name,
        description: request.description,
        priority: request.priority,
        disabled: request.disabled,
        max_size_mb: request.max_size_mb,
        expire_day: request.expire_day,
        backend_type: request.backend_type,
        properties: request.properties,
        created_at: now,
        created_by: None,
        updated_at: now,
        updated_by: None,
    };
    check_profile(&profile)?;

    profile.id = state.metadata.create_profile(&profile).await?;
    tracing::info!(domain_id, profile_id = profile.id, name = %profile.name, "profile created");

    let stored = load(&state, domain_id, profile.id).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// GET /v1/domains/{domain}/profiles
pub async fn list_profiles(
    State(state): State<AppState>,
    Path(domain_id): Path<i64>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Page<BackendProfile>>> {
    let page = state
        .metadata
        .list_profiles(domain_id, &query.search_params())
        .await?;
    Ok(Json(page))
}

/// GET /v1/domains/{domain}/profiles/{id}
pub async fn get_profile(
    State(state): State<AppState>,
    Path((domain_id, profile_id)): Path<(i64, i64)>,
) -> ApiResult<Json<BackendProfile>> {
    Ok(Json(load(&state, domain_id, profile_id).await?))
}

/// PUT /v1/domains/{domain}/profiles/{id} - Replace all mutable fields.
///
/// The backend type cannot change once a profile exists.
pub async fn update_profile(
    State(state): State<AppState>,
    Path((domain_id, profile_id)): Path<(i64, i64)>,
    Json(request): Json<ProfileRequest>,
) -> ApiResult<Json<BackendProfile>> {
    let mut profile = load(&state, domain_id, profile_id).await?;
    if request.backend_type != profile.backend_type {
        return Err(ApiError::BadRequest(
            "backend type cannot be changed".to_string(),
        ));
    }
    profile.name = request.name;
    profile.description = request.description;
    profile.priority = request.priority;
    profile.disabled = request.disabled;
    profile.max_size_mb = request.max_size_mb;
    profile.expire_day = request.expire_day;
    profile.properties = request.properties;

    save(&state, profile).await.map(Json)
}

/// PATCH /v1/domains/{domain}/profiles/{id} - Update the supplied fields.
pub async fn patch_profile(
    State(state): State<AppState>,
    Path((domain_id, profile_id)): Path<(i64, i64)>,
    Json(patch): Json<ProfilePatch>,
) -> ApiResult<Json<BackendProfile>> {
    let mut profile = load(&state, domain_id, profile_id).await?;
    profile.apply_patch(patch);
    save(&state, profile).await.map(Json)
}

/// Persist a modified profile with a fresh version stamp and drop its
/// cached driver.
async fn save(state: &AppState, mut profile: BackendProfile) -> ApiResult<BackendProfile> {
    check_profile(&profile)?;
    profile.updated_at = OffsetDateTime::now_utc();
    state.metadata.update_profile(&profile).await?;
    state.resolver.invalidate(profile.id);
    tracing::info!(
        domain_id = profile.domain_id,
        profile_id = profile.id,
        "profile updated"
    );
    load(state, profile.domain_id, profile.id).await
}

/// DELETE /v1/domains/{domain}/profiles/{id}
///
/// Refused with 409 while any file record still points at the profile.
pub async fn delete_profile(
    State(state): State<AppState>,
    Path((domain_id, profile_id)): Path<(i64, i64)>,
) -> ApiResult<StatusCode> {
    state.metadata.delete_profile(domain_id, profile_id).await?;
    state.resolver.invalidate(profile_id);
    tracing::info!(domain_id, profile_id, "profile deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
pub struct GroupsQuery {
    /// Comma-separated group ids.
    #[serde(default)]
    pub groups: String,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub q: Option<String>,
    /// Access bits to check, for the access endpoint. Defaults to read.
    pub access: Option<i32>,
}

impl GroupsQuery {
    fn group_ids(&self) -> ApiResult<Vec<i64>> {
        self.groups
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<i64>()
                    .map_err(|_| ApiError::BadRequest(format!("invalid group id: {s}")))
            })
            .collect()
    }

    fn list_query(&self) -> ListQuery {
        ListQuery {
            page: self.page,
            per_page: self.per_page,
            q: self.q.clone(),
        }
    }
}

/// GET /v1/domains/{domain}/profiles/by-groups?groups=1,2
///
/// Profiles readable by any of the given groups.
pub async fn list_profiles_by_groups(
    State(state): State<AppState>,
    Path(domain_id): Path<i64>,
    Query(query): Query<GroupsQuery>,
) -> ApiResult<Json<Page<BackendProfile>>> {
    let groups = query.group_ids()?;
    let page = state
        .metadata
        .list_profiles_by_groups(domain_id, &groups, &query.list_query().search_params())
        .await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub subject: i64,
    pub access: i32,
}

fn check_access_bits(bits: i32) -> ApiResult<i32> {
    if bits <= 0 || bits & !access::ALL != 0 {
        return Err(ApiError::BadRequest(format!("invalid access bits: {bits}")));
    }
    Ok(bits)
}

/// POST /v1/domains/{domain}/profiles/{id}/grants - Set a subject's access bits.
pub async fn grant_profile_access(
    State(state): State<AppState>,
    Path((domain_id, profile_id)): Path<(i64, i64)>,
    Json(request): Json<GrantRequest>,
) -> ApiResult<StatusCode> {
    let bits = check_access_bits(request.access)?;
    state
        .metadata
        .grant_profile_access(domain_id, profile_id, request.subject, bits)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub allowed: bool,
}

/// GET /v1/domains/{domain}/profiles/{id}/access?groups=1,2&access=2
pub async fn check_profile_access(
    State(state): State<AppState>,
    Path((domain_id, profile_id)): Path<(i64, i64)>,
    Query(query): Query<GroupsQuery>,
) -> ApiResult<Json<AccessResponse>> {
    let bits = check_access_bits(query.access.unwrap_or(access::READ))?;
    let groups = query.group_ids()?;
    let allowed = state
        .metadata
        .check_profile_access(domain_id, profile_id, &groups, bits)
        .await?;
    Ok(Json(AccessResponse { allowed }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_ids_parse_comma_list() {
        let query = GroupsQuery {
            groups: "1, 2,,3".to_string(),
            ..Default::default()
        };
        assert_eq!(query.group_ids().unwrap(), vec![1, 2, 3]);

        let bad = GroupsQuery {
            groups: "1,x".to_string(),
            ..Default::default()
        };
        assert!(bad.group_ids().is_err());
    }

    #[test]
    fn access_bits_must_be_known() {
        assert_eq!(check_access_bits(access::READ | access::WRITE).unwrap(), 3);
        assert!(check_access_bits(0).is_err());
        assert!(check_access_bits(8).is_err());
    }
}
