//! Health endpoint.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// `ok`, or `absent` when no default store is configured.
    pub default_store: &'static str,
}

/// GET /v1/health - Check metadata connectivity and the default store.
/// Intentionally unauthenticated for load balancers.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.metadata.health_check().await?;

    let default_store = match state.resolver.default_store() {
        Some(driver) => {
            driver
                .test_connection()
                .await
                .map_err(|e| ApiError::BackendUnavailable(format!("default store: {e}")))?;
            "ok"
        }
        None => "absent",
    };

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        default_store,
    }))
}
