//! Route configuration.

use crate::auth::{admin_middleware, trace_middleware};
use crate::handlers;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // Upload bodies are capped per file by the write pipeline.
    let upload_routes = Router::new()
        .route(
            "/v1/domains/{domain}/files",
            post(handlers::upload_files)
                .get(handlers::list_files)
                .delete(handlers::delete_files),
        )
        .route(
            "/v1/domains/{domain}/upload-jobs",
            post(handlers::create_upload_jobs),
        )
        .layer(DefaultBodyLimit::disable());

    let api_routes = Router::new()
        // Health check (unauthenticated for load balancers)
        .route("/v1/health", get(handlers::health_check))
        // Downloads
        .route(
            "/v1/domains/{domain}/files/{id}/stream",
            get(handlers::stream_file),
        )
        .route(
            "/v1/domains/{domain}/files/{id}/download",
            get(handlers::download_file),
        )
        .route(
            "/v1/domains/{domain}/files/by-uuid/{uuid}/stream",
            get(handlers::stream_file_by_uuid),
        )
        .route(
            "/v1/domains/{domain}/upload-jobs/{id}",
            get(handlers::get_upload_job),
        )
        .route(
            "/v1/shared/{domain}/{id}",
            get(handlers::shared_download),
        )
        // Profiles
        .route(
            "/v1/domains/{domain}/profiles",
            post(handlers::create_profile).get(handlers::list_profiles),
        )
        .route(
            "/v1/domains/{domain}/profiles/by-groups",
            get(handlers::list_profiles_by_groups),
        )
        .route(
            "/v1/domains/{domain}/profiles/{id}",
            get(handlers::get_profile)
                .put(handlers::update_profile)
                .patch(handlers::patch_profile)
                .delete(handlers::delete_profile),
        )
        .route(
            "/v1/domains/{domain}/profiles/{id}/grants",
            post(handlers::grant_profile_access),
        )
        .route(
            "/v1/domains/{domain}/profiles/{id}/access",
            get(handlers::check_profile_access),
        )
        .layer(DefaultBodyLimit::max(state.config.server.body_limit));

    let admin_routes = Router::new()
        .route("/v1/admin/jobs/fetch", post(handlers::fetch_jobs))
        .route(
            "/v1/admin/jobs/enqueue-removals",
            post(handlers::enqueue_removals),
        )
        .route("/v1/admin/jobs/purge-errors", post(handlers::purge_errors))
        .route("/v1/admin/jobs/run", post(handlers::run_jobs))
        .route(
            "/v1/admin/jobs/{id}",
            get(handlers::get_job).delete(handlers::delete_job),
        )
        .route("/v1/admin/files/{id}/job", get(handlers::get_job_for_file))
        .route("/v1/admin/uploads/run", post(handlers::run_uploads))
        .route("/v1/admin/backends", get(handlers::list_backends))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_middleware,
        ));

    Router::new()
        .merge(upload_routes)
        .merge(api_routes)
        .merge(admin_routes)
        .layer(middleware::from_fn(trace_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
