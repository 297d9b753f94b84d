//! depot storage engine and HTTP API server.
//!
//! This crate provides:
//! - Backend resolution with a version-checked driver cache
//! - The write/dedup pipeline for direct and staged uploads
//! - The job scheduler (enqueue, claim, execute, purge)
//! - Range-aware downloads behind a pluggable download policy
//! - Signed retrieval references
//! - The axum HTTP surface

pub mod auth;
pub mod error;
pub mod handlers;
pub mod pipeline;
pub mod policy;
pub mod reader;
pub mod resolver;
pub mod routes;
pub mod scheduler;
pub mod signature;
pub mod state;

pub use auth::TraceId;
pub use error::{ApiError, ApiResult};
pub use pipeline::{NewFile, Pipeline};
pub use policy::{DownloadPolicy, Passthrough, PolicyOutput};
pub use resolver::{BackendResolver, ResolveError};
pub use routes::create_router;
pub use scheduler::{ConsumeStats, PurgeStats, Scheduler};
pub use signature::LinkSigner;
pub use state::AppState;
