//! HTTP request handlers.

pub mod admin;
pub mod files;
pub mod health;
pub mod profiles;
pub mod shared;
pub mod upload_jobs;

pub use admin::*;
pub use files::*;
pub use health::*;
pub use profiles::*;
pub use shared::*;
pub use upload_jobs::*;
