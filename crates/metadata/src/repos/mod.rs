//! Repository traits for metadata operations.

pub mod files;
pub mod jobs;
pub mod profiles;
pub mod uploads;

pub use files::FileRepo;
pub use jobs::{ENQUEUE_BATCH_LIMIT, JobAction, JobState, SyncJobRepo, expiry_cutoff};
pub use profiles::ProfileRepo;
pub use uploads::UploadJobRepo;
