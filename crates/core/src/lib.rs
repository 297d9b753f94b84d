//! Core domain types and shared logic for depot.
//!
//! This crate defines the data model used across all other crates:
//! - Backend profiles, backend types and free-form properties
//! - File metadata handed to storage backends
//! - Storage path templates
//! - HTTP byte-range parsing
//! - Configuration

pub mod config;
pub mod error;
pub mod file;
pub mod pattern;
pub mod profile;
pub mod range;

pub use error::{Error, Result};
pub use file::{FileMeta, storage_name};
pub use profile::{
    BYTES_PER_MB, BackendProfile, BackendType, MAX_EXPIRE_DAY, MAX_SIZE_MB, PROP_DIRECTORY,
    PROP_PATH_PATTERN, ProfilePatch, Properties,
};
pub use range::{ByteRange, parse_range};
