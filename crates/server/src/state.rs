//! Application state shared across handlers.

use crate::pipeline::{Pipeline, STAGING_PATTERN};
use crate::policy::{DownloadPolicy, Passthrough};
use crate::resolver::BackendResolver;
use crate::scheduler::Scheduler;
use crate::signature::LinkSigner;
use depot_core::config::AppConfig;
use depot_metadata::MetadataStore;
use depot_storage::{BackendDriver, LocalBackend};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Driver cache keyed by profile id.
    pub resolver: Arc<BackendResolver>,
    pub pipeline: Arc<Pipeline>,
    pub scheduler: Arc<Scheduler>,
    /// Transform applied to every download stream.
    pub policy: Arc<dyn DownloadPolicy>,
    pub signer: Arc<LinkSigner>,
}

impl AppState {
    /// Wire up the services around an opened metadata store and default store.
    pub fn new(
        config: AppConfig,
        metadata: Arc<dyn MetadataStore>,
        default_store: Option<Arc<dyn BackendDriver>>,
    ) -> Self {
        let instance = instance_id(&config);
        let staging = Arc::new(LocalBackend::new(
            "staging",
            &config.staging.directory,
            STAGING_PATTERN,
            OffsetDateTime::now_utc(),
        ));

        let resolver = Arc::new(BackendResolver::new(metadata.clone(), default_store));
        let pipeline = Arc::new(Pipeline::new(
            metadata.clone(),
            resolver.clone(),
            staging,
            config.server.max_upload_size,
            instance,
        ));
        let default_expire_day = config
            .default_store
            .as_ref()
            .map_or(0, |store| store.expire_day());
        let scheduler = Arc::new(Scheduler::new(
            metadata.clone(),
            resolver.clone(),
            pipeline.clone(),
            config.scheduler.clone(),
            default_expire_day,
        ));
        let signer = Arc::new(LinkSigner::new(
            config.signing.secret.as_bytes(),
            Duration::from_secs(config.signing.link_ttl_secs),
        ));

        Self {
            config: Arc::new(config),
            metadata,
            resolver,
            pipeline,
            scheduler,
            policy: Arc::new(Passthrough),
            signer,
        }
    }

    /// Replace the download policy.
    pub fn with_policy(mut self, policy: Arc<dyn DownloadPolicy>) -> Self {
        self.policy = policy;
        self
    }
}

/// Identifier written on rows created by this process: configured value,
/// else the host name, else a random id.
fn instance_id(config: &AppConfig) -> String {
    config
        .server
        .instance_id
        .clone()
        .filter(|id| !id.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok().filter(|h| !h.is_empty()))
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_instance_id_wins() {
        let mut config = AppConfig::for_testing();
        config.server.instance_id = Some("node-a".to_string());
        assert_eq!(instance_id(&config), "node-a");
    }

    #[test]
    fn empty_instance_id_falls_back() {
        let mut config = AppConfig::for_testing();
        config.server.instance_id = Some(String::new());
        assert!(!instance_id(&config).is_empty());
    }
}
