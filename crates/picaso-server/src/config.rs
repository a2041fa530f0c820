//! Server Configuration
//!
//! Everything is read from the environment (after `.env` is loaded). Missing
//! optional backends fall back to in-memory ones so the server still starts.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use picaso_core::persistence::{
    MemoryObjectStore, ObjectStore, PersistenceChain, TransferStrategy, DEFAULT_STRATEGY_TIMEOUT,
};
use picaso_core::{
    Clock, KeyValueStore, MemoryKeyValueStore, PipelineConfig, QuotaPolicy, SystemClock,
};
use picaso_payments::{CheckoutConfig, CheckoutRequestBuilder, CheckoutService, StripeClient};
use picaso_runtime::fetch::DEFAULT_RELAY;
use picaso_runtime::{
    generator_from_env, HttpImageFetcher, HttpObjectStore, ImageProvider, JsonFileStore,
    ObjectStoreConfig, RelayFetcher,
};

use crate::state::AppState;

/// Server settings
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub provider: ImageProvider,
    pub quota: QuotaPolicy,
    pub pipeline: PipelineConfig,
    pub strategy_timeout: Duration,
    pub relay_url: String,
    pub object_store: Option<ObjectStoreConfig>,
    pub state_path: Option<PathBuf>,
    pub checkout: CheckoutConfig,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let provider = match std::env::var("PICASO_IMAGE_PROVIDER") {
            Ok(name) => name.parse()?,
            Err(_) => ImageProvider::default(),
        };
        let strategy_timeout = std::env::var("PICASO_STRATEGY_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map_or(DEFAULT_STRATEGY_TIMEOUT, Duration::from_secs);

        Ok(Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into()),
            provider,
            quota: QuotaPolicy::from_env(),
            pipeline: PipelineConfig::from_env(),
            strategy_timeout,
            relay_url: std::env::var("PICASO_RELAY_URL").unwrap_or_else(|_| DEFAULT_RELAY.into()),
            object_store: ObjectStoreConfig::from_env().ok(),
            state_path: std::env::var("PICASO_STATE_PATH").ok().map(PathBuf::from),
            checkout: CheckoutConfig::from_env(),
        })
    }

    /// Wire backends into application state
    pub fn build_state(&self) -> anyhow::Result<AppState> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let generator = match generator_from_env(self.provider) {
            Ok(generator) => {
                let info = generator.info();
                tracing::info!("✓ Image generation via {} ({})", info.provider, info.model);
                Some(generator)
            }
            Err(e) => {
                tracing::warn!("⚠ Image generation not configured - {}", e);
                None
            }
        };

        let (objects, memory_objects): (Arc<dyn ObjectStore>, _) = match &self.object_store {
            Some(config) => {
                tracing::info!("✓ Object store at {}", config.upload_url);
                (Arc::new(HttpObjectStore::new(config.clone())?), None)
            }
            None => {
                tracing::warn!("⚠ PICASO_STORE_UPLOAD_URL not set - images kept in memory");
                let memory = Arc::new(MemoryObjectStore::new(&self.checkout.public_url));
                (memory.clone() as Arc<dyn ObjectStore>, Some(memory))
            }
        };

        let chain = PersistenceChain::new(self.strategy_timeout)
            .with_strategy(TransferStrategy::direct(
                Arc::new(HttpImageFetcher::new(self.strategy_timeout)?),
                objects.clone(),
                clock.clone(),
            ))
            .with_strategy(TransferStrategy::proxied(
                Arc::new(RelayFetcher::new(&self.relay_url, self.strategy_timeout)?),
                objects,
                clock.clone(),
            ));

        let kv: Arc<dyn KeyValueStore> = match &self.state_path {
            Some(path) => Arc::new(
                JsonFileStore::open(path)
                    .with_context(|| format!("opening state file {}", path.display()))?,
            ),
            None => Arc::new(MemoryKeyValueStore::new()),
        };

        let checkout = match StripeClient::from_env() {
            Ok(client) => {
                tracing::info!("✓ Stripe configured");
                let builder = CheckoutRequestBuilder::new(self.checkout.clone(), clock.clone());
                Some(Arc::new(CheckoutService::new(builder, Arc::new(client))))
            }
            Err(e) => {
                tracing::warn!("⚠ Stripe not configured - checkout disabled ({})", e);
                None
            }
        };

        Ok(AppState {
            generator,
            chain: Arc::new(chain),
            kv,
            clock,
            quota_policy: self.quota.clone(),
            pipeline_config: self.pipeline.clone(),
            memory_objects,
            checkout,
        })
    }
}
