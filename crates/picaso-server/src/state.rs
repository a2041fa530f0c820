//! Application State

use std::sync::Arc;

use picaso_core::persistence::{MemoryObjectStore, PersistenceChain};
use picaso_core::{
    ArtworkSession, Clock, GenerationPipeline, ImageGenerator, KeyValueStore, PipelineConfig,
    ProfileId, QuotaPolicy, QuotaTracker, ScopedStore,
};
use picaso_payments::CheckoutService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Image generator (None if not configured)
    pub generator: Option<Arc<dyn ImageGenerator>>,

    /// Persistence chain shared by all runs
    pub chain: Arc<PersistenceChain>,

    /// Backing key-value store, namespaced per profile
    pub kv: Arc<dyn KeyValueStore>,

    pub clock: Arc<dyn Clock>,

    pub quota_policy: QuotaPolicy,

    pub pipeline_config: PipelineConfig,

    /// Set when images are kept in memory and served by this process
    pub memory_objects: Option<Arc<MemoryObjectStore>>,

    /// Checkout service (None if Stripe is not configured)
    pub checkout: Option<Arc<CheckoutService>>,
}

impl AppState {
    fn profile_store(&self, profile: &ProfileId) -> Arc<dyn KeyValueStore> {
        Arc::new(ScopedStore::new(self.kv.clone(), profile.as_str()))
    }

    pub fn quota_tracker(&self, profile: &ProfileId) -> QuotaTracker {
        QuotaTracker::new(
            self.profile_store(profile),
            self.clock.clone(),
            self.quota_policy.clone(),
        )
    }

    pub fn artwork_session(&self, profile: &ProfileId) -> ArtworkSession {
        ArtworkSession::new(self.profile_store(profile))
    }

    /// Pipeline bound to one profile's quota, if a generator is configured
    pub fn pipeline(&self, profile: &ProfileId) -> Option<GenerationPipeline> {
        let generator = self.generator.clone()?;
        Some(
            GenerationPipeline::new(
                self.quota_tracker(profile),
                generator,
                self.chain.clone(),
                self.clock.clone(),
            )
            .with_config(self.pipeline_config.clone()),
        )
    }
}
