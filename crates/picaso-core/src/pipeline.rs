//! Generation Pipeline
//!
//! Orchestrates one generation request end to end:
//!
//! ```text
//! Idle → Validating → Composing → QuotaCheck → Generating → Persisting → Recording → Done
//!            │                        │            │            │
//!            ▼                        ▼            ▼            ▼
//!         Failed                   Aborted      Failed       Failed
//! ```
//!
//! Quota is consumed only after persistence completes, so a failed run never
//! costs the user an attempt.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::domain::{Artwork, Filters, GenerationRequest};
use crate::error::{PipelineError, Result};
use crate::generation::{GenerationError, ImageGenerator};
use crate::persistence::{PersistenceAttempt, PersistenceChain};
use crate::progress::{ProgressObserver, ProgressPlan};
use crate::prompt::PromptComposer;
use crate::quota::{QuotaStatus, QuotaTracker};

/// Pipeline stages, in execution order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    Validating,
    Composing,
    QuotaCheck,
    Generating,
    Persisting,
    Recording,
    Done,
    Aborted,
    Failed,
}

/// Pipeline tuning
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Upper bound on a single generation call
    pub generation_timeout: Duration,

    /// Percentages reported per stage
    pub progress: ProgressPlan,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            generation_timeout: Duration::from_secs(30),
            progress: ProgressPlan::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from `PICASO_GENERATION_TIMEOUT_SECS`, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let generation_timeout = std::env::var("PICASO_GENERATION_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map_or(defaults.generation_timeout, Duration::from_secs);

        Self {
            generation_timeout,
            ..defaults
        }
    }
}

/// Successful run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub artwork: Artwork,
    pub quota: QuotaStatus,
    pub persistence_attempts: Vec<PersistenceAttempt>,
}

/// End-to-end generation pipeline
pub struct GenerationPipeline {
    composer: PromptComposer,
    quota: QuotaTracker,
    generator: Arc<dyn ImageGenerator>,
    chain: Arc<PersistenceChain>,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
}

impl GenerationPipeline {
    pub fn new(
        quota: QuotaTracker,
        generator: Arc<dyn ImageGenerator>,
        chain: Arc<PersistenceChain>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            composer: PromptComposer::default(),
            quota,
            generator,
            chain,
            clock,
            config: PipelineConfig::default(),
        }
    }

    #[must_use]
    pub fn with_composer(mut self, composer: PromptComposer) -> Self {
        self.composer = composer;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub const fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    /// Validate raw input, then run
    pub async fn submit(
        &self,
        raw_prompt: &str,
        filters: Filters,
        observer: &dyn ProgressObserver,
    ) -> Result<PipelineOutcome> {
        enter(PipelineStage::Validating);
        let request = GenerationRequest::new(raw_prompt, filters).map_err(|e| {
            tracing::debug!(error = %e, "Request rejected");
            enter(PipelineStage::Failed);
            PipelineError::from(e)
        })?;

        self.run(request, observer).await
    }

    /// Run an already validated request
    pub async fn run(
        &self,
        request: GenerationRequest,
        observer: &dyn ProgressObserver,
    ) -> Result<PipelineOutcome> {
        enter(PipelineStage::Composing);
        let prompt = self.composer.compose(&request);

        enter(PipelineStage::QuotaCheck);
        let status = self.quota.check_status();
        if !status.allowed {
            tracing::info!(reset_at = status.reset_at, "Quota exhausted, request aborted");
            enter(PipelineStage::Aborted);
            return Err(PipelineError::QuotaExceeded {
                reset_at: status.reset_at,
            });
        }

        enter(PipelineStage::Generating);
        let plan = self.config.progress;
        observer.on_progress(plan.generating().start, "Generating your artwork...");
        let source_url = match self.generate(&prompt).await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(category = e.category(), error = %e, "Generation failed");
                enter(PipelineStage::Failed);
                return Err(e.into());
            }
        };
        observer.on_progress(plan.generating().end, "Artwork generated");

        enter(PipelineStage::Persisting);
        let materialized = self
            .chain
            .materialize_within(&source_url, plan.persisting(), observer)
            .await
            .map_err(|e| {
                enter(PipelineStage::Failed);
                PipelineError::Persistence(e.to_string())
            })?;

        enter(PipelineStage::Recording);
        let quota = self
            .quota
            .record_attempt(&materialized.url, request.raw_prompt());

        let artwork = Artwork {
            image_url: materialized.url,
            prompt: request.raw_prompt().to_string(),
            filters: request.filters().clone(),
            timestamp: self.clock.now_ms(),
            is_permanent: materialized.is_permanent,
        };

        enter(PipelineStage::Done);
        observer.on_progress(100, "Complete!");
        tracing::info!(
            url = %artwork.image_url,
            permanent = artwork.is_permanent,
            strategy = %materialized.strategy,
            remaining = quota.remaining,
            "Artwork ready"
        );

        Ok(PipelineOutcome {
            artwork,
            quota,
            persistence_attempts: materialized.attempts,
        })
    }

    async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
        let timeout = self.config.generation_timeout;
        tokio::time::timeout(timeout, self.generator.generate(prompt))
            .await
            .unwrap_or_else(|_| {
                Err(GenerationError::TransientNetwork(format!(
                    "generation timed out after {}s",
                    timeout.as_secs()
                )))
            })
    }
}

fn enter(stage: PipelineStage) {
    tracing::debug!(stage = ?stage, "Pipeline stage");
}
