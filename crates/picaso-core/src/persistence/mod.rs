//! Persistence Chain
//!
//! Turns a possibly short-lived generated-image URL into a durable one.
//!
//! ```text
//! ┌──────────────┐  recoverable  ┌──────────────┐  recoverable  ┌──────────────┐
//! │    Direct    │──────────────▶│   Proxied    │──────────────▶│ Pass-through │
//! │   transfer   │     error     │   transfer   │     error     │ (source URL) │
//! └──────────────┘               └──────────────┘               └──────────────┘
//!        │ non-recoverable              │ non-recoverable
//!        ▼                              ▼
//!      abort                          abort
//! ```
//!
//! Strategies are tried in the order they were added. A recoverable failure
//! (network, cross-origin, timeout, undecodable bytes) moves on to the next
//! one; a non-recoverable failure (store unauthorized or out of quota) aborts
//! the chain. When every strategy fails recoverably the chain falls back to
//! the pass-through terminal, so `materialize` only errors on
//! non-recoverable failures.

mod passthrough;
mod transfer;

pub use passthrough::PassThrough;
pub use transfer::{
    object_key, transcode_png, FetchedImage, ImageFetcher, MemoryObjectStore, ObjectStore,
    ObjectWrite, StoredObject, TransferStrategy,
};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::progress::{CheckpointTracker, ProgressObserver, ProgressRange};

/// Default bound on a single strategy attempt
pub const DEFAULT_STRATEGY_TIMEOUT: Duration = Duration::from_secs(30);

/// Persistence failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistError {
    /// Source bytes could not be fetched (network or cross-origin class)
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Bytes could not be decoded or re-encoded
    #[error("Image conversion failed: {0}")]
    Convert(String),

    /// Object store temporarily unavailable
    #[error("Object store unavailable: {0}")]
    StoreUnavailable(String),

    /// Strategy exceeded its time bound
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Object store rejected our credentials
    #[error("Object store unauthorized: {0}")]
    Unauthorized(String),

    /// Object store is out of space or quota
    #[error("Object store quota exceeded: {0}")]
    QuotaExceeded(String),
}

impl PersistError {
    /// Whether a later strategy could plausibly work around this failure
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Unauthorized(_) | Self::QuotaExceeded(_))
    }
}

/// Where a strategy placed the image
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placement {
    pub url: String,
    pub is_permanent: bool,
}

/// Outcome of one strategy try
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum AttemptOutcome {
    Success(String),
    Failure(String),
}

/// Log entry for one strategy try
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceAttempt {
    pub strategy: String,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

/// Result of a chain run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Materialized {
    /// Final image URL
    pub url: String,

    /// True iff a durable-storage strategy produced the URL
    pub is_permanent: bool,

    /// Strategy that produced the URL
    pub strategy: String,

    /// Every try made during this run, in order
    pub attempts: Vec<PersistenceAttempt>,
}

/// A single way of making an image durable
#[async_trait]
pub trait PersistenceStrategy: Send + Sync {
    /// Short identifier used in logs and attempt records
    fn name(&self) -> &str;

    /// Try to place the image, reporting checkpoints as they are reached
    async fn attempt(
        &self,
        source_url: &str,
        progress: &mut CheckpointTracker<'_>,
    ) -> Result<Placement, PersistError>;
}

/// Ordered list of strategies with a guaranteed pass-through terminal
pub struct PersistenceChain {
    strategies: Vec<Arc<dyn PersistenceStrategy>>,
    terminal: PassThrough,
    strategy_timeout: Duration,
}

impl Default for PersistenceChain {
    fn default() -> Self {
        Self::new(DEFAULT_STRATEGY_TIMEOUT)
    }
}

impl PersistenceChain {
    /// Progress range used by [`PersistenceChain::materialize`]
    pub const DEFAULT_RANGE: ProgressRange = ProgressRange::new(25, 100);

    pub fn new(strategy_timeout: Duration) -> Self {
        Self {
            strategies: Vec::new(),
            terminal: PassThrough::default(),
            strategy_timeout,
        }
    }

    /// Append a strategy after the existing ones
    #[must_use]
    pub fn with_strategy<S: PersistenceStrategy + 'static>(mut self, strategy: S) -> Self {
        self.strategies.push(Arc::new(strategy));
        self
    }

    /// Set the pass-through pacing delay
    #[must_use]
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.terminal = PassThrough::new(pacing);
        self
    }

    /// Strategy names in execution order, terminal last
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies
            .iter()
            .map(|s| s.name())
            .chain(std::iter::once(self.terminal.name()))
            .collect()
    }

    /// Materialize using [`PersistenceChain::DEFAULT_RANGE`] for progress
    pub async fn materialize(
        &self,
        source_url: &str,
        observer: &dyn ProgressObserver,
    ) -> Result<Materialized, PersistError> {
        self.materialize_within(source_url, Self::DEFAULT_RANGE, observer)
            .await
    }

    /// Materialize, mapping the four checkpoints onto `range`
    pub async fn materialize_within(
        &self,
        source_url: &str,
        range: ProgressRange,
        observer: &dyn ProgressObserver,
    ) -> Result<Materialized, PersistError> {
        let mut tracker = CheckpointTracker::new(observer, range);
        let mut attempts = Vec::new();

        for strategy in &self.strategies {
            let name = strategy.name().to_string();
            let outcome = tokio::time::timeout(
                self.strategy_timeout,
                strategy.attempt(source_url, &mut tracker),
            )
            .await
            .unwrap_or(Err(PersistError::Timeout(self.strategy_timeout)));

            match outcome {
                Ok(placement) => {
                    tracing::info!(strategy = %name, url = %placement.url, "Image persisted");
                    attempts.push(PersistenceAttempt {
                        strategy: name.clone(),
                        outcome: AttemptOutcome::Success(placement.url.clone()),
                    });
                    tracker.finish();
                    return Ok(Materialized {
                        url: placement.url,
                        is_permanent: placement.is_permanent,
                        strategy: name,
                        attempts,
                    });
                }
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(strategy = %name, error = %e, "Persistence strategy failed, falling back");
                    attempts.push(PersistenceAttempt {
                        strategy: name,
                        outcome: AttemptOutcome::Failure(e.to_string()),
                    });
                }
                Err(e) => {
                    tracing::error!(strategy = %name, error = %e, "Non-recoverable persistence failure");
                    return Err(e);
                }
            }
        }

        let placement = self.terminal.resolve(source_url, &mut tracker).await;
        tracing::warn!(url = %placement.url, "Using provider URL, image may expire");
        attempts.push(PersistenceAttempt {
            strategy: self.terminal.name().to_string(),
            outcome: AttemptOutcome::Success(placement.url.clone()),
        });
        tracker.finish();

        Ok(Materialized {
            url: placement.url,
            is_permanent: placement.is_permanent,
            strategy: self.terminal.name().to_string(),
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::testing::{sample_png, Recorder, RejectingStore, ScriptedFetcher};

    const SOURCE: &str = "https://gen.example/abc.png";

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(1_700_000_000_000))
    }

    fn cors_error() -> PersistError {
        PersistError::Fetch("blocked by cross-origin policy".into())
    }

    #[tokio::test]
    async fn test_direct_transfer() {
        let store = Arc::new(MemoryObjectStore::new("https://store.example"));
        let chain = PersistenceChain::default()
            .with_pacing(Duration::ZERO)
            .with_strategy(TransferStrategy::direct(
                Arc::new(ScriptedFetcher::ok(sample_png())),
                store.clone(),
                clock(),
            ));

        let recorder = Recorder::default();
        let result = chain.materialize(SOURCE, &recorder).await.unwrap();

        assert!(result.is_permanent);
        assert_eq!(result.strategy, "direct");
        assert!(result.url.starts_with("https://store.example/images/1700000000000-"));
        assert!(result.url.ends_with(".png"));
        assert_eq!(store.len(), 1);
        assert_eq!(recorder.percentages(), vec![25, 50, 75, 100]);
    }

    #[tokio::test]
    async fn test_falls_back_to_proxy_on_cors_error() {
        let store = Arc::new(MemoryObjectStore::new("https://store.example"));
        let chain = PersistenceChain::default()
            .with_pacing(Duration::ZERO)
            .with_strategy(TransferStrategy::direct(
                Arc::new(ScriptedFetcher::err(cors_error())),
                store.clone(),
                clock(),
            ))
            .with_strategy(TransferStrategy::proxied(
                Arc::new(ScriptedFetcher::ok(sample_png())),
                store.clone(),
                clock(),
            ));

        let recorder = Recorder::default();
        let result = chain.materialize(SOURCE, &recorder).await.unwrap();

        assert!(result.is_permanent);
        assert_ne!(result.url, SOURCE);
        assert_eq!(result.strategy, "proxied");
        assert_eq!(result.attempts.len(), 2);
        assert!(matches!(result.attempts[0].outcome, AttemptOutcome::Failure(_)));
        assert_eq!(recorder.percentages().len(), 4);
        assert!(recorder.is_non_decreasing());
    }

    #[tokio::test]
    async fn test_all_strategies_fail_passes_through() {
        let store = Arc::new(MemoryObjectStore::new("https://store.example"));
        let chain = PersistenceChain::default()
            .with_pacing(Duration::ZERO)
            .with_strategy(TransferStrategy::direct(
                Arc::new(ScriptedFetcher::err(cors_error())),
                store.clone(),
                clock(),
            ))
            .with_strategy(TransferStrategy::proxied(
                Arc::new(ScriptedFetcher::err(cors_error())),
                store.clone(),
                clock(),
            ));

        let recorder = Recorder::default();
        let result = chain.materialize(SOURCE, &recorder).await.unwrap();

        assert!(!result.is_permanent);
        assert_eq!(result.url, SOURCE);
        assert_eq!(result.strategy, "pass-through");
        assert_eq!(result.attempts.len(), 3);
        assert!(store.is_empty());
        assert_eq!(recorder.percentages(), vec![25, 50, 75, 100]);
    }

    #[tokio::test]
    async fn test_non_recoverable_error_aborts_chain() {
        let proxy = Arc::new(ScriptedFetcher::ok(sample_png()));
        let chain = PersistenceChain::default()
            .with_pacing(Duration::ZERO)
            .with_strategy(TransferStrategy::direct(
                Arc::new(ScriptedFetcher::ok(sample_png())),
                Arc::new(RejectingStore(PersistError::QuotaExceeded("bucket full".into()))),
                clock(),
            ))
            .with_strategy(TransferStrategy::proxied(
                proxy.clone(),
                Arc::new(MemoryObjectStore::new("https://store.example")),
                clock(),
            ));

        let err = chain.materialize(SOURCE, &Recorder::default()).await.unwrap_err();

        assert!(!err.is_recoverable());
        assert!(matches!(err, PersistError::QuotaExceeded(_)));
        assert_eq!(proxy.calls(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_bytes_fall_back() {
        let chain = PersistenceChain::default()
            .with_pacing(Duration::ZERO)
            .with_strategy(TransferStrategy::direct(
                Arc::new(ScriptedFetcher::ok(b"<html>denied</html>".to_vec())),
                Arc::new(MemoryObjectStore::new("https://store.example")),
                clock(),
            ));

        let result = chain.materialize(SOURCE, &Recorder::default()).await.unwrap();
        assert!(!result.is_permanent);
        match &result.attempts[0].outcome {
            AttemptOutcome::Failure(reason) => assert!(reason.starts_with("Image conversion failed")),
            AttemptOutcome::Success(url) => panic!("unexpected success: {url}"),
        }
    }

    #[tokio::test]
    async fn test_slow_strategy_times_out() {
        let chain = PersistenceChain::new(Duration::from_millis(20))
            .with_pacing(Duration::ZERO)
            .with_strategy(TransferStrategy::direct(
                Arc::new(ScriptedFetcher::ok(sample_png()).with_delay(Duration::from_secs(5))),
                Arc::new(MemoryObjectStore::new("https://store.example")),
                clock(),
            ));

        let result = chain.materialize(SOURCE, &Recorder::default()).await.unwrap();
        assert_eq!(result.url, SOURCE);
        assert_eq!(
            result.attempts[0].outcome,
            AttemptOutcome::Failure(PersistError::Timeout(Duration::from_millis(20)).to_string())
        );
    }

    #[test]
    fn test_strategy_names() {
        let store = Arc::new(MemoryObjectStore::new("https://store.example"));
        let chain = PersistenceChain::default()
            .with_strategy(TransferStrategy::direct(
                Arc::new(ScriptedFetcher::ok(Vec::new())),
                store.clone(),
                clock(),
            ))
            .with_strategy(TransferStrategy::proxied(
                Arc::new(ScriptedFetcher::ok(Vec::new())),
                store,
                clock(),
            ));
        assert_eq!(chain.strategy_names(), vec!["direct", "proxied", "pass-through"]);
    }
}
