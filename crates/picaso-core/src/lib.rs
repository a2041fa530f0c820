//! # picaso-core
//!
//! Generation pipeline for custom AI art prints: prompt composition, usage
//! quota, provider-agnostic image generation and durable image persistence.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                       GenerationPipeline                          │
//! │  ┌─────────────┐  ┌──────────────┐  ┌──────────────────────────┐  │
//! │  │   Prompt    │  │    Quota     │  │     ImageGenerator       │  │
//! │  │  Composer   │──│   Tracker    │──│       (Strategy)         │  │
//! │  └─────────────┘  └──────────────┘  └──────────────────────────┘  │
//! │                                       │                           │
//! │                          ┌────────────▼─────────────┐             │
//! │                          │    PersistenceChain      │             │
//! │                          │ direct → proxied → pass  │             │
//! │                          └──────────────────────────┘             │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Generators, fetchers, object stores and key-value stores are traits, so
//! the pipeline runs unchanged against Replicate, OpenAI or test doubles.

pub mod clock;
pub mod domain;
pub mod error;
pub mod generation;
pub mod persistence;
pub mod pipeline;
pub mod progress;
pub mod prompt;
pub mod quota;
pub mod session;
pub mod store;

#[cfg(test)]
mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::{Artwork, FilterCategory, Filters, GenerationRequest, ValidationError};
pub use error::{PipelineError, Result};
pub use generation::{GenerationError, GeneratorInfo, ImageGenerator};
pub use persistence::{PersistError, PersistenceChain, PersistenceStrategy};
pub use pipeline::{GenerationPipeline, PipelineConfig, PipelineOutcome};
pub use progress::{NoProgress, ProgressObserver};
pub use prompt::PromptComposer;
pub use quota::{QuotaPolicy, QuotaStatus, QuotaTracker};
pub use session::{ArtworkSession, ProfileId};
pub use store::{KeyValueStore, MemoryKeyValueStore, ScopedStore};
