//! # picaso-runtime
//!
//! Concrete backends for the picaso pipeline.
//!
//! ## Providers
//!
//! - **Replicate** (default): FLUX Schnell via the predictions API
//! - **OpenAI**: DALL-E 3 image generations
//!
//! ## Storage
//!
//! - [`HttpImageFetcher`] / [`RelayFetcher`]: direct and relayed byte fetches
//! - [`HttpObjectStore`]: `PUT`-based durable object storage
//! - [`JsonFileStore`]: file-backed key-value store for quota and snapshots
//!
//! ## Usage
//!
//! ```rust,ignore
//! use picaso_runtime::{generator_from_env, ImageProvider};
//!
//! let generator = generator_from_env(ImageProvider::Replicate)?;
//! let url = generator.generate(&composed_prompt).await?;
//! ```

pub mod error;
pub mod fetch;
pub mod file_store;
pub mod object_store;
pub mod openai;
pub mod replicate;

use std::sync::Arc;

pub use error::ConfigError;
pub use fetch::{HttpImageFetcher, RelayFetcher};
pub use file_store::JsonFileStore;
pub use object_store::{HttpObjectStore, ObjectStoreConfig};
pub use openai::{OpenAiConfig, OpenAiImageGenerator};
pub use replicate::{ReplicateConfig, ReplicateGenerator};

// Re-export core types for convenience
pub use picaso_core::{GenerationError, ImageGenerator, KeyValueStore, PersistenceChain};

/// Supported image generation backends
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ImageProvider {
    #[default]
    Replicate,
    OpenAi,
}

impl std::str::FromStr for ImageProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replicate" => Ok(Self::Replicate),
            "openai" => Ok(Self::OpenAi),
            other => Err(ConfigError::Invalid {
                var: "PICASO_IMAGE_PROVIDER",
                reason: format!("unknown provider '{other}'"),
            }),
        }
    }
}

/// Build the generator for `provider` from its environment variables
pub fn generator_from_env(provider: ImageProvider) -> Result<Arc<dyn ImageGenerator>, ConfigError> {
    let generator: Arc<dyn ImageGenerator> = match provider {
        ImageProvider::Replicate => Arc::new(ReplicateGenerator::from_env()?),
        ImageProvider::OpenAi => Arc::new(OpenAiImageGenerator::from_env()?),
    };
    Ok(generator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing() {
        assert_eq!("Replicate".parse::<ImageProvider>().unwrap(), ImageProvider::Replicate);
        assert_eq!(" openai ".parse::<ImageProvider>().unwrap(), ImageProvider::OpenAi);
        assert!("midjourney".parse::<ImageProvider>().is_err());
    }
}
