//! Domain Types
//!
//! Requests, filters and the finished artwork record shared across the pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Minimum number of whitespace-separated words a prompt must contain
pub const MIN_PROMPT_WORDS: usize = 3;

/// Input rejected before any network call is made
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Prompt has fewer than the required number of words
    #[error("Prompt must contain at least {min} words (got {actual})")]
    TooFewWords { min: usize, actual: usize },

    /// Filter category outside the supported set
    #[error("Unknown filter category: {0}")]
    UnknownCategory(String),
}

/// Filter categories, in the order they are rendered into a prompt
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterCategory {
    Medium,
    Style,
    Tone,
    Realism,
}

impl FilterCategory {
    /// All categories in rendering order
    pub const ALL: [Self; 4] = [Self::Medium, Self::Style, Self::Tone, Self::Realism];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Medium => "medium",
            Self::Style => "style",
            Self::Tone => "tone",
            Self::Realism => "realism",
        }
    }

    /// Label used when the category is rendered into a composed prompt
    pub const fn label(self) -> &'static str {
        match self {
            Self::Medium => "Medium",
            Self::Style => "Style",
            Self::Tone => "Tone",
            Self::Realism => "Realism level",
        }
    }
}

impl std::str::FromStr for FilterCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "medium" => Ok(Self::Medium),
            "style" => Ok(Self::Style),
            "tone" => Ok(Self::Tone),
            "realism" => Ok(Self::Realism),
            other => Err(ValidationError::UnknownCategory(other.to_string())),
        }
    }
}

impl std::fmt::Display for FilterCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selected filter values per category
///
/// Values keep their selection order and never contain duplicates.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filters(BTreeMap<FilterCategory, Vec<String>>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a value; selecting it twice is a no-op
    pub fn select(&mut self, category: FilterCategory, value: impl Into<String>) {
        let value = value.into();
        let values = self.0.entry(category).or_default();
        if !values.contains(&value) {
            values.push(value);
        }
    }

    /// Builder-style variant of [`Filters::select`]
    #[must_use]
    pub fn with(mut self, category: FilterCategory, value: impl Into<String>) -> Self {
        self.select(category, value);
        self
    }

    /// Remove a previously selected value
    pub fn deselect(&mut self, category: FilterCategory, value: &str) {
        if let Some(values) = self.0.get_mut(&category) {
            values.retain(|v| v != value);
        }
    }

    /// Values selected for a category (empty if none)
    pub fn values(&self, category: FilterCategory) -> &[String] {
        self.0.get(&category).map_or(&[][..], Vec::as_slice)
    }

    /// Whether any category has at least one value
    pub fn has_any(&self) -> bool {
        self.0.values().any(|v| !v.is_empty())
    }
}

/// A validated generation request
///
/// Only constructible through [`GenerationRequest::new`], so a value of this
/// type always carries a prompt of at least [`MIN_PROMPT_WORDS`] words.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    raw_prompt: String,
    filters: Filters,
}

impl GenerationRequest {
    /// Validate user input and build a request
    pub fn new(raw_prompt: &str, filters: Filters) -> Result<Self, ValidationError> {
        let trimmed = raw_prompt.trim();
        let words = word_count(trimmed);
        if words < MIN_PROMPT_WORDS {
            return Err(ValidationError::TooFewWords {
                min: MIN_PROMPT_WORDS,
                actual: words,
            });
        }

        Ok(Self {
            raw_prompt: trimmed.to_string(),
            filters,
        })
    }

    pub fn raw_prompt(&self) -> &str {
        &self.raw_prompt
    }

    pub const fn filters(&self) -> &Filters {
        &self.filters
    }
}

/// Count whitespace-separated words
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// A generated, persisted artwork ready for review and checkout
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artwork {
    /// Public image URL (durable or provider-hosted)
    pub image_url: String,

    /// The user's original prompt, not the composed one
    pub prompt: String,

    /// Filters applied at generation time
    #[serde(default)]
    pub filters: Filters,

    /// Creation time, epoch milliseconds
    pub timestamp: i64,

    /// Whether `image_url` points at durable storage
    pub is_permanent: bool,
}
