//! Prompt Composition
//!
//! Merges the house style template, the user's prompt and any selected
//! filters into the text sent to the image generator.

use crate::domain::{FilterCategory, GenerationRequest};

/// House style prepended to every prompt
pub const BASE_PROMPT: &str = "A highly detailed, gallery-quality artwork, composed with professional artistry. \
Emphasis on striking composition, balanced color harmony, and refined detail. \
The piece should feel premium, visually captivating, and suitable as a framed canvas print. \
Inspired by fine art photography and masterful painting techniques.";

/// Builds composed prompts from validated requests
#[derive(Clone, Debug)]
pub struct PromptComposer {
    base_template: String,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new(BASE_PROMPT)
    }
}

impl PromptComposer {
    pub fn new(base_template: impl Into<String>) -> Self {
        Self {
            base_template: base_template.into(),
        }
    }

    pub fn base_template(&self) -> &str {
        &self.base_template
    }

    /// Compose the generation prompt
    ///
    /// Layout: template, blank line, user prompt, then (if any filter is set)
    /// a blank line and one `Label: v1, v2` line per non-empty category.
    pub fn compose(&self, request: &GenerationRequest) -> String {
        let mut prompt = format!("{}\n\n{}", self.base_template, request.raw_prompt());

        let sections: Vec<String> = FilterCategory::ALL
            .iter()
            .filter_map(|&category| {
                let values = request.filters().values(category);
                (!values.is_empty()).then(|| format!("{}: {}", category.label(), values.join(", ")))
            })
            .collect();

        if !sections.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&sections.join("\n"));
        }

        prompt
    }
}
