//! Core types shared by every paraphrase provider.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

// =============================================================================
// REQUEST VALIDATION
// =============================================================================

/// Reasons a request is rejected before any provider is invoked.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RequestError {
    #[error("No text provided")]
    EmptyText,
    #[error("temperature must be within [0, 1], got {0}")]
    TemperatureOutOfRange(f32),
    #[error("candidate count must be at least 1")]
    ZeroCandidates,
    #[error("maximum output length must be greater than 0")]
    ZeroMaxLength,
}

// =============================================================================
// GENERATION OPTIONS
// =============================================================================

/// Free-form style/complexity labels ("casual", "simple", ...).
///
/// Labels are trimmed and lowercased; blank labels are dropped. Iteration
/// order is sorted so rendered prompts are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct StyleHints(BTreeSet<String>);

impl StyleHints {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            labels
                .into_iter()
                .map(|l| l.as_ref().trim().to_lowercase())
                .filter(|l| !l.is_empty())
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.0.contains(&label.trim().to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for StyleHints {
    fn from(labels: Vec<String>) -> Self {
        Self::new(labels)
    }
}

impl From<StyleHints> for Vec<String> {
    fn from(hints: StyleHints) -> Self {
        hints.0.into_iter().collect()
    }
}

/// Sampling parameters passed through to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Sampling temperature (0.0 - 1.0).
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// How many candidates to ask the backend for (beam/return count).
    #[serde(default = "default_candidates")]
    pub candidates: u32,
    /// Maximum output length in tokens.
    #[serde(default = "default_max_length")]
    pub max_length: u32,
    #[serde(default)]
    pub styles: StyleHints,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_candidates() -> u32 {
    1
}

fn default_max_length() -> u32 {
    512
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            candidates: default_candidates(),
            max_length: default_max_length(),
            styles: StyleHints::default(),
        }
    }
}

impl GenerationOptions {
    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn candidates(mut self, n: u32) -> Self {
        self.candidates = n;
        self
    }

    pub fn max_length(mut self, max: u32) -> Self {
        self.max_length = max;
        self
    }

    pub fn styles(mut self, styles: StyleHints) -> Self {
        self.styles = styles;
        self
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(RequestError::TemperatureOutOfRange(self.temperature));
        }
        if self.candidates == 0 {
            return Err(RequestError::ZeroCandidates);
        }
        if self.max_length == 0 {
            return Err(RequestError::ZeroMaxLength);
        }
        Ok(())
    }
}

// =============================================================================
// REQUEST / CANDIDATE
// =============================================================================

/// A validated paraphrase request. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct ParaphraseRequest {
    text: String,
    options: GenerationOptions,
}

impl ParaphraseRequest {
    /// Validate and build. Whitespace-only text is rejected.
    pub fn new(text: impl Into<String>, options: GenerationOptions) -> Result<Self, RequestError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(RequestError::EmptyText);
        }
        options.validate()?;
        Ok(Self { text, options })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }
}

/// One rewrite produced by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParaphraseCandidate {
    /// Generated text.
    pub text: String,
    /// Identifier of the provider that produced it.
    pub provider: String,
    /// Set when generation only partially succeeded (e.g. cut off at the length limit).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_error: Option<String>,
}

impl ParaphraseCandidate {
    pub fn new(provider: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            provider: provider.into(),
            partial_error: None,
        }
    }

    pub fn with_partial_error(mut self, message: impl Into<String>) -> Self {
        self.partial_error = Some(message.into());
        self
    }
}
