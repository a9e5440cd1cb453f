//! Candidate selection and multi-provider ensembles.
//!
//! 1. **Fan out**: every provider gets the same request concurrently, each
//!    call bounded by a timeout
//! 2. **Join**: wait for every call; failures are recorded, not fatal
//! 3. **Select**: score the pooled candidates and keep the best, earliest
//!    candidate winning ties

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;

use crate::gateway::{
    GenerationOptions, ParaphraseCandidate, ParaphraseProvider, ParaphraseRequest, ProviderError,
    RequestError,
};
use crate::scoring::{HumanScore, Scorer};

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

// =============================================================================
// Types
// =============================================================================

/// The winning candidate and how it was chosen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionResult {
    pub candidate: ParaphraseCandidate,
    pub score: HumanScore,
    /// Identifier of the provider that produced the candidate.
    pub provider: String,
    /// Size of the scored pool.
    pub candidates_considered: usize,
    /// Providers that failed without preventing a selection, in invocation order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ProviderError>,
}

#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),
    #[error("no providers configured")]
    NoProviders,
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("all providers failed: {}", summarize(.errors))]
    AllProvidersFailed { errors: Vec<ProviderError> },
}

impl SelectionError {
    /// Whether the caller sent something unusable (as opposed to a backend failure).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidRequest(_) | Self::UnknownProvider(_))
    }
}

fn summarize(errors: &[ProviderError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// Select
// =============================================================================

/// Score every candidate and return the highest. Ties keep the earliest.
pub fn select<I>(candidates: I, scorer: &Scorer) -> Option<SelectionResult>
where
    I: IntoIterator<Item = ParaphraseCandidate>,
{
    let mut best: Option<(ParaphraseCandidate, HumanScore)> = None;
    let mut considered = 0;

    for candidate in candidates {
        considered += 1;
        let score = scorer.score(&candidate.text);
        let better = match &best {
            Some((_, top)) => score.total > top.total,
            None => true,
        };
        if better {
            best = Some((candidate, score));
        }
    }

    best.map(|(candidate, score)| SelectionResult {
        provider: candidate.provider.clone(),
        candidate,
        score,
        candidates_considered: considered,
        failures: Vec::new(),
    })
}

// =============================================================================
// Ensemble
// =============================================================================

/// A set of providers consulted together for each request.
#[derive(Clone)]
pub struct Ensemble {
    providers: Vec<Arc<dyn ParaphraseProvider>>,
    scorer: Scorer,
    call_timeout: Duration,
}

impl Ensemble {
    /// Providers are invoked, and ties broken, in the given order.
    pub fn new(providers: Vec<Arc<dyn ParaphraseProvider>>) -> Self {
        Self {
            providers,
            scorer: Scorer::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_scorer(mut self, scorer: Scorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub fn provider_ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    /// Restrict to the named providers, in the order given.
    pub fn with_active<S: AsRef<str>>(&self, ids: &[S]) -> Result<Self, SelectionError> {
        let providers = ids
            .iter()
            .map(|id| {
                let id = id.as_ref();
                self.providers
                    .iter()
                    .find(|p| p.id() == id)
                    .cloned()
                    .ok_or_else(|| SelectionError::UnknownProvider(id.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            providers,
            scorer: self.scorer,
            call_timeout: self.call_timeout,
        })
    }

    /// Validate raw input, then run the ensemble. Blank text is rejected
    /// before any provider is contacted.
    pub async fn paraphrase(
        &self,
        text: &str,
        options: GenerationOptions,
    ) -> Result<SelectionResult, SelectionError> {
        let req = ParaphraseRequest::new(text, options)?;
        self.run(&req).await
    }

    pub async fn run(&self, req: &ParaphraseRequest) -> Result<SelectionResult, SelectionError> {
        if self.providers.is_empty() {
            return Err(SelectionError::NoProviders);
        }

        let timeout = self.call_timeout;
        let calls = self.providers.iter().map(|provider| async move {
            match tokio::time::timeout(timeout, provider.generate(req)).await {
                Ok(Ok(candidates)) if candidates.is_empty() => Err(ProviderError::unexpected_shape(
                    provider.id(),
                    "provider returned no candidates",
                )),
                Ok(result) => result,
                Err(_) => Err(ProviderError::timeout(provider.id(), timeout)),
            }
        });
        let results = join_all(calls).await;

        let mut pool = Vec::new();
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(candidates) => pool.extend(candidates),
                Err(err) => {
                    tracing::warn!(
                        provider = %err.provider,
                        code = err.code(),
                        error = %err.message,
                        "provider failed"
                    );
                    failures.push(err);
                }
            }
        }

        let Some(mut selection) = select(pool, &self.scorer) else {
            return Err(SelectionError::AllProvidersFailed { errors: failures });
        };
        selection.failures = failures;

        tracing::info!(
            provider = %selection.provider,
            score = selection.score.total,
            considered = selection.candidates_considered,
            failed = selection.failures.len(),
            "selected paraphrase"
        );

        Ok(selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(provider: &str, text: &str) -> ParaphraseCandidate {
        ParaphraseCandidate::new(provider, text)
    }

    #[test]
    fn select_empty_pool_is_none() {
        assert!(select(Vec::new(), &Scorer::default()).is_none());
    }

    #[test]
    fn select_picks_strictly_highest() {
        let pool = vec![
            cand("a", "word word word word"),
            cand("b", "I'm glad. You're right. However, it's fine."),
            cand("c", "plain text here"),
        ];
        let result = select(pool, &Scorer::default()).unwrap();
        assert_eq!(result.provider, "b");
        assert_eq!(result.score.total, 34);
        assert_eq!(result.candidates_considered, 3);
    }

    #[test]
    fn select_ties_keep_first_seen() {
        let pool = vec![cand("first", "alpha beta"), cand("second", "gamma delta")];
        let result = select(pool, &Scorer::default()).unwrap();
        assert_eq!(result.provider, "first");
        assert_eq!(result.candidate.text, "alpha beta");
    }

    #[test]
    fn all_failed_message_lists_each_provider() {
        let err = SelectionError::AllProvidersFailed {
            errors: vec![
                ProviderError::transport("a", "down"),
                ProviderError::authentication("b", "API key not set"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("a transport_failed: down"));
        assert!(msg.contains("b authentication_failed: API key not set"));
    }
}
