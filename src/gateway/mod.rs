//! Paraphrase providers and the gateway that wraps them.

pub mod chat;
pub mod error;
pub mod hosted;
pub mod local;
pub mod types;
pub mod usage;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;

use usage::{ProviderCallRecord, UsageSink as UsageSinkTrait};

pub use error::{ErrorContext, ProviderError, ProviderErrorKind};
pub use types::*;
pub use usage::{NoopUsageSink, StderrUsageSink, TracingUsageSink, UsageSink};

/// A backend that turns source text into one or more rewritten candidates.
///
/// Implementations must return at least one candidate on success and a
/// structured [`ProviderError`] on every failure.
#[async_trait::async_trait]
pub trait ParaphraseProvider: Send + Sync {
    /// Stable identifier, copied into every candidate and error.
    fn id(&self) -> &str;

    /// Backend family ("hosted", "chat", "local").
    fn backend(&self) -> &'static str;

    async fn generate(
        &self,
        req: &ParaphraseRequest,
    ) -> Result<Vec<ParaphraseCandidate>, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Extra attempts after a retryable failure. Zero means exactly one call.
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

/// Wraps a provider with usage recording and an explicit retry policy.
pub struct ProviderGateway<U: UsageSinkTrait> {
    inner: Arc<dyn ParaphraseProvider>,
    usage_sink: Arc<U>,
    config: GatewayConfig,
}

impl<U: UsageSinkTrait> ProviderGateway<U> {
    pub fn new(inner: Arc<dyn ParaphraseProvider>, usage_sink: Arc<U>) -> Self {
        Self::with_config(inner, usage_sink, GatewayConfig::default())
    }

    pub fn with_config(
        inner: Arc<dyn ParaphraseProvider>,
        usage_sink: Arc<U>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            inner,
            usage_sink,
            config,
        }
    }

    async fn generate_with_policy(
        &self,
        req: &ParaphraseRequest,
    ) -> Result<Vec<ParaphraseCandidate>, ProviderError> {
        let mut attempt = 0;
        loop {
            let start = Instant::now();
            let result = self.inner.generate(req).await;
            let latency_ms = start.elapsed().as_millis() as u64;
            let record = ProviderCallRecord::new(self.inner.id(), self.inner.backend())
                .attempt(attempt + 1)
                .latency(latency_ms);

            match result {
                Ok(candidates) => {
                    self.usage_sink
                        .record(record.candidates(candidates.len()))
                        .await;
                    return Ok(candidates);
                }
                Err(err) => {
                    self.usage_sink
                        .record(record.error(err.code()).request_id(err.request_id()))
                        .await;

                    if !err.is_retryable() || attempt >= self.config.max_retries {
                        return Err(err);
                    }

                    let delay = backoff_delay(self.config.retry_base_delay, attempt);
                    tracing::warn!(
                        provider = self.inner.id(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying provider call"
                    );
                    attempt += 1;
                    sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl<U: UsageSinkTrait> ParaphraseProvider for ProviderGateway<U> {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn backend(&self) -> &'static str {
        self.inner.backend()
    }

    async fn generate(
        &self,
        req: &ParaphraseRequest,
    ) -> Result<Vec<ParaphraseCandidate>, ProviderError> {
        self.generate_with_policy(req).await
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let multiplier = 2u64.pow(attempt.min(5));
    base * multiplier as u32
}

/// Maximum allowed response body length (1MB).
pub(crate) const MAX_RESPONSE_LEN: usize = 1_024 * 1_024;

/// Extract request ID from response headers.
pub(crate) fn extract_request_id(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Stream a response body, failing once it exceeds [`MAX_RESPONSE_LEN`].
pub(crate) async fn read_body_limited(
    provider: &str,
    mut response: reqwest::Response,
) -> Result<String, ProviderError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| ProviderError::from_http(provider, e))?
    {
        let new_len = bytes.len() + chunk.len();
        if new_len > MAX_RESPONSE_LEN {
            return Err(ProviderError::unexpected_shape(
                provider,
                format!("Response too large: {new_len} bytes"),
            ));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&bytes).to_string())
}

/// Trim generated text and drop blank generations.
pub(crate) fn clean_generation(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_saturates() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 9), Duration::from_millis(3200));
    }

    #[test]
    fn clean_generation_trims_and_rejects_blank() {
        assert_eq!(clean_generation("  hi \n").as_deref(), Some("hi"));
        assert_eq!(clean_generation(" \n "), None);
    }
}
