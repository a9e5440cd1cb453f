//! Hosted inference API adapter (Hugging Face style text2text endpoints).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::error::{ErrorContext, ProviderError};
use super::types::{ParaphraseCandidate, ParaphraseRequest};
use super::{clean_generation, extract_request_id, read_body_limited, ParaphraseProvider};
use crate::prompts::SEQ2SEQ_PREFIX;

pub const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co/models";

/// Hosted paraphrase model reached over HTTP.
#[derive(Debug, Clone)]
pub struct HostedInferenceProvider {
    id: String,
    client: reqwest::Client,
    endpoint: String,
    auth: Option<HeaderValue>,
    prefix: String,
}

#[derive(Debug, Clone)]
pub struct HostedConfig {
    pub id: String,
    pub model: String,
    pub base_url: String,
    /// Bearer credential; `None` makes every call fail with `AuthenticationFailed`.
    pub api_key: Option<String>,
    pub prefix: String,
    pub timeout: Duration,
}

impl HostedConfig {
    pub fn new(id: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            prefix: SEQ2SEQ_PREFIX.to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl HostedInferenceProvider {
    pub fn new(config: HostedConfig) -> Result<Self, ProviderError> {
        let auth = match config.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => {
                let mut value = HeaderValue::from_str(&format!("Bearer {key}")).map_err(|_| {
                    ProviderError::authentication(&config.id, "Invalid API key format")
                })?;
                value.set_sensitive(true);
                Some(value)
            }
            _ => None,
        };

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .gzip(true)
            .build()
            .map_err(|e| {
                ProviderError::transport(&config.id, format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            endpoint: format!(
                "{}/{}",
                config.base_url.trim_end_matches('/'),
                config.model.trim_start_matches('/')
            ),
            id: config.id,
            client,
            auth,
            prefix: config.prefix,
        })
    }

    /// The fixed instruction prefix this provider prepends to raw text.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

// =============================================================================
// API TYPES
// =============================================================================

#[derive(Serialize)]
struct InferenceRequest {
    inputs: String,
    parameters: InferenceParameters,
}

#[derive(Serialize)]
struct InferenceParameters {
    temperature: f32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Generations(Vec<Generation>),
    Error { error: serde_json::Value },
}

#[derive(Deserialize)]
struct Generation {
    generated_text: Option<String>,
}

fn error_message(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(error_message)
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}

// =============================================================================
// PROVIDER IMPL
// =============================================================================

#[async_trait]
impl ParaphraseProvider for HostedInferenceProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn backend(&self) -> &'static str {
        "hosted"
    }

    async fn generate(
        &self,
        req: &ParaphraseRequest,
    ) -> Result<Vec<ParaphraseCandidate>, ProviderError> {
        let Some(auth) = self.auth.clone() else {
            return Err(ProviderError::authentication(&self.id, "API key not set"));
        };

        let body = InferenceRequest {
            inputs: format!("{}{}", self.prefix, req.text()),
            parameters: InferenceParameters {
                temperature: req.options().temperature,
            },
        };

        tracing::debug!(provider = %self.id, endpoint = %self.endpoint, "hosted inference call");

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(reqwest::header::AUTHORIZATION, auth)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_http(&self.id, e))?;

        let status = response.status();
        let request_id = extract_request_id(response.headers());
        let body = read_body_limited(&self.id, response).await?;

        let ctx = ErrorContext::new().with_status(status.as_u16());
        let ctx = match &request_id {
            Some(id) => ctx.with_request_id(id),
            None => ctx,
        };

        if !status.is_success() {
            let message = match serde_json::from_str::<InferenceResponse>(&body) {
                Ok(InferenceResponse::Error { error }) => error_message(&error),
                _ => String::new(),
            };
            return Err(ProviderError::from_status(
                &self.id,
                status.as_u16(),
                message,
                ctx,
            ));
        }

        let parsed: InferenceResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::unexpected_shape(&self.id, format!("Invalid response: {e}"))
                .with_context(ctx.clone())
        })?;

        let generations = match parsed {
            InferenceResponse::Error { error } => {
                return Err(
                    ProviderError::generation(&self.id, error_message(&error)).with_context(ctx)
                );
            }
            InferenceResponse::Generations(g) => g,
        };

        let candidates: Vec<ParaphraseCandidate> = generations
            .into_iter()
            .filter_map(|g| g.generated_text.as_deref().and_then(clean_generation))
            .map(|text| ParaphraseCandidate::new(&self.id, text))
            .collect();

        if candidates.is_empty() {
            return Err(ProviderError::unexpected_shape(
                &self.id,
                "No generated_text in response",
            )
            .with_context(ctx));
        }

        Ok(candidates)
    }
}
