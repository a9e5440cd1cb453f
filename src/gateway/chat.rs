//! Chat-completion adapters for commercial APIs.
//!
//! Two wire dialects are supported: the OpenAI-compatible
//! `/chat/completions` shape (OpenAI, OpenRouter, DeepInfra, local servers)
//! and the Anthropic `/messages` shape.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::error::{ErrorContext, ProviderError};
use super::types::{ParaphraseCandidate, ParaphraseRequest};
use super::{clean_generation, extract_request_id, read_body_limited, ParaphraseProvider};
use crate::prompts::{PromptInstance, PromptTemplate, DEFAULT_PROMPT};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Maximum allowed input characters (~125k tokens).
const MAX_INPUT_CHARS: usize = 500_000;

// =============================================================================
// DIALECT
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatDialect {
    #[default]
    OpenAi,
    Anthropic,
}

impl ChatDialect {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ChatDialect::OpenAi => "https://api.openai.com/v1",
            ChatDialect::Anthropic => "https://api.anthropic.com/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ChatDialect::OpenAi => "gpt-3.5-turbo",
            ChatDialect::Anthropic => "claude-3-5-haiku-latest",
        }
    }

    fn path(&self) -> &'static str {
        match self {
            ChatDialect::OpenAi => "chat/completions",
            ChatDialect::Anthropic => "messages",
        }
    }
}

// =============================================================================
// PROVIDER
// =============================================================================

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub id: String,
    pub dialect: ChatDialect,
    pub model: String,
    pub base_url: String,
    /// API credential; `None` makes every call fail with `AuthenticationFailed`.
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub prompt: PromptTemplate,
}

impl ChatConfig {
    pub fn new(id: impl Into<String>, dialect: ChatDialect, api_key: Option<String>) -> Self {
        Self {
            id: id.into(),
            dialect,
            model: dialect.default_model().to_string(),
            base_url: dialect.default_base_url().to_string(),
            api_key,
            timeout: Duration::from_secs(120),
            prompt: DEFAULT_PROMPT,
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Commercial chat-completion API used as a paraphrase backend.
#[derive(Debug, Clone)]
pub struct ChatCompletionProvider {
    id: String,
    dialect: ChatDialect,
    model: String,
    client: reqwest::Client,
    url: String,
    authenticated: bool,
    prompt: PromptTemplate,
}

impl ChatCompletionProvider {
    pub fn new(config: ChatConfig) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty());

        if let Some(key) = key {
            let invalid = || ProviderError::authentication(&config.id, "Invalid API key format");
            match config.dialect {
                ChatDialect::OpenAi => {
                    let mut v =
                        HeaderValue::from_str(&format!("Bearer {key}")).map_err(|_| invalid())?;
                    v.set_sensitive(true);
                    headers.insert(AUTHORIZATION, v);
                }
                ChatDialect::Anthropic => {
                    let mut v = HeaderValue::from_str(key).map_err(|_| invalid())?;
                    v.set_sensitive(true);
                    headers.insert("x-api-key", v);
                    headers.insert(
                        "anthropic-version",
                        HeaderValue::from_static(ANTHROPIC_VERSION),
                    );
                }
            }
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| {
                ProviderError::transport(&config.id, format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            url: format!(
                "{}/{}",
                config.base_url.trim_end_matches('/'),
                config.dialect.path()
            ),
            authenticated: key.is_some(),
            id: config.id,
            dialect: config.dialect,
            model: config.model,
            client,
            prompt: config.prompt,
        })
    }

    pub fn dialect(&self) -> ChatDialect {
        self.dialect
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Check if message indicates a refusal.
    fn is_refusal(msg: &str) -> bool {
        let l = msg.trim_start().to_lowercase();
        let first_line = l.lines().next().unwrap_or("");

        const PREFIXES: &[&str] = &[
            "i cannot",
            "i can't",
            "i won't",
            "i will not",
            "i am unable to",
            "i'm unable to",
            "unable to comply",
            "unable to assist",
        ];

        PREFIXES.iter().any(|p| first_line.starts_with(p))
    }

    fn build_body(
        &self,
        prompt: &PromptInstance,
        req: &ParaphraseRequest,
    ) -> Result<serde_json::Value, ProviderError> {
        let opts = req.options();
        match self.dialect {
            ChatDialect::OpenAi => serde_json::to_value(OpenAiRequest {
                model: &self.model,
                messages: vec![
                    ApiMessage {
                        role: "system",
                        content: &prompt.system,
                    },
                    ApiMessage {
                        role: "user",
                        content: &prompt.user,
                    },
                ],
                temperature: opts.temperature,
                max_tokens: opts.max_length,
                n: (opts.candidates > 1).then_some(opts.candidates),
            }),
            ChatDialect::Anthropic => serde_json::to_value(AnthropicRequest {
                model: &self.model,
                max_tokens: opts.max_length,
                system: &prompt.system,
                messages: vec![ApiMessage {
                    role: "user",
                    content: &prompt.user,
                }],
                temperature: opts.temperature,
            }),
        }
        .map_err(|e| {
            ProviderError::generation(&self.id, format!("Failed to encode request: {e}"))
        })
    }

    fn candidate(&self, text: String, truncated: bool) -> ParaphraseCandidate {
        let c = ParaphraseCandidate::new(&self.id, text);
        if truncated {
            c.with_partial_error("output truncated at max_tokens")
        } else {
            c
        }
    }

    fn parse_openai(
        &self,
        body: &str,
        ctx: ErrorContext,
    ) -> Result<Vec<ParaphraseCandidate>, ProviderError> {
        let parsed: OpenAiResponse = serde_json::from_str(body).map_err(|e| {
            ProviderError::unexpected_shape(&self.id, format!("Invalid JSON: {e}"))
                .with_context(ctx.clone())
        })?;

        if let Some(error) = parsed.error {
            return Err(ProviderError::generation(&self.id, error.describe()).with_context(ctx));
        }

        let choices = parsed.choices.filter(|c| !c.is_empty()).ok_or_else(|| {
            ProviderError::unexpected_shape(&self.id, "No choices in response")
                .with_context(ctx.clone())
        })?;

        let mut refusal = None;
        let mut candidates = Vec::new();
        for choice in choices {
            let truncated = choice.finish_reason.as_deref() == Some("length");
            let Some(text) = choice
                .message
                .and_then(|m| m.content)
                .as_deref()
                .and_then(clean_generation)
            else {
                continue;
            };
            if Self::is_refusal(&text) {
                refusal = Some(text);
                continue;
            }
            candidates.push(self.candidate(text, truncated));
        }

        self.finish(candidates, refusal, ctx)
    }

    fn parse_anthropic(
        &self,
        body: &str,
        ctx: ErrorContext,
    ) -> Result<Vec<ParaphraseCandidate>, ProviderError> {
        let parsed: AnthropicResponse = serde_json::from_str(body).map_err(|e| {
            ProviderError::unexpected_shape(&self.id, format!("Invalid JSON: {e}"))
                .with_context(ctx.clone())
        })?;

        if let Some(error) = parsed.error {
            return Err(ProviderError::generation(&self.id, error.describe()).with_context(ctx));
        }

        let content = parsed.content.ok_or_else(|| {
            ProviderError::unexpected_shape(&self.id, "No content in response")
                .with_context(ctx.clone())
        })?;

        let truncated = parsed.stop_reason.as_deref() == Some("max_tokens");
        let text = content
            .into_iter()
            .filter(|c| c.content_type == "text")
            .find_map(|c| c.text.as_deref().and_then(clean_generation));

        let mut refusal = None;
        let mut candidates = Vec::new();
        if let Some(text) = text {
            if Self::is_refusal(&text) {
                refusal = Some(text);
            } else {
                candidates.push(self.candidate(text, truncated));
            }
        }

        self.finish(candidates, refusal, ctx)
    }

    fn finish(
        &self,
        candidates: Vec<ParaphraseCandidate>,
        refusal: Option<String>,
        ctx: ErrorContext,
    ) -> Result<Vec<ParaphraseCandidate>, ProviderError> {
        if !candidates.is_empty() {
            return Ok(candidates);
        }
        let message = match refusal {
            Some(text) => format!("refused: {text}"),
            None => "empty completion".to_string(),
        };
        Err(ProviderError::generation(&self.id, message).with_context(ctx))
    }
}

// =============================================================================
// API TYPES
// =============================================================================

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    n: Option<u32>,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ApiMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Option<Vec<Choice>>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Option<Vec<AnthropicContent>>,
    stop_reason: Option<String>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

/// Error object shared by both dialects: `{"error": {"message", "type", "code"}}`.
#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
    #[serde(rename = "type")]
    error_type: Option<String>,
    code: Option<serde_json::Value>,
}

impl ApiError {
    fn describe(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.error_type.clone())
            .unwrap_or_else(|| "unknown error".to_string())
    }

    fn code(&self) -> Option<String> {
        match &self.code {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Null) | None => self.error_type.clone(),
            Some(other) => Some(other.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ApiError>,
}

// =============================================================================
// PROVIDER IMPL
// =============================================================================

#[async_trait]
impl ParaphraseProvider for ChatCompletionProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn backend(&self) -> &'static str {
        "chat"
    }

    async fn generate(
        &self,
        req: &ParaphraseRequest,
    ) -> Result<Vec<ParaphraseCandidate>, ProviderError> {
        if !self.authenticated {
            return Err(ProviderError::authentication(&self.id, "API key not set"));
        }

        if req.text().len() > MAX_INPUT_CHARS {
            return Err(ProviderError::generation(
                &self.id,
                format!(
                    "Input too large: {} chars (max {MAX_INPUT_CHARS})",
                    req.text().len()
                ),
            ));
        }

        let prompt = self.prompt.render(req.text(), &req.options().styles);
        let body = self.build_body(&prompt, req)?;

        tracing::debug!(
            provider = %self.id,
            model = %self.model,
            dialect = ?self.dialect,
            template = prompt.template_slug,
            "chat completion call"
        );

        let response = self
            .client
            .post(&self.url)
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
            let (message, ctx) = match serde_json::from_str::<ErrorEnvelope>(&body)
                .ok()
                .and_then(|e| e.error)
            {
                Some(error) => {
                    let ctx = match error.code() {
                        Some(code) => ctx.with_code(code),
                        None => ctx,
                    };
                    (error.describe(), ctx)
                }
                None => (String::new(), ctx),
            };
            return Err(ProviderError::from_status(
                &self.id,
                status.as_u16(),
                message,
                ctx,
            ));
        }

        match self.dialect {
            ChatDialect::OpenAi => self.parse_openai(&body, ctx),
            ChatDialect::Anthropic => self.parse_anthropic(&body, ctx),
        }
    }
}
