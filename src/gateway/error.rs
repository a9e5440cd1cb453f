//! Error types for paraphrase providers.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Additional context from provider errors for debugging.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ErrorContext {
    /// HTTP status code from the provider.
    pub http_status: Option<u16>,
    /// Provider-specific error code (e.g. "invalid_api_key").
    pub provider_code: Option<String>,
    /// Request ID from provider (x-request-id header).
    pub request_id: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// What went wrong inside a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Credential missing, malformed, or rejected by the remote side.
    AuthenticationFailed,
    /// Network failure, timeout, or a non-success HTTP status.
    TransportFailed,
    /// The backend answered with data that does not match the expected schema.
    UnexpectedResponseShape,
    /// The backend reported an internal error or produced nothing usable.
    GenerationFailed,
}

impl ProviderErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::TransportFailed => "transport_failed",
            Self::UnexpectedResponseShape => "unexpected_response_shape",
            Self::GenerationFailed => "generation_failed",
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured provider failure. Never smuggled into candidate text.
#[derive(Debug, Clone, Error, PartialEq, Eq, serde::Serialize)]
#[error("{provider} {kind}: {message}")]
pub struct ProviderError {
    /// Identifier of the provider that failed.
    pub provider: String,
    pub kind: ProviderErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,
}

impl ProviderError {
    pub fn new(
        provider: impl Into<String>,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            kind,
            message: message.into(),
            context: None,
        }
    }

    /// Create an authentication error.
    pub fn authentication(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::AuthenticationFailed, message)
    }

    /// Create a transport error.
    pub fn transport(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::TransportFailed, message)
    }

    /// Create a transport error for a call that exceeded its deadline.
    pub fn timeout(provider: impl Into<String>, after: Duration) -> Self {
        Self::transport(provider, format!("timeout after {after:?}"))
    }

    /// Create a schema mismatch error.
    pub fn unexpected_shape(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::UnexpectedResponseShape, message)
    }

    /// Create a backend-reported generation error.
    pub fn generation(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::GenerationFailed, message)
    }

    /// Map a reqwest failure. Everything reqwest reports is transport-level.
    pub fn from_http(provider: impl Into<String>, err: reqwest::Error) -> Self {
        let ctx = err
            .status()
            .map(|s| ErrorContext::new().with_status(s.as_u16()));
        let mut out = Self::transport(provider, format!("http error: {err}"));
        out.context = ctx;
        out
    }

    /// Classify a non-success HTTP status. 401/403 mean the credential was
    /// rejected; every other status is a transport failure.
    pub fn from_status(
        provider: impl Into<String>,
        status: u16,
        message: impl Into<String>,
        context: ErrorContext,
    ) -> Self {
        let message = message.into();
        let message = if message.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {message}")
        };
        let kind = match status {
            401 | 403 => ProviderErrorKind::AuthenticationFailed,
            _ => ProviderErrorKind::TransportFailed,
        };
        Self::new(provider, kind, message).with_context(context)
    }

    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind == ProviderErrorKind::TransportFailed
    }

    /// Get a short error code for logging.
    pub fn code(&self) -> &'static str {
        self.kind.as_str()
    }

    /// Get the request ID if available.
    pub fn request_id(&self) -> Option<&str> {
        self.context.as_ref().and_then(|c| c.request_id.as_deref())
    }
}
