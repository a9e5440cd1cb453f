//! Usage tracking via the UsageSink trait.
//!
//! The gateway logs every outbound attempt through a UsageSink. This keeps
//! providers free of any reporting concern:
//! - `paraphrase serve --usage` uses TracingUsageSink
//! - `paraphrase run` uses NoopUsageSink, or StderrUsageSink with `--usage`
//! - tests use NoopUsageSink or a collecting sink

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Status of a provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Success,
    Error,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Success => "success",
            CallStatus::Error => "error",
        }
    }
}

/// Record of one provider attempt.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderCallRecord {
    /// Provider identifier, as configured.
    pub provider: String,
    /// Backend family: "hosted", "chat", "local".
    pub backend: &'static str,
    /// 1-based attempt number within one `generate` call.
    pub attempt: u32,
    /// Candidates returned (0 on error).
    pub candidates: usize,
    /// Latency in milliseconds.
    pub latency_ms: u64,
    pub status: CallStatus,
    /// Error code if status is Error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Provider request ID (for debugging).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProviderCallRecord {
    /// Create a new record with required fields, defaulting others.
    pub fn new(provider: impl Into<String>, backend: &'static str) -> Self {
        Self {
            provider: provider.into(),
            backend,
            attempt: 1,
            candidates: 0,
            latency_ms: 0,
            status: CallStatus::Success,
            error_code: None,
            request_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn candidates(mut self, n: usize) -> Self {
        self.candidates = n;
        self
    }

    pub fn latency(mut self, ms: u64) -> Self {
        self.latency_ms = ms;
        self
    }

    pub fn error(mut self, code: impl Into<String>) -> Self {
        self.status = CallStatus::Error;
        self.error_code = Some(code.into());
        self
    }

    pub fn request_id(mut self, id: Option<&str>) -> Self {
        self.request_id = id.map(str::to_string);
        self
    }
}

/// Trait for recording provider call usage.
///
/// Implement this trait to customize where usage data goes.
#[async_trait]
pub trait UsageSink: Send + Sync {
    /// Record a provider call. This should be fire-and-forget:
    /// failures should be logged but not propagated.
    async fn record(&self, record: ProviderCallRecord);
}

/// No-op usage sink that discards all records.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUsageSink;

#[async_trait]
impl UsageSink for NoopUsageSink {
    async fn record(&self, _record: ProviderCallRecord) {}
}

/// Usage sink that writes one JSON line per call to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrUsageSink;

#[async_trait]
impl UsageSink for StderrUsageSink {
    async fn record(&self, record: ProviderCallRecord) {
        match serde_json::to_string(&record) {
            Ok(line) => eprintln!("{line}"),
            Err(e) => tracing::warn!(error = %e, "failed to serialize usage record"),
        }
    }
}

/// Usage sink that emits each record as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingUsageSink;

#[async_trait]
impl UsageSink for TracingUsageSink {
    async fn record(&self, record: ProviderCallRecord) {
        tracing::info!(
            provider = %record.provider,
            backend = record.backend,
            attempt = record.attempt,
            candidates = record.candidates,
            latency_ms = record.latency_ms,
            status = record.status.as_str(),
            error_code = record.error_code.as_deref().unwrap_or(""),
            "provider call"
        );
    }
}
