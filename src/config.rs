//! File-based configuration and provider registry.
//!
//! The TOML file names providers and request defaults. Credentials never live
//! in the file: each provider names the environment variable holding its key.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::gateway::chat::{ChatCompletionProvider, ChatConfig, ChatDialect};
use crate::gateway::hosted::{HostedConfig, HostedInferenceProvider};
use crate::gateway::{
    GatewayConfig, GenerationOptions, ParaphraseProvider, ProviderGateway, UsageSink,
};
use crate::scoring::{Scorer, DEFAULT_CEILING};
use crate::selector::{Ensemble, SelectionError, DEFAULT_CALL_TIMEOUT};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// =============================================================================
// File format
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Providers consulted per request, in invocation order.
    pub active: Vec<String>,
    #[serde(default = "default_call_timeout")]
    pub call_timeout_seconds: u64,
    #[serde(default)]
    pub generation: GenerationOptions,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

fn default_call_timeout() -> u64 {
    DEFAULT_CALL_TIMEOUT.as_secs()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoringConfig {
    #[serde(default = "default_ceiling")]
    pub ceiling: u32,
}

fn default_ceiling() -> u32 {
    DEFAULT_CEILING
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            ceiling: DEFAULT_CEILING,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Hosted,
    Chat,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Hosted => "hosted",
            ProviderKind::Chat => "chat",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    /// Chat dialect; ignored for hosted providers.
    #[serde(default)]
    pub dialect: ChatDialect,
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// Environment variable holding the credential. Defaults per kind.
    pub api_key_env: Option<String>,
    /// Override of the hosted instruction prefix.
    pub prefix: Option<String>,
    #[serde(default)]
    pub max_retries: u32,
    pub timeout_seconds: Option<u64>,
}

impl ProviderConfig {
    /// Name of the environment variable consulted for the credential.
    pub fn credential_var(&self) -> &str {
        if let Some(var) = self.api_key_env.as_deref() {
            return var;
        }
        match (self.kind, self.dialect) {
            (ProviderKind::Hosted, _) => "HF_API_TOKEN",
            (ProviderKind::Chat, ChatDialect::OpenAi) => "OPENAI_API_KEY",
            (ProviderKind::Chat, ChatDialect::Anthropic) => "ANTHROPIC_API_KEY",
        }
    }

    /// Model name, falling back to the dialect default for chat providers.
    pub fn resolved_model(&self) -> Option<&str> {
        match (self.kind, self.model.as_deref()) {
            (_, Some(model)) => Some(model),
            (ProviderKind::Chat, None) => Some(self.dialect.default_model()),
            (ProviderKind::Hosted, None) => None,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for p in &self.providers {
            if p.id.trim().is_empty() {
                return Err(ConfigError::Invalid("provider id must not be blank".into()));
            }
            if !seen.insert(p.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate provider id '{}'",
                    p.id
                )));
            }
            if p.resolved_model().is_none() {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}' needs a model",
                    p.id
                )));
            }
        }

        if self.active.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one active provider is required".into(),
            ));
        }
        for id in &self.active {
            if !seen.contains(id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "active provider '{id}' is not declared"
                )));
            }
        }

        self.generation
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("generation: {e}")))?;

        if self.scoring.ceiling == 0 {
            return Err(ConfigError::Invalid(
                "scoring ceiling must be greater than 0".into(),
            ));
        }
        if self.call_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "call_timeout_seconds must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn scorer(&self) -> Scorer {
        Scorer::new(self.scoring.ceiling)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_seconds)
    }

    /// Ensemble over the `active` providers, with configured scoring and timeout.
    pub fn ensemble(&self, registry: &ProviderRegistry) -> Result<Ensemble, SelectionError> {
        Ok(registry
            .ensemble(self.active.as_slice())?
            .with_scorer(self.scorer())
            .with_call_timeout(self.call_timeout()))
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Named providers available to an ensemble, in registration order.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn ParaphraseProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every configured provider, reading credentials from the process
    /// environment.
    pub fn from_config<U>(config: &AppConfig, usage: Arc<U>) -> Result<Self, ConfigError>
    where
        U: UsageSink + 'static,
    {
        Self::from_config_with_env(config, usage, |var| std::env::var(var).ok())
    }

    /// Like [`ProviderRegistry::from_config`] with an explicit credential lookup.
    pub fn from_config_with_env<U, F>(
        config: &AppConfig,
        usage: Arc<U>,
        env: F,
    ) -> Result<Self, ConfigError>
    where
        U: UsageSink + 'static,
        F: Fn(&str) -> Option<String>,
    {
        let mut registry = Self::new();
        for p in &config.providers {
            let api_key = env(p.credential_var());
            if api_key.is_none() {
                tracing::warn!(
                    provider = %p.id,
                    var = p.credential_var(),
                    "credential not set; provider calls will fail"
                );
            }
            registry.register(build_provider(p, api_key, Arc::clone(&usage))?)?;
        }
        Ok(registry)
    }

    /// Add a provider. Ids must be unique.
    pub fn register(&mut self, provider: Arc<dyn ParaphraseProvider>) -> Result<(), ConfigError> {
        if self.get(provider.id()).is_some() {
            return Err(ConfigError::Invalid(format!(
                "duplicate provider id '{}'",
                provider.id()
            )));
        }
        self.providers.push(provider);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ParaphraseProvider>> {
        self.providers.iter().find(|p| p.id() == id).cloned()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Ensemble over the named providers, in the order given.
    pub fn ensemble<S: AsRef<str>>(&self, ids: &[S]) -> Result<Ensemble, SelectionError> {
        Ensemble::new(self.providers.clone()).with_active(ids)
    }
}

fn build_provider<U>(
    cfg: &ProviderConfig,
    api_key: Option<String>,
    usage: Arc<U>,
) -> Result<Arc<dyn ParaphraseProvider>, ConfigError>
where
    U: UsageSink + 'static,
{
    let invalid = |e: crate::gateway::ProviderError| ConfigError::Invalid(e.to_string());
    let model = cfg
        .resolved_model()
        .ok_or_else(|| ConfigError::Invalid(format!("provider '{}' needs a model", cfg.id)))?;

    let inner: Arc<dyn ParaphraseProvider> = match cfg.kind {
        ProviderKind::Hosted => {
            let mut hosted = HostedConfig::new(&cfg.id, model, api_key);
            if let Some(url) = &cfg.base_url {
                hosted = hosted.base_url(url);
            }
            if let Some(prefix) = &cfg.prefix {
                hosted = hosted.prefix(prefix);
            }
            if let Some(secs) = cfg.timeout_seconds {
                hosted = hosted.timeout(Duration::from_secs(secs));
            }
            Arc::new(HostedInferenceProvider::new(hosted).map_err(invalid)?)
        }
        ProviderKind::Chat => {
            let mut chat = ChatConfig::new(&cfg.id, cfg.dialect, api_key).model(model);
            if let Some(url) = &cfg.base_url {
                chat = chat.base_url(url);
            }
            if let Some(secs) = cfg.timeout_seconds {
                chat = chat.timeout(Duration::from_secs(secs));
            }
            Arc::new(ChatCompletionProvider::new(chat).map_err(invalid)?)
        }
    };

    let gateway = GatewayConfig {
        max_retries: cfg.max_retries,
        ..GatewayConfig::default()
    };
    Ok(Arc::new(ProviderGateway::with_config(inner, usage, gateway)))
}
