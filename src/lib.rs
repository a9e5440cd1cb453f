#![forbid(unsafe_code)]

//! # paraphrase-harness
//!
//! Interchangeable paraphrase backends behind one async trait, and a
//! heuristic "human-likeness" scorer that picks the best candidate when
//! several backends are consulted.
//!
//! A [`ParaphraseProvider`] turns source text into one or more candidates:
//! a hosted inference endpoint, a commercial chat-completion API, or a model
//! loaded in-process. An [`Ensemble`] fans a request out to several providers
//! concurrently, pools what comes back, and keeps the highest-scoring
//! candidate. Provider failures never abort the ensemble unless every
//! provider fails.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use paraphrase_harness::config::{AppConfig, ProviderRegistry};
//! use paraphrase_harness::gateway::NoopUsageSink;
//!
//! let cfg = AppConfig::load("paraphrase.toml".as_ref())?;
//! let registry = ProviderRegistry::from_config(&cfg, Arc::new(NoopUsageSink))?;
//! let ensemble = cfg.ensemble(&registry)?;
//! let best = ensemble.paraphrase("Text to rewrite.", cfg.generation.clone()).await?;
//! println!("{} ({})", best.candidate.text, best.score.total);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod gateway;
pub mod prompts;
pub mod scoring;
pub mod selector;
pub mod server;

pub use config::{AppConfig, ConfigError, ProviderRegistry};
pub use gateway::{
    GenerationOptions, ParaphraseCandidate, ParaphraseProvider, ParaphraseRequest, ProviderError,
    ProviderErrorKind, ProviderGateway, RequestError, StyleHints, UsageSink,
};
pub use scoring::{score, HumanScore, Scorer};
pub use selector::{select, Ensemble, SelectionError, SelectionResult};
