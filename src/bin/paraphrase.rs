#![forbid(unsafe_code)]

use std::io::{self, Read};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use paraphrase_harness::config::{AppConfig, ConfigError, ProviderRegistry};
use paraphrase_harness::gateway::{NoopUsageSink, StderrUsageSink, StyleHints, TracingUsageSink};
use paraphrase_harness::scoring::{Scorer, DEFAULT_CEILING};
use paraphrase_harness::server::{self, AppState};

#[derive(Parser)]
#[command(
    name = "paraphrase",
    version,
    about = "Paraphrase providers and human-likeness scoring"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
#[group(multiple = false)]
struct InputArgs {
    /// Inline text
    #[arg(long)]
    text: Option<String>,

    /// Read text from a file
    #[arg(long)]
    file: Option<PathBuf>,
}

impl InputArgs {
    /// Inline text, then file, then stdin.
    fn read(&self) -> io::Result<String> {
        if let Some(text) = &self.text {
            return Ok(text.clone());
        }
        if let Some(path) = &self.file {
            return std::fs::read_to_string(path);
        }
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Score text for human-likeness and print the breakdown
    Score {
        #[command(flatten)]
        input: InputArgs,

        #[arg(long, default_value_t = DEFAULT_CEILING)]
        ceiling: u32,
    },
    /// Paraphrase text with the configured providers and print the selection
    Run {
        #[arg(long, env = "PARAPHRASE_CONFIG")]
        config: PathBuf,

        #[command(flatten)]
        input: InputArgs,

        /// Restrict to these providers (repeatable); defaults to `active`
        #[arg(long = "provider")]
        providers: Vec<String>,

        #[arg(long)]
        temperature: Option<f32>,

        #[arg(long)]
        candidates: Option<u32>,

        #[arg(long)]
        max_length: Option<u32>,

        /// Style hints, comma-separated
        #[arg(long, value_delimiter = ',')]
        styles: Option<Vec<String>>,

        /// Write one JSON usage record per provider call to stderr
        #[arg(long)]
        usage: bool,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long, env = "PARAPHRASE_CONFIG")]
        config: PathBuf,

        #[arg(long, default_value = "127.0.0.1:5000")]
        addr: SocketAddr,

        /// Log one usage event per provider call
        #[arg(long)]
        usage: bool,
    },
    /// List configured providers
    Providers {
        #[arg(long, env = "PARAPHRASE_CONFIG")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Score { input, ceiling } => {
            if ceiling == 0 {
                return Err("--ceiling must be >= 1".into());
            }
            let text = input.read()?;
            let score = Scorer::new(ceiling).score(&text);
            println!("{}", serde_json::to_string_pretty(&score)?);
        }
        Commands::Run {
            config,
            input,
            providers,
            temperature,
            candidates,
            max_length,
            styles,
            usage,
        } => {
            let cfg = AppConfig::load(&config)?;
            let registry = build_registry(&cfg, usage)?;
            let ensemble = if providers.is_empty() {
                cfg.ensemble(&registry)?
            } else {
                registry
                    .ensemble(providers.as_slice())?
                    .with_scorer(cfg.scorer())
                    .with_call_timeout(cfg.call_timeout())
            };

            let mut options = cfg.generation.clone();
            if let Some(t) = temperature {
                options.temperature = t;
            }
            if let Some(n) = candidates {
                options.candidates = n;
            }
            if let Some(max) = max_length {
                options.max_length = max;
            }
            if let Some(styles) = styles {
                options.styles = StyleHints::new(styles);
            }

            let text = input.read()?;
            let selection = ensemble.paraphrase(&text, options).await?;
            println!("{}", serde_json::to_string_pretty(&selection)?);
        }
        Commands::Serve {
            config,
            addr,
            usage,
        } => {
            let cfg = AppConfig::load(&config)?;
            let registry = if usage {
                ProviderRegistry::from_config(&cfg, Arc::new(TracingUsageSink))?
            } else {
                ProviderRegistry::from_config(&cfg, Arc::new(NoopUsageSink))?
            };
            let state = AppState {
                ensemble: cfg.ensemble(&registry)?,
                defaults: cfg.generation.clone(),
            };
            let listener = tokio::net::TcpListener::bind(addr).await?;
            server::serve(listener, state).await?;
        }
        Commands::Providers { config } => {
            let cfg = AppConfig::load(&config)?;
            list_providers(&cfg, &config);
        }
    }

    Ok(())
}

fn build_registry(cfg: &AppConfig, usage: bool) -> Result<ProviderRegistry, ConfigError> {
    if usage {
        ProviderRegistry::from_config(cfg, Arc::new(StderrUsageSink))
    } else {
        ProviderRegistry::from_config(cfg, Arc::new(NoopUsageSink))
    }
}

fn list_providers(cfg: &AppConfig, path: &Path) {
    println!("# {}", path.display());
    for p in &cfg.providers {
        let credential = match std::env::var(p.credential_var()) {
            Ok(v) if !v.trim().is_empty() => "set",
            _ => "missing",
        };
        let active = if cfg.active.contains(&p.id) { "*" } else { " " };
        println!(
            "{active} {}\t{}\t{}\t{}={credential}",
            p.id,
            p.kind.as_str(),
            p.resolved_model().unwrap_or("-"),
            p.credential_var(),
        );
    }
}
