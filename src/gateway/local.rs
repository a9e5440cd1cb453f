//! Locally loaded paraphrase models.
//!
//! The provider owns a lazily-initialized model handle. Loading happens at most
//! once per provider: concurrent first callers wait on the same initializer,
//! and a failed load leaves the cell empty so the next request tries again.
//! The initializer runs in its own task, so a caller that gives up (for
//! example on an ensemble timeout) does not abandon a load in progress.
//!
//! No inference runtime is bundled; callers supply a [`ModelLoader`] that
//! yields a [`LocalModel`] (tokenizer + generator) for their runtime of choice.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use super::error::ProviderError;
use super::types::{ParaphraseCandidate, ParaphraseRequest};
use super::{clean_generation, ParaphraseProvider};
use crate::prompts::{PromptTemplate, DEFAULT_PROMPT, SEQ2SEQ_PREFIX};

/// Default fixed input window, in tokens.
pub const DEFAULT_MAX_INPUT_TOKENS: usize = 512;

/// Default beam count for local generation.
pub const DEFAULT_NUM_BEAMS: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum LocalModelError {
    #[error("model load failed: {0}")]
    Load(String),
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
    #[error("inference error: {0}")]
    Inference(String),
}

/// Token ids after deterministic truncation/padding to the input window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedInput {
    pub input_ids: Vec<u32>,
    /// 1 for real tokens, 0 for padding.
    pub attention_mask: Vec<u32>,
    /// Number of real (non-pad) tokens.
    pub len: usize,
}

/// Sampling parameters handed to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub num_return_sequences: u32,
    pub num_beams: u32,
    pub max_length: u32,
    pub do_sample: bool,
}

/// A loaded tokenizer + generator pair.
pub trait LocalModel: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<u32>, LocalModelError>;

    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String, LocalModelError>;

    fn pad_token_id(&self) -> u32;

    /// Return one token sequence per requested sequence. Causal models
    /// return the real input tokens followed by the continuation.
    fn generate(
        &self,
        input: &EncodedInput,
        params: &SamplingParams,
    ) -> Result<Vec<Vec<u32>>, LocalModelError>;
}

/// Produces the model on first use. Runs on the blocking thread pool.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<Arc<dyn LocalModel>, LocalModelError>;
}

impl<F> ModelLoader for F
where
    F: Fn() -> Result<Arc<dyn LocalModel>, LocalModelError> + Send + Sync,
{
    fn load(&self) -> Result<Arc<dyn LocalModel>, LocalModelError> {
        self()
    }
}

/// Model architecture, which decides how the prompt is built and read back.
#[derive(Debug, Clone, Copy)]
pub enum LocalModelKind {
    /// Encoder-decoder model fed `"paraphrase: <text>"`.
    Seq2Seq,
    /// Decoder-only model fed an instruction prompt; the echoed prompt is
    /// stripped from its output.
    Causal(PromptTemplate),
}

impl LocalModelKind {
    pub fn causal() -> Self {
        LocalModelKind::Causal(DEFAULT_PROMPT)
    }
}

/// Truncate or pad `ids` to exactly `window` tokens.
pub fn fit_to_window(mut ids: Vec<u32>, window: usize, pad_id: u32) -> EncodedInput {
    ids.truncate(window);
    let len = ids.len();
    let mut attention_mask = vec![1; len];
    ids.resize(window, pad_id);
    attention_mask.resize(window, 0);
    EncodedInput {
        input_ids: ids,
        attention_mask,
        len,
    }
}

pub struct LocalModelProvider {
    id: String,
    kind: LocalModelKind,
    loader: Arc<dyn ModelLoader>,
    model: Arc<OnceCell<Arc<dyn LocalModel>>>,
    max_input_tokens: usize,
    num_beams: u32,
}

impl LocalModelProvider {
    pub fn new(id: impl Into<String>, kind: LocalModelKind, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            id: id.into(),
            kind,
            loader,
            model: Arc::new(OnceCell::new()),
            max_input_tokens: DEFAULT_MAX_INPUT_TOKENS,
            num_beams: DEFAULT_NUM_BEAMS,
        }
    }

    pub fn max_input_tokens(mut self, n: usize) -> Self {
        self.max_input_tokens = n.max(1);
        self
    }

    pub fn num_beams(mut self, n: u32) -> Self {
        self.num_beams = n.max(1);
        self
    }

    /// Whether the model has been loaded yet.
    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    async fn model(&self) -> Result<Arc<dyn LocalModel>, ProviderError> {
        if let Some(model) = self.model.get() {
            return Ok(Arc::clone(model));
        }

        let cell = Arc::clone(&self.model);
        let loader = Arc::clone(&self.loader);
        let id = self.id.clone();
        let init = tokio::spawn(async move {
            let model = cell
                .get_or_try_init(|| async move {
                    tracing::info!(provider = %id, "loading local model");
                    match tokio::task::spawn_blocking(move || loader.load()).await {
                        Ok(loaded) => loaded,
                        Err(e) => Err(LocalModelError::Load(e.to_string())),
                    }
                })
                .await?;
            Ok::<_, LocalModelError>(Arc::clone(model))
        });

        match init.await {
            Ok(Ok(model)) => Ok(model),
            Ok(Err(e)) => Err(ProviderError::generation(&self.id, e.to_string())),
            Err(e) => Err(ProviderError::generation(
                &self.id,
                format!("model load task failed: {e}"),
            )),
        }
    }

    fn build_prompt(&self, req: &ParaphraseRequest) -> String {
        match self.kind {
            LocalModelKind::Seq2Seq => format!("{SEQ2SEQ_PREFIX}{}", req.text()),
            LocalModelKind::Causal(template) => {
                template.render_completion(req.text(), &req.options().styles)
            }
        }
    }
}

/// What a blocking generation task needs from the provider.
#[derive(Debug, Clone)]
struct RunPlan {
    id: String,
    kind: LocalModelKind,
    max_input_tokens: usize,
}

fn run(
    plan: &RunPlan,
    model: &dyn LocalModel,
    prompt: &str,
    params: &SamplingParams,
) -> Result<Vec<ParaphraseCandidate>, LocalModelError> {
    let input = fit_to_window(
        model.encode(prompt)?,
        plan.max_input_tokens,
        model.pad_token_id(),
    );

    let sequences = model.generate(&input, params)?;
    let max_len = params.max_length as usize;
    let skip = match plan.kind {
        LocalModelKind::Seq2Seq => 0,
        LocalModelKind::Causal(_) => input.len,
    };

    let mut candidates = Vec::new();
    for seq in sequences.iter().take(params.num_return_sequences as usize) {
        let output = seq.get(skip..).unwrap_or(&[]);
        let truncated = output.len() > max_len;
        let output = &output[..output.len().min(max_len)];
        let text = model.decode(output, true)?;
        if let Some(text) = clean_generation(&text) {
            let c = ParaphraseCandidate::new(&plan.id, text);
            candidates.push(if truncated {
                c.with_partial_error(format!("output truncated at {max_len} tokens"))
            } else {
                c
            });
        }
    }
    Ok(candidates)
}

#[async_trait]
impl ParaphraseProvider for LocalModelProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn backend(&self) -> &'static str {
        "local"
    }

    async fn generate(
        &self,
        req: &ParaphraseRequest,
    ) -> Result<Vec<ParaphraseCandidate>, ProviderError> {
        let model = self.model().await?;
        let opts = req.options();
        let params = SamplingParams {
            temperature: opts.temperature,
            num_return_sequences: opts.candidates,
            num_beams: self.num_beams.max(opts.candidates),
            max_length: opts.max_length,
            do_sample: opts.temperature > 0.0,
        };
        let prompt = self.build_prompt(req);

        tracing::debug!(provider = %self.id, beams = params.num_beams, "local generation");

        let plan = RunPlan {
            id: self.id.clone(),
            kind: self.kind,
            max_input_tokens: self.max_input_tokens,
        };
        let candidates =
            tokio::task::spawn_blocking(move || run(&plan, model.as_ref(), &prompt, &params))
                .await
                .map_err(|e| ProviderError::generation(&self.id, e.to_string()))?
                .map_err(|e| ProviderError::generation(&self.id, e.to_string()))?;

        if candidates.is_empty() {
            return Err(ProviderError::generation(&self.id, "model produced no text"));
        }
        Ok(candidates)
    }
}
