//! Local backend: GGUF-quantized models run in-process via Candle.
//!
//! The model and tokenizer are loaded once, when the backend is built, and
//! owned exclusively by it. Prompts use the ChatML template; sampling uses
//! the configured temperature, nucleus probability and seed.
//!
//! Supported presets (all ChatML instruction models):
//! - **Qwen2** `qwen:0.5b`, `qwen:1.5b`
//! - **SmolLM** `smollm:135m`, `smollm:360m`, `smollm:1.7b`
//!
//! Any other value of `model` is treated as a path to a `.gguf` file with a
//! `tokenizer.json` next to it.

use async_trait::async_trait;
use bluechat_config::LocalConfig;
use bluechat_core::backend::Backend;
use bluechat_core::error::BackendError;
use bluechat_core::knowledge::KnowledgeEntry;
use bluechat_core::message::Conversation;
use candle_core::quantized::gguf_file;
use candle_core::{DType, Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::quantized_llama as qllama;
use candle_transformers::models::quantized_qwen2 as qqwen2;
use hf_hub::api::sync::Api;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokenizers::Tokenizer;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::prompt;

// ── Model presets ──────────────────────────────────────────────────────

/// Friendly aliases that resolve to HuggingFace repos and filenames.
struct ModelPreset {
    repo: &'static str,
    gguf_file: &'static str,
    tokenizer_repo: &'static str,
}

fn resolve_preset(alias: &str) -> Option<ModelPreset> {
    match alias.to_lowercase().as_str() {
        "qwen:0.5b" | "qwen-0.5b" | "qwen2-0.5b" => Some(ModelPreset {
            repo: "Qwen/Qwen2-0.5B-Instruct-GGUF",
            gguf_file: "qwen2-0_5b-instruct-q4_k_m.gguf",
            tokenizer_repo: "Qwen/Qwen2-0.5B-Instruct",
        }),
        "qwen:1.5b" | "qwen-1.5b" | "qwen2-1.5b" => Some(ModelPreset {
            repo: "Qwen/Qwen2-1.5B-Instruct-GGUF",
            gguf_file: "qwen2-1_5b-instruct-q4_k_m.gguf",
            tokenizer_repo: "Qwen/Qwen2-1.5B-Instruct",
        }),
        "smollm" | "smollm:135m" | "smollm-135m" => Some(ModelPreset {
            repo: "TheBloke/SmolLM-135M-Instruct-GGUF",
            gguf_file: "smollm-135m-instruct.Q4_K_M.gguf",
            tokenizer_repo: "HuggingFaceTB/SmolLM-135M-Instruct",
        }),
        "smollm:360m" | "smollm-360m" => Some(ModelPreset {
            repo: "TheBloke/SmolLM-360M-Instruct-GGUF",
            gguf_file: "smollm-360m-instruct.Q4_K_M.gguf",
            tokenizer_repo: "HuggingFaceTB/SmolLM-360M-Instruct",
        }),
        "smollm:1.7b" | "smollm-1.7b" => Some(ModelPreset {
            repo: "TheBloke/SmolLM-1.7B-Instruct-GGUF",
            gguf_file: "smollm-1.7b-instruct.Q4_K_M.gguf",
            tokenizer_repo: "HuggingFaceTB/SmolLM-1.7B-Instruct",
        }),
        _ => None,
    }
}

// ── Weights ────────────────────────────────────────────────────────────

/// Quantized weights, by GGUF `general.architecture`.
enum Weights {
    Llama(qllama::ModelWeights),
    Qwen2(qqwen2::ModelWeights),
}

impl Weights {
    fn forward(&mut self, input: &Tensor, position: usize) -> candle_core::Result<Tensor> {
        match self {
            Self::Llama(m) => m.forward(input, position),
            Self::Qwen2(m) => m.forward(input, position),
        }
    }
}

/// Sampling parameters taken from [`LocalConfig`].
#[derive(Debug, Clone, Copy)]
struct Sampling {
    max_tokens: u32,
    temperature: f64,
    top_p: f64,
    seed: u64,
}

/// The loaded model state (tokenizer + weights).
struct LocalModelState {
    weights: Weights,
    tokenizer: Tokenizer,
    device: Device,
    stop_tokens: Vec<u32>,
}

impl LocalModelState {
    /// Load a model by preset alias or `.gguf` path.
    fn load(model: &str) -> Result<Self, BackendError> {
        let (model_path, tokenizer_path) = Self::resolve_files(model)?;
        let device = Device::Cpu;

        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            BackendError::NotConfigured(format!("Failed to load tokenizer: {e}"))
        })?;

        let mut file = std::fs::File::open(&model_path).map_err(|e| {
            BackendError::NotConfigured(format!("Failed to open model file: {e}"))
        })?;
        let gguf = gguf_file::Content::read(&mut file).map_err(|e| {
            BackendError::NotConfigured(format!("Failed to parse GGUF file: {e}"))
        })?;

        let architecture = gguf
            .metadata
            .get("general.architecture")
            .and_then(|v| v.to_string().ok())
            .cloned()
            .unwrap_or_else(|| "llama".to_string());

        let weights = match architecture.as_str() {
            "qwen2" => Weights::Qwen2(
                qqwen2::ModelWeights::from_gguf(gguf, &mut file, &device).map_err(load_err)?,
            ),
            _ => Weights::Llama(
                qllama::ModelWeights::from_gguf(gguf, &mut file, &device).map_err(load_err)?,
            ),
        };

        let stop_tokens: Vec<u32> = ["<|im_end|>", "<|endoftext|>", "</s>"]
            .iter()
            .filter_map(|t| tokenizer.token_to_id(t))
            .collect();

        if stop_tokens.is_empty() {
            return Err(BackendError::NotConfigured(
                "Tokenizer has no end-of-turn token".into(),
            ));
        }

        info!(
            architecture = %architecture,
            path = %model_path.display(),
            "Local model loaded"
        );

        Ok(Self {
            weights,
            tokenizer,
            device,
            stop_tokens,
        })
    }

    /// Locate the GGUF and tokenizer files, downloading presets if needed.
    fn resolve_files(model: &str) -> Result<(PathBuf, PathBuf), BackendError> {
        let path = Path::new(model);
        if path.extension().is_some_and(|ext| ext == "gguf") {
            if !path.exists() {
                return Err(BackendError::NotConfigured(format!(
                    "Model file not found: {model}"
                )));
            }
            let tokenizer = path.with_file_name("tokenizer.json");
            if !tokenizer.exists() {
                return Err(BackendError::NotConfigured(format!(
                    "No tokenizer.json next to {model}"
                )));
            }
            return Ok((path.to_path_buf(), tokenizer));
        }

        let preset = resolve_preset(model).ok_or_else(|| {
            BackendError::NotConfigured(format!(
                "Unknown local model '{model}'. Available presets: qwen:0.5b, qwen:1.5b, \
                 smollm:135m, smollm:360m, smollm:1.7b. Or provide a path to a .gguf file."
            ))
        })?;

        info!(
            model,
            repo = preset.repo,
            file = preset.gguf_file,
            "Downloading/loading local model"
        );

        let api = Api::new().map_err(|e| {
            BackendError::Network(format!("Failed to initialize HuggingFace Hub API: {e}"))
        })?;

        let model_path = api
            .model(preset.repo.to_string())
            .get(preset.gguf_file)
            .map_err(|e| {
                BackendError::Network(format!(
                    "Failed to download model '{}' from '{}': {e}",
                    preset.gguf_file, preset.repo
                ))
            })?;

        let tokenizer_path = api
            .model(preset.tokenizer_repo.to_string())
            .get("tokenizer.json")
            .map_err(|e| {
                BackendError::Network(format!(
                    "Failed to download tokenizer from '{}': {e}",
                    preset.tokenizer_repo
                ))
            })?;

        Ok((model_path, tokenizer_path))
    }

    /// Run inference: tokenize, sample until a stop token, decode.
    ///
    /// Checks `cancelled` between tokens and returns early once it is set.
    fn generate(
        &mut self,
        prompt: &str,
        sampling: Sampling,
        cancelled: &AtomicBool,
    ) -> Result<String, BackendError> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| BackendError::Inference(format!("Tokenization failed: {e}")))?;
        let prompt_tokens = encoding.get_ids();

        debug!(
            prompt_tokens = prompt_tokens.len(),
            max_tokens = sampling.max_tokens,
            "Starting local generation"
        );

        let mut logits_processor = LogitsProcessor::new(
            sampling.seed,
            Some(sampling.temperature),
            Some(sampling.top_p),
        );

        let mut input = Tensor::new(prompt_tokens, &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(map_candle_err)?;
        let mut position = 0;
        let mut generated: Vec<u32> = Vec::new();

        for _ in 0..sampling.max_tokens {
            if cancelled.load(Ordering::Relaxed) {
                debug!(generated = generated.len(), "Local generation cancelled");
                break;
            }

            let step = input.dim(1).map_err(map_candle_err)?;
            let logits = self
                .weights
                .forward(&input, position)
                .and_then(|l| l.squeeze(0))
                .and_then(|l| l.to_dtype(DType::F32))
                .map_err(map_candle_err)?;
            position += step;

            let next = logits_processor.sample(&logits).map_err(map_candle_err)?;
            if self.stop_tokens.contains(&next) {
                break;
            }
            generated.push(next);

            input = Tensor::new(&[next][..], &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(map_candle_err)?;
        }

        self.tokenizer
            .decode(&generated, true)
            .map_err(|e| BackendError::Inference(format!("Detokenization failed: {e}")))
    }
}

fn load_err(e: candle_core::Error) -> BackendError {
    BackendError::NotConfigured(format!("Failed to load model weights: {e}"))
}

fn map_candle_err(e: candle_core::Error) -> BackendError {
    BackendError::Inference(format!("Candle inference error: {e}"))
}

/// Sets the shared flag when the request future is dropped.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

// ── Backend ────────────────────────────────────────────────────────────

/// A backend running a GGUF model on the local CPU.
///
/// The model sits behind a Mutex because Candle inference mutates its KV
/// cache; concurrent requests are served one at a time.
pub struct LocalBackend {
    name: String,
    sampling: Sampling,
    state: Arc<Mutex<LocalModelState>>,
}

impl LocalBackend {
    /// Load the configured model. Blocking: downloads and reads weights.
    pub fn load(config: &LocalConfig) -> Result<Self, BackendError> {
        let state = LocalModelState::load(&config.model)?;
        Ok(Self {
            name: config.name.clone(),
            sampling: Sampling {
                max_tokens: config.max_tokens,
                temperature: config.temperature,
                top_p: config.top_p,
                seed: config.seed,
            },
            state: Arc::new(Mutex::new(state)),
        })
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        conversation: &Conversation,
        context: Option<&KnowledgeEntry>,
    ) -> Result<String, BackendError> {
        let messages = prompt::build_messages(&conversation.messages, context);
        let text = prompt::format_chatml(&messages);
        let sampling = self.sampling;

        let cancelled = Arc::new(AtomicBool::new(false));
        let _guard = CancelOnDrop(cancelled.clone());

        // Candle is CPU-bound; run it off the async executor.
        let state = self.state.clone();
        let output = tokio::task::spawn_blocking(move || {
            let mut guard = state.blocking_lock();
            guard.generate(&text, sampling, &cancelled)
        })
        .await
        .map_err(|e| BackendError::Inference(format!("Inference task failed: {e}")))??;

        Ok(prompt::clean_output(&output))
    }
}
