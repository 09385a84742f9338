//! Quantized Gemma 3 inference with candle.
//!
//! Each catalog entry points at a `.gguf` file; its `tokenizer.json` lives in
//! the same directory.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::quantized_gemma3::ModelWeights;
use log::{debug, info, warn};
use murmur_session::{Accelerator, BackendError, LoadOptions, ModelBackend};
use tokenizers::Tokenizer;

const TOKENIZER_FILE: &str = "tokenizer.json";

/// Tokens that end a model turn
const STOP_TOKENS: [&str; 2] = ["<end_of_turn>", "<eos>"];

const TEMPERATURE: f64 = 0.8;
const TOP_K: usize = 40;
const REPEAT_PENALTY: f32 = 1.1;
/// How many trailing tokens the repeat penalty looks at
const REPEAT_LAST_N: usize = 64;

/// A loaded model with its tokenizer and sampler
pub struct GemmaHandle {
    model: ModelWeights,
    tokenizer: Tokenizer,
    device: Device,
    stop_tokens: Vec<u32>,
    max_output_tokens: usize,
    sampler: LogitsProcessor,
}

/// [`ModelBackend`] over candle's quantized Gemma 3 implementation
#[derive(Debug, Clone)]
pub struct GgufBackend {
    seed: u64,
}

impl Default for GgufBackend {
    fn default() -> Self {
        Self { seed: 299_792_458 }
    }
}

impl GgufBackend {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

fn init_error(e: impl std::fmt::Display) -> BackendError {
    BackendError::Init(e.to_string())
}

fn inference_error(e: impl std::fmt::Display) -> BackendError {
    BackendError::Inference(e.to_string())
}

/// CUDA when requested and compiled in, CPU otherwise
pub fn select_device(accelerator: Accelerator) -> Device {
    match accelerator {
        Accelerator::Cpu => Device::Cpu,
        Accelerator::Gpu => match Device::cuda_if_available(0) {
            Ok(device) => device,
            Err(e) => {
                warn!("GPU unavailable ({}), falling back to CPU", e);
                Device::Cpu
            }
        },
    }
}

pub fn tokenizer_path(artifact: &Path) -> PathBuf {
    artifact.with_file_name(TOKENIZER_FILE)
}

/// Ids of the turn-ending tokens the tokenizer knows about
pub fn stop_token_ids(tokenizer: &Tokenizer) -> Vec<u32> {
    STOP_TOKENS
        .iter()
        .filter_map(|token| tokenizer.token_to_id(token))
        .collect()
}

impl ModelBackend for GgufBackend {
    type Handle = GemmaHandle;

    fn load(&self, artifact: &Path, options: &LoadOptions) -> Result<GemmaHandle, BackendError> {
        debug!(">>> LOAD START: {}", artifact.display());
        let start = Instant::now();

        if !artifact.is_file() {
            return Err(BackendError::ArtifactMissing(artifact.to_path_buf()));
        }
        let tokenizer_file = tokenizer_path(artifact);
        if !tokenizer_file.is_file() {
            return Err(BackendError::ArtifactMissing(tokenizer_file));
        }

        let device = select_device(options.accelerator);
        debug!("Using device {:?}", device);

        let mut file = File::open(artifact).map_err(init_error)?;
        let content = gguf_file::Content::read(&mut file)
            .map_err(|e| init_error(e.with_path(artifact)))?;
        let model = ModelWeights::from_gguf(content, &mut file, &device).map_err(init_error)?;
        let tokenizer = Tokenizer::from_file(&tokenizer_file).map_err(init_error)?;

        let stop_tokens = stop_token_ids(&tokenizer);
        if stop_tokens.is_empty() {
            warn!("Tokenizer has no turn-ending tokens; generation stops at the token limit");
        }

        info!(
            "Loaded {} in {}ms",
            artifact.display(),
            start.elapsed().as_millis()
        );
        debug!("<<< LOAD COMPLETE");

        Ok(GemmaHandle {
            model,
            tokenizer,
            device,
            stop_tokens,
            max_output_tokens: options.max_output_tokens as usize,
            sampler: LogitsProcessor::from_sampling(
                self.seed,
                Sampling::TopK {
                    k: TOP_K,
                    temperature: TEMPERATURE,
                },
            ),
        })
    }

    fn generate(&self, handle: &mut GemmaHandle, prompt: &str) -> Result<String, BackendError> {
        let encoding = handle
            .tokenizer
            .encode(prompt, true)
            .map_err(inference_error)?;
        let prompt_tokens = encoding.get_ids().to_vec();
        if prompt_tokens.is_empty() {
            return Err(BackendError::Inference("Prompt encoded to no tokens".to_string()));
        }
        debug!("Prompt has {} tokens", prompt_tokens.len());

        let mut all_tokens = prompt_tokens.clone();
        let mut generated: Vec<u32> = Vec::new();

        // Position 0 restarts the KV cache, so each generation is independent
        let mut input = Tensor::new(prompt_tokens.as_slice(), &handle.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(inference_error)?;
        let mut position = 0;

        while generated.len() < handle.max_output_tokens {
            let logits = handle
                .model
                .forward(&input, position)
                .and_then(|l| l.squeeze(0))
                .map_err(inference_error)?;
            position += input.dim(1).map_err(inference_error)?;

            let penalty_start = all_tokens.len().saturating_sub(REPEAT_LAST_N);
            let logits = candle_transformers::utils::apply_repeat_penalty(
                &logits,
                REPEAT_PENALTY,
                &all_tokens[penalty_start..],
            )
            .map_err(inference_error)?;

            let next = handle.sampler.sample(&logits).map_err(inference_error)?;
            if handle.stop_tokens.contains(&next) {
                break;
            }
            generated.push(next);
            all_tokens.push(next);

            input = Tensor::new(&[next], &handle.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(inference_error)?;
        }

        if generated.len() >= handle.max_output_tokens {
            debug!("Generation hit the {} token limit", handle.max_output_tokens);
        }

        let text = handle
            .tokenizer
            .decode(&generated, true)
            .map_err(inference_error)?;
        Ok(text.trim().to_string())
    }

    fn dispose(&self, handle: GemmaHandle) {
        drop(handle);
        debug!("Model handle released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKENIZER_JSON: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": null,
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": { "<unk>": 0, "<eos>": 1, "<end_of_turn>": 2, "hello": 3 },
            "unk_token": "<unk>"
        }
    }"#;

    #[test]
    fn test_tokenizer_path_is_sibling() {
        assert_eq!(
            tokenizer_path(Path::new("/res/models/gemma-3-1b-it/gemma-3-1b-it-q4_0.gguf")),
            PathBuf::from("/res/models/gemma-3-1b-it/tokenizer.json")
        );
    }

    #[test]
    fn test_stop_token_ids() {
        let tokenizer = Tokenizer::from_bytes(TOKENIZER_JSON.as_bytes()).unwrap();
        assert_eq!(stop_token_ids(&tokenizer), vec![2, 1]);
    }

    #[test]
    fn test_cpu_preference_is_honoured() {
        assert!(matches!(select_device(Accelerator::Cpu), Device::Cpu));
    }

    #[test]
    fn test_load_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("model.gguf");
        let backend = GgufBackend::default();
        let options = LoadOptions::default();

        let err = backend.load(&artifact, &options).err().unwrap();
        assert!(
            matches!(err, BackendError::ArtifactMissing(ref p) if p == &artifact),
            "{:?}",
            err
        );

        // Weights present, tokenizer missing
        std::fs::write(&artifact, b"not a gguf").unwrap();
        let err = backend.load(&artifact, &options).err().unwrap();
        assert!(
            matches!(err, BackendError::ArtifactMissing(ref p) if p.ends_with(TOKENIZER_FILE)),
            "{:?}",
            err
        );

        // Both present but the weights are garbage
        std::fs::write(dir.path().join(TOKENIZER_FILE), TOKENIZER_JSON).unwrap();
        let err = backend.load(&artifact, &options).err().unwrap();
        assert!(matches!(err, BackendError::Init(_)), "{:?}", err);
    }
}
