//! Local ONNX Runtime text generation.
//!
//! Implements [`TextGenerator`] over a decoder-only causal LM exported to ONNX
//! without KV-cache inputs (`input_ids`, `attention_mask` → `logits`). Decoding is
//! greedy, so the same prompt on the same model always yields the same text.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::{GenerateParams, Generation, TextGenerator};
use crate::config::InferenceConfig;

/// Prompts are truncated to this many tokens before decoding.
const MAX_PROMPT_TOKENS: usize = 512;

/// End-of-sequence markers used by common chat models.
const EOS_CANDIDATES: &[&str] = &["<|im_end|>", "<|endoftext|>", "<|eot_id|>", "</s>", "<eos>"];

/// Model file inside the model directory for a quantization setting.
pub fn model_file_name(quantization: &str) -> Result<&'static str> {
    match quantization {
        "float32" | "fp32" => Ok("model.onnx"),
        "int8" => Ok("model_int8.onnx"),
        "int4" => Ok("model_q4.onnx"),
        other => anyhow::bail!("unsupported quantization: {other}. Supported: int4, int8, float32"),
    }
}

/// Directory holding the model files for the configured model.
pub fn model_dir(config: &InferenceConfig) -> PathBuf {
    crate::config::expand_tilde(&config.model_dir).join(config.model.replace('/', "--"))
}

pub struct OnnxGenerator {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    eos_ids: Vec<u32>,
    name: String,
}

// Safety: Tokenizer is Send+Sync. Session is behind a Mutex.
// The Mutex guarantees exclusive access during run().
unsafe impl Send for OnnxGenerator {}
unsafe impl Sync for OnnxGenerator {}

impl OnnxGenerator {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        anyhow::ensure!(
            config.device == "cpu",
            "unsupported device for local inference: {}. Supported: cpu",
            config.device
        );

        let dir = model_dir(config);
        let model_path = dir.join(model_file_name(&config.quantization)?);
        let tokenizer_path = dir.join("tokenizer.json");

        anyhow::ensure!(
            model_path.exists(),
            "ONNX model not found at {}. Run `sentiment-space model download` first.",
            model_path.display()
        );
        anyhow::ensure!(
            tokenizer_path.exists(),
            "Tokenizer not found at {}. Run `sentiment-space model download` first.",
            tokenizer_path.display()
        );

        let session = Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(&model_path)
            .context("failed to load ONNX model")?;

        tracing::info!(model = %model_path.display(), "ONNX model loaded");

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_PROMPT_TOKENS,
                direction: tokenizers::TruncationDirection::Left,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to set truncation: {e}"))?;

        let eos_ids: Vec<u32> = EOS_CANDIDATES
            .iter()
            .filter_map(|t| tokenizer.token_to_id(t))
            .collect();
        anyhow::ensure!(!eos_ids.is_empty(), "tokenizer defines no end-of-sequence token");

        tracing::info!(tokenizer = %tokenizer_path.display(), eos = ?eos_ids, "tokenizer loaded");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            eos_ids,
            name: format!("onnx:{}:{}", config.model, config.quantization),
        })
    }

    /// Run the graph over `ids` and return the logits row for the last position.
    fn next_token_logits(&self, ids: &[i64]) -> Result<Vec<f32>> {
        let seq_len = ids.len();
        let shape = vec![1i64, seq_len as i64];
        let input_ids = Tensor::from_array((shape.clone(), ids.to_vec().into_boxed_slice()))?;
        let attention_mask = Tensor::from_array((shape, vec![1i64; seq_len].into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("session lock poisoned: {e}"))?;

        let outputs = session.run(ort::inputs! {
            "input_ids" => input_ids,
            "attention_mask" => attention_mask,
        })?;

        let logits_value = outputs.get("logits").unwrap_or_else(|| &outputs[0]);
        let (shape, data) = logits_value
            .try_extract_tensor::<f32>()
            .context("failed to extract logits tensor")?;

        let dims: &[i64] = &shape;
        anyhow::ensure!(
            dims.len() == 3 && dims[1] as usize == seq_len,
            "unexpected logits shape: {dims:?}, expected [1, {seq_len}, vocab]"
        );
        let vocab = dims[2] as usize;
        let offset = (seq_len - 1) * vocab;
        Ok(data[offset..offset + vocab].to_vec())
    }
}

impl TextGenerator for OnnxGenerator {
    /// Greedy decoding; `params.temperature` has no effect here.
    fn generate(&self, prompt: &str, params: &GenerateParams) -> Result<Generation> {
        let max_tokens = params.max_tokens;
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| anyhow::anyhow!("tokenization failed: {e}"))?;
        let mut ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        anyhow::ensure!(!ids.is_empty(), "prompt produced no tokens");

        let mut generated: Vec<u32> = Vec::with_capacity(max_tokens);
        let mut log_prob_sum = 0.0f64;

        for _ in 0..max_tokens {
            let logits = self.next_token_logits(&ids)?;
            let (token, prob) = greedy_pick(&logits)?;
            if self.eos_ids.contains(&token) {
                break;
            }
            log_prob_sum += f64::from(prob.max(f32::MIN_POSITIVE)).ln();
            generated.push(token);
            ids.push(token as i64);
        }

        let text = self
            .tokenizer
            .decode(&generated, true)
            .map_err(|e| anyhow::anyhow!("detokenization failed: {e}"))?;

        Ok(Generation {
            text: text.trim().to_string(),
            likelihood: geometric_mean(log_prob_sum, generated.len()),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Pick the arg-max token and its softmax probability.
fn greedy_pick(logits: &[f32]) -> Result<(u32, f32)> {
    let (best, &best_logit) = logits
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .ok_or_else(|| anyhow::anyhow!("empty logits"))?;

    // Softmax denominator relative to the max for numerical stability.
    let denom: f32 = logits.iter().map(|&l| (l - best_logit).exp()).sum();
    Ok((best as u32, 1.0 / denom))
}

/// Per-token likelihood of the generated sequence: exp(mean log-prob).
fn geometric_mean(log_prob_sum: f64, tokens: usize) -> Option<f32> {
    if tokens == 0 {
        return None;
    }
    Some((log_prob_sum / tokens as f64).exp() as f32)
}
