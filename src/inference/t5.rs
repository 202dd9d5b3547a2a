use anyhow::{anyhow, Context, Result};
use candle::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::t5::{Config as T5Config, T5ForConditionalGeneration};
use std::fs;
use tokenizers::Tokenizer;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::hub::ModelFiles;
use super::{GenerationParams, Summarizer};

// T5 activations overflow in half precision.
const DTYPE: DType = DType::F32;

/// Tokenizer + T5 encoder/decoder wrapped into one summarization callable.
pub struct T5Summarizer {
    name: String,
    model: Mutex<T5ForConditionalGeneration>,
    tokenizer: Tokenizer,
    device: Device,
    prefix: String,
    decoder_start: u32,
    eos: u32,
    max_input_tokens: usize,
}

impl T5Summarizer {
    pub fn load(
        name: impl Into<String>,
        files: &ModelFiles,
        device: Device,
        max_input_tokens: usize,
    ) -> Result<Self> {
        let name = name.into();
        info!(model = %name, device = ?device, "loading summarization model");

        // 1) Tokenizer
        let mut tokenizer = Tokenizer::from_file(&files.tokenizer).map_err(|e| {
            anyhow!(
                "Tokenizer load failed ({}): {e}",
                files.tokenizer.display()
            )
        })?;
        tokenizer.with_padding(None);
        let _ = tokenizer.with_truncation(None);

        // 2) Config, plus the raw JSON for task_specific_params
        let raw = fs::read(&files.config)
            .with_context(|| format!("failed to read {}", files.config.display()))?;
        let mut config: T5Config = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", files.config.display()))?;
        config.use_cache = true;
        let raw_json: serde_json::Value = serde_json::from_slice(&raw)?;
        let prefix = summarization_prefix(&raw_json);

        // 3) Weights
        debug!(shards = files.weights.len(), "mapping safetensors");
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&files.weights, DTYPE, &device)? };
        let model = T5ForConditionalGeneration::load(vb, &config)
            .context("failed to build T5 model from weights")?;

        let decoder_start = config
            .decoder_start_token_id
            .unwrap_or(config.pad_token_id) as u32;
        let eos = config.eos_token_id as u32;

        info!(model = %name, prefix = %prefix, "summarization model ready");

        Ok(Self {
            name,
            model: Mutex::new(model),
            tokenizer,
            device,
            prefix,
            decoder_start,
            eos,
            max_input_tokens,
        })
    }

    fn encode_input(&self, text: &str) -> Result<Vec<u32>> {
        let prompt = format!("{}{}", self.prefix, text.trim());
        let enc = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| anyhow!("Tokenizer encode error: {e}"))?;
        let ids = truncate_input(enc.get_ids().to_vec(), self.max_input_tokens, self.eos);
        if ids.is_empty() {
            return Err(anyhow!("input produced no tokens"));
        }
        Ok(ids)
    }

    fn generate(&self, input_ids: &[u32], params: &GenerationParams) -> Result<Vec<u32>> {
        let mut model = self.model.blocking_lock();
        model.clear_kv_cache();

        let input = Tensor::new(input_ids, &self.device)?.unsqueeze(0)?;
        let encoder_output = model.encode(&input)?;

        let output = decode_bounded(self.decoder_start, self.eos, params, |ctx| {
            let decoder_input = Tensor::new(ctx, &self.device)?.unsqueeze(0)?;
            let logits = model.decode(&decoder_input, &encoder_output)?;
            Ok(logits.flatten_all()?.to_dtype(DType::F32)?.to_vec1::<f32>()?)
        });

        model.clear_kv_cache();
        output
    }
}

/// Greedy (or sampled) decoding bounded by `min_length`/`max_length`.
///
/// `step` receives the decoder context (the whole sequence on the first call,
/// the last token afterwards) and returns next-token logits. The returned ids
/// start with `start` and never exceed `max_length`; `eos` is not emitted.
pub fn decode_bounded<F>(
    start: u32,
    eos: u32,
    params: &GenerationParams,
    mut step: F,
) -> Result<Vec<u32>>
where
    F: FnMut(&[u32]) -> Result<Vec<f32>>,
{
    let mut lp = LogitsProcessor::new(params.seed, params.sampling_temperature(), None);
    let mut output = vec![start];

    while output.len() < params.max_length {
        let ctx: &[u32] = if output.len() == 1 {
            &output
        } else {
            std::slice::from_ref(output.last().unwrap_or(&start))
        };

        let mut scores = step(ctx)?;
        if scores.is_empty() {
            return Err(anyhow!("T5: empty logits"));
        }
        if output.len() < params.min_length {
            suppress_token(&mut scores, eos);
        }

        let scores = Tensor::new(scores.as_slice(), &Device::Cpu)?;
        let next = lp.sample(&scores)?;
        if next == eos {
            break;
        }
        output.push(next);
    }

    Ok(output)
}

impl Summarizer for T5Summarizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn summarize(&self, text: &str, params: &GenerationParams) -> Result<String> {
        let input_ids = self.encode_input(text)?;
        debug!(input_tokens = input_ids.len(), "encoding article");

        let output = self.generate(&input_ids, params)?;
        // Skip the decoder start token.
        let generated = &output[1..];
        debug!(output_tokens = generated.len(), "decoded summary");

        let text = self
            .tokenizer
            .decode(generated, true)
            .map_err(|e| anyhow!("T5 decode error: {e}"))?;
        Ok(tidy_summary(&text))
    }
}

/// Task prefix the model was trained with, e.g. `"summarize: "`.
pub fn summarization_prefix(config: &serde_json::Value) -> String {
    config["task_specific_params"]["summarization"]["prefix"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

/// Keeps at most `max_len` ids; a trailing `eos` survives truncation.
pub fn truncate_input(mut ids: Vec<u32>, max_len: usize, eos: u32) -> Vec<u32> {
    if ids.len() <= max_len {
        return ids;
    }
    let ends_with_eos = ids.last() == Some(&eos);
    ids.truncate(max_len);
    if ends_with_eos {
        if let Some(last) = ids.last_mut() {
            *last = eos;
        }
    }
    ids
}

pub fn suppress_token(scores: &mut [f32], token: u32) {
    if let Some(score) = scores.get_mut(token as usize) {
        *score = f32::NEG_INFINITY;
    }
}

fn tidy_summary(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `cpu`, `cuda`, `cuda:N`, `gpu:N` or `auto`.
pub fn parse_device_preference(value: &str) -> Result<Device> {
    let trimmed = value.trim();
    let lower = trimmed.to_ascii_lowercase();
    if lower.is_empty() || lower == "cpu" {
        Ok(Device::Cpu)
    } else if lower == "auto" {
        if candle::utils::cuda_is_available() {
            try_cuda_device(0)
        } else {
            Ok(Device::Cpu)
        }
    } else if lower.starts_with("cuda") || lower.starts_with("gpu") {
        let ordinal = trimmed
            .split(':')
            .nth(1)
            .and_then(|part| part.parse::<usize>().ok())
            .unwrap_or(0);
        try_cuda_device(ordinal)
    } else {
        warn!(
            "unrecognized SUMMARIZER_DEVICE value '{}', defaulting to cpu",
            trimmed
        );
        Ok(Device::Cpu)
    }
}

fn try_cuda_device(ordinal: usize) -> Result<Device> {
    Device::new_cuda(ordinal).map_err(|err| {
        anyhow!(
            "failed to initialize CUDA device {} ({err}). Build with the `cuda` \
             feature and ensure CUDA libraries are available.",
            ordinal
        )
    })
}
