use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::t5;
use std::time::Instant;
use tokenizers::Tokenizer;

use super::search::{self, SpecialTokens};
use super::Seq2SeqModel;
use crate::hub::ModelFiles;
use crate::request::GenerationParams;

/// A T5 checkpoint and its tokenizer, loaded once and reused for every request.
pub struct T5Model {
    model: t5::T5ForConditionalGeneration,
    tokenizer: Tokenizer,
    tokens: SpecialTokens,
    device: Device,
    name: String,
}

pub fn select_device(cpu: bool) -> Result<Device> {
    if cpu {
        Ok(Device::Cpu)
    } else {
        Ok(Device::cuda_if_available(0)?)
    }
}

impl T5Model {
    pub fn load(files: &ModelFiles, name: &str, device: Device) -> Result<Self> {
        let started = Instant::now();

        let config = std::fs::read_to_string(&files.config)
            .with_context(|| format!("Failed to read {}", files.config.display()))?;
        let mut config: t5::Config = serde_json::from_str(&config)
            .with_context(|| format!("Failed to parse {}", files.config.display()))?;
        // Beams are re-batched every step, so the decoder sees full sequences.
        config.use_cache = false;

        let tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("Failed to load {}", files.tokenizer.display()))?;

        let weights = [files.weights.clone()];
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&weights, DType::F32, &device)? };
        let model = t5::T5ForConditionalGeneration::load(vb, &config)
            .with_context(|| format!("Failed to load weights from {}", files.weights.display()))?;

        let tokens = SpecialTokens {
            decoder_start: config.decoder_start_token_id.unwrap_or(config.pad_token_id) as u32,
            eos: config.eos_token_id as u32,
        };
        log::info!(
            "Loaded {} on {:?} in {:.1?}",
            name,
            device,
            started.elapsed()
        );

        Ok(Self {
            model,
            tokenizer,
            tokens,
            device,
            name: name.to_string(),
        })
    }
}

impl Seq2SeqModel for T5Model {
    fn encode(&self, prompt: &str, max_tokens: usize) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(prompt, false)
            .map_err(anyhow::Error::msg)?;
        Ok(truncate_with_eos(encoding.get_ids(), max_tokens, self.tokens.eos))
    }

    fn generate(&mut self, input_ids: &[u32], params: &GenerationParams) -> Result<Vec<u32>> {
        let started = Instant::now();
        let input = Tensor::new(input_ids, &self.device)?.unsqueeze(0)?;
        self.model.clear_kv_cache();
        let encoder_output = self.model.encode(&input)?;

        let device = &self.device;
        let model = &mut self.model;
        let output = search::generate(params, self.tokens, |seqs| {
            let batch = seqs.len();
            let len = seqs.first().map(Vec::len).unwrap_or(0);
            let decoder_ids = Tensor::from_vec(seqs.concat(), (batch, len), device)?;
            let encoder_output = if batch == 1 {
                encoder_output.clone()
            } else {
                encoder_output.repeat((batch, 1, 1))?
            };
            let logits = model.decode(&decoder_ids, &encoder_output)?;
            Ok(logits.to_dtype(DType::F32)?.to_vec2::<f32>()?)
        })?;

        log::debug!(
            "Generated {} tokens in {:.1?}",
            output.len().saturating_sub(1),
            started.elapsed()
        );
        Ok(output)
    }

    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        self.tokenizer
            .decode(ids, skip_special_tokens)
            .map_err(anyhow::Error::msg)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Cuts `ids` so that, with the end marker appended, at most `max_tokens` remain.
fn truncate_with_eos(ids: &[u32], max_tokens: usize, eos: u32) -> Vec<u32> {
    let keep = ids.len().min(max_tokens.saturating_sub(1));
    let mut out = Vec::with_capacity(keep + 1);
    out.extend_from_slice(&ids[..keep]);
    out.push(eos);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_input_gets_end_marker() {
        assert_eq!(truncate_with_eos(&[5, 6, 7], 512, 1), vec![5, 6, 7, 1]);
    }

    #[test]
    fn long_input_is_cut_to_budget() {
        let ids: Vec<u32> = (10..1010).collect();
        let out = truncate_with_eos(&ids, 512, 1);
        assert_eq!(out.len(), 512);
        assert_eq!(out[510], 520);
        assert_eq!(out[511], 1);
    }

    #[test]
    fn exact_fit_keeps_room_for_marker() {
        let out = truncate_with_eos(&[4, 5, 6], 3, 1);
        assert_eq!(out, vec![4, 5, 1]);
    }

    #[test]
    fn cpu_is_selected_on_request() {
        assert!(matches!(select_device(true).unwrap(), Device::Cpu));
    }
}
