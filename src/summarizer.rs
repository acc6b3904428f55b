use anyhow::Result;
use std::time::Instant;

use crate::error::SummarizeError;
use crate::model::Seq2SeqModel;
use crate::prompt::build_prompt;
use crate::request::{GenerationParams, SummaryRequest, SummaryResponse};

/// Owns the loaded model and runs one request at a time against it.
pub struct Summarizer<M> {
    model: M,
    max_input_tokens: usize,
    seed: Option<u64>,
}

impl<M: Seq2SeqModel> Summarizer<M> {
    pub fn new(model: M, max_input_tokens: usize, seed: Option<u64>) -> Self {
        Self {
            model,
            max_input_tokens,
            seed,
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Blank input is refused before the model is touched.
    pub fn summarize(
        &mut self,
        request: &SummaryRequest,
    ) -> Result<SummaryResponse, SummarizeError> {
        request.validate()?;

        let prompt = build_prompt(&request.text);
        let params = request.generation_params(self.seed);
        log::info!(
            "Summarizing {} chars (max_length={}, beams={}, temperature={}, sample={})",
            request.text.len(),
            params.max_length,
            params.num_beams,
            params.temperature,
            params.do_sample
        );

        let started = Instant::now();
        let summary = self.invoke(&prompt, &params)?;
        log::info!(
            "Summary of {} chars ready in {:.1?}",
            summary.len(),
            started.elapsed()
        );
        Ok(SummaryResponse { summary })
    }

    /// Encodes the prompt, runs generation with `params` untouched, and
    /// decodes without special tokens. Model errors are returned as-is.
    pub fn invoke(&mut self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let input_ids = self.model.encode(prompt, self.max_input_tokens)?;
        let output_ids = self.model.generate(&input_ids, params)?;
        self.model.decode(&output_ids, true)
    }
}
