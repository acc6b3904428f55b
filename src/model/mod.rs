//! Boundary to the pretrained encoder-decoder model.

use anyhow::Result;

use crate::request::GenerationParams;

pub mod search;
pub mod t5;

pub use t5::T5Model;

/// What the summarizer needs from a sequence-to-sequence model: text to ids,
/// ids to generated ids, and generated ids back to text.
pub trait Seq2SeqModel: Send {
    /// Tokenizes `prompt`, truncating to at most `max_tokens` ids (end
    /// marker included).
    fn encode(&self, prompt: &str, max_tokens: usize) -> Result<Vec<u32>>;

    fn generate(&mut self, input_ids: &[u32], params: &GenerationParams) -> Result<Vec<u32>>;

    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String>;

    /// Model identifier for logs and the health endpoint.
    fn name(&self) -> &str;
}
