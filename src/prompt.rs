/// Task prefix T5 was trained with for summarization.
pub const SUMMARIZE_PREFIX: &str = "summarize: ";

/// Input token budget; longer prompts are cut by the tokenizer.
pub const DEFAULT_MAX_INPUT_TOKENS: usize = 512;

/// Formats raw text into the model's instruction format. The text is taken
/// verbatim; truncation happens at encode time.
pub fn build_prompt(text: &str) -> String {
    format!("{SUMMARIZE_PREFIX}{text}")
}
