//! Summarize free-form text with a pretrained T5 model, from the command
//! line or a single-page web UI.

pub mod config;
pub mod error;
pub mod hub;
pub mod input;
pub mod model;
pub mod prompt;
pub mod request;
pub mod server;
pub mod summarizer;

pub use config::{GenerationDefaults, Settings};
pub use error::SummarizeError;
pub use model::{Seq2SeqModel, T5Model};
pub use request::{GenerationParams, SummaryRequest, SummaryResponse};
pub use summarizer::Summarizer;
