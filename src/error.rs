use thiserror::Error;

/// Message shown to the user when the input is empty or blank.
pub const EMPTY_INPUT_WARNING: &str = "Please enter some text to summarize.";

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("{}", EMPTY_INPUT_WARNING)]
    EmptyInput,

    #[error("temperature {0} is outside 0.0..=1.0")]
    TemperatureOutOfRange(f64),

    #[error("number of beams {0} is outside 1..=10")]
    BeamsOutOfRange(usize),

    #[error("max length must be at least 1, got {0}")]
    InvalidMaxLength(usize),

    /// Anything raised by the model runtime, passed through untouched.
    #[error(transparent)]
    Model(#[from] anyhow::Error),
}

impl SummarizeError {
    /// True for the conditions caused by the request itself rather than the model.
    pub fn is_invalid_request(&self) -> bool {
        !matches!(self, Self::EmptyInput | Self::Model(_))
    }
}
