use serde::{Deserialize, Serialize};

use crate::config::GenerationDefaults;
use crate::error::SummarizeError;

pub const MIN_TEMPERATURE: f64 = 0.0;
pub const MAX_TEMPERATURE: f64 = 1.0;
pub const MIN_BEAMS: usize = 1;
pub const MAX_BEAMS: usize = 10;

/// One summarization request, built fresh for every submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRequest {
    pub text: String,
    pub max_length: usize,
    pub temperature: f64,
    pub num_beams: usize,
    pub do_sample: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub summary: String,
}

/// Parameters handed to the model's generation routine as-is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    /// Upper bound on the decoder sequence, start token included.
    pub max_length: usize,
    pub temperature: f64,
    pub num_beams: usize,
    pub do_sample: bool,
    pub seed: Option<u64>,
}

impl SummaryRequest {
    pub fn new(text: impl Into<String>, defaults: &GenerationDefaults) -> Self {
        Self {
            text: text.into(),
            max_length: defaults.max_length,
            temperature: defaults.temperature,
            num_beams: defaults.num_beams,
            do_sample: defaults.do_sample,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Checks the request before anything reaches the model. Blank text is
    /// reported first so the user sees the warning even with bad sliders.
    pub fn validate(&self) -> Result<(), SummarizeError> {
        if self.is_blank() {
            return Err(SummarizeError::EmptyInput);
        }
        check_ranges(self.temperature, self.num_beams, self.max_length)
    }

    pub fn generation_params(&self, seed: Option<u64>) -> GenerationParams {
        GenerationParams {
            max_length: self.max_length,
            temperature: self.temperature,
            num_beams: self.num_beams,
            do_sample: self.do_sample,
            seed,
        }
    }
}

/// Range checks shared by requests and the configured defaults.
pub(crate) fn check_ranges(
    temperature: f64,
    num_beams: usize,
    max_length: usize,
) -> Result<(), SummarizeError> {
    if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&temperature) {
        return Err(SummarizeError::TemperatureOutOfRange(temperature));
    }
    if !(MIN_BEAMS..=MAX_BEAMS).contains(&num_beams) {
        return Err(SummarizeError::BeamsOutOfRange(num_beams));
    }
    if max_length == 0 {
        return Err(SummarizeError::InvalidMaxLength(max_length));
    }
    Ok(())
}
