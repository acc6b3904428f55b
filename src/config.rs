use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SummarizeError;
use crate::prompt::DEFAULT_MAX_INPUT_TOKENS;
use crate::request::check_ranges;

const APP_DIR: &str = ".text-summarizer";
const CACHE_DIR: &str = "text-summarizer";
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_MODEL_ID: &str = "t5-small";
pub const DEFAULT_BIND: &str = "127.0.0.1:8501";

/// Initial values of the generation controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationDefaults {
    pub max_length: usize,
    pub temperature: f64,
    pub num_beams: usize,
    pub do_sample: bool,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            max_length: 150,
            temperature: 0.7,
            num_beams: 4,
            do_sample: true,
        }
    }
}

impl GenerationDefaults {
    /// Same ranges the sliders enforce on each request.
    pub fn validate(&self) -> Result<(), SummarizeError> {
        check_ranges(self.temperature, self.num_beams, self.max_length)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Hugging Face repo id, e.g. `t5-small` or `google/flan-t5-base`.
    pub model_id: String,
    /// Read model files from here instead of the download cache.
    pub model_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub max_input_tokens: usize,
    pub generation: GenerationDefaults,
    /// Fixed RNG seed for sampling. `None` draws a new seed per request.
    pub seed: Option<u64>,
    pub bind: String,
    /// Stay on the CPU even when a GPU backend is compiled in.
    pub cpu: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            model_dir: None,
            cache_dir: None,
            max_input_tokens: DEFAULT_MAX_INPUT_TOKENS,
            generation: GenerationDefaults::default(),
            seed: None,
            bind: DEFAULT_BIND.to_string(),
            cpu: true,
        }
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let mut path = dirs::home_dir().context("Could not find home directory")?;
    path.push(APP_DIR);
    path.push(CONFIG_FILE);
    Ok(path)
}

impl Settings {
    /// Loads settings from `path` (or the default location). A missing file
    /// yields the defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path()?,
        };
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let settings: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        settings
            .generation
            .validate()
            .with_context(|| format!("Invalid generation defaults in {}", path.display()))?;
        Ok(settings)
    }

    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path()?,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        Ok(path)
    }

    /// Root directory for downloaded model files.
    pub fn cache_root(&self) -> Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => {
                let base = dirs::cache_dir().context("Could not find cache directory")?;
                Ok(base.join(CACHE_DIR))
            }
        }
    }
}
