use anyhow::{anyhow, bail, Context, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::config::Settings;

pub const CONFIG_FILE: &str = "config.json";
pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const WEIGHTS_FILE: &str = "model.safetensors";

const DEFAULT_ENDPOINT: &str = "https://huggingface.co";

/// Paths of the three files needed to run a T5 checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

impl ModelFiles {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            config: dir.join(CONFIG_FILE),
            tokenizer: dir.join(TOKENIZER_FILE),
            weights: dir.join(WEIGHTS_FILE),
        }
    }

    fn entries(&self) -> [(&'static str, &Path); 3] {
        [
            (CONFIG_FILE, self.config.as_path()),
            (TOKENIZER_FILE, self.tokenizer.as_path()),
            (WEIGHTS_FILE, self.weights.as_path()),
        ]
    }

    pub fn missing(&self) -> Vec<&'static str> {
        self.entries()
            .into_iter()
            .filter(|(_, path)| !path.exists())
            .map(|(name, _)| name)
            .collect()
    }
}

/// Finds the model files for `settings`, downloading them if needed.
pub fn resolve(settings: &Settings) -> Result<ModelFiles> {
    match &settings.model_dir {
        Some(dir) => local(dir),
        None => fetch(&settings.model_id, &settings.cache_root()?),
    }
}

/// Uses an existing directory as-is. Nothing is downloaded.
pub fn local(dir: &Path) -> Result<ModelFiles> {
    let files = ModelFiles::in_dir(dir);
    let missing = files.missing();
    if !missing.is_empty() {
        bail!(
            "Model directory {} is missing: {}",
            dir.display(),
            missing.join(", ")
        );
    }
    Ok(files)
}

/// Local cache directory for a repo id (`google/flan-t5-base` -> `google--flan-t5-base`).
pub fn repo_dir_name(model_id: &str) -> String {
    model_id.replace('/', "--")
}

pub fn file_url(endpoint: &str, model_id: &str, file: &str) -> String {
    format!(
        "{}/{}/resolve/main/{}",
        endpoint.trim_end_matches('/'),
        model_id,
        file
    )
}

fn endpoint() -> String {
    std::env::var("HF_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string())
}

/// Downloads whatever is not cached yet under `cache_root` and returns the paths.
pub fn fetch(model_id: &str, cache_root: &Path) -> Result<ModelFiles> {
    let dir = cache_root.join(repo_dir_name(model_id));
    let files = ModelFiles::in_dir(&dir);
    let missing = files.missing();
    if missing.is_empty() {
        log::debug!("Model {} found in {}", model_id, dir.display());
        return Ok(files);
    }

    fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let client = reqwest::blocking::Client::builder()
        .timeout(None)
        .build()
        .context("Failed to build HTTP client")?;
    let endpoint = endpoint();

    for name in missing {
        let url = file_url(&endpoint, model_id, name);
        log::info!("Downloading {}", url);
        download(&client, &url, &dir.join(name))?;
    }
    Ok(files)
}

fn download(client: &reqwest::blocking::Client, url: &str, dest: &Path) -> Result<()> {
    let mut response = client
        .get(url)
        .send()
        .with_context(|| format!("Request to {} failed", url))?;
    let status = response.status();
    if !status.is_success() {
        return Err(anyhow!("Download of {} failed with status {}", url, status));
    }

    // Written under a temporary name so an interrupted download is never
    // mistaken for a complete file.
    let partial = dest.with_extension("part");
    let mut file = File::create(&partial)
        .with_context(|| format!("Failed to create {}", partial.display()))?;
    let bytes = response
        .copy_to(&mut file)
        .with_context(|| format!("Failed to save {}", url))?;
    fs::rename(&partial, dest)
        .with_context(|| format!("Failed to move {} into place", partial.display()))?;
    log::info!("Saved {} ({} bytes)", dest.display(), bytes);
    Ok(())
}
