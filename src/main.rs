use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use text_summarizer::config::{default_config_path, Settings};
use text_summarizer::error::SummarizeError;
use text_summarizer::model::t5::select_device;
use text_summarizer::server::{self, AppState};
use text_summarizer::{hub, input, SummaryRequest, Summarizer, T5Model};

#[derive(Parser, Debug)]
#[command(version, about = "Summarize text with a pretrained T5 model", long_about = None)]
struct Args {
    /// Path to the JSON config file (default: ~/.text-summarizer/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Hugging Face model id, e.g. t5-small or google/flan-t5-base
    #[arg(long, global = true)]
    model: Option<String>,

    /// Directory with config.json, tokenizer.json and model.safetensors
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the web page (default)
    Serve {
        /// Address to listen on
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Summarize text once and print the result
    Summarize(SummarizeArgs),
    /// Download the model files into the cache
    Fetch,
    /// Show or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(ClapArgs, Debug)]
struct SummarizeArgs {
    /// Text to summarize
    #[arg(short, long, conflicts_with = "file")]
    text: Option<String>,

    /// Read the text from a file (.pdf supported); stdin when neither is given
    #[arg(short, long)]
    file: Option<PathBuf>,

    #[arg(long)]
    max_length: Option<usize>,

    /// Sampling temperature, 0.0 to 1.0
    #[arg(long)]
    temperature: Option<f64>,

    /// Number of beams, 1 to 10
    #[arg(long)]
    beams: Option<usize>,

    /// Disable sampling for deterministic output
    #[arg(long)]
    greedy: bool,

    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective settings
    Show,
    /// Write the default settings to the config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(model) = args.model {
        settings.model_id = model;
    }
    if let Some(dir) = args.model_dir {
        settings.model_dir = Some(dir);
    }

    match args.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => serve(settings, bind),
        Command::Summarize(opts) => summarize(settings, opts),
        Command::Fetch => {
            let files = hub::resolve(&settings)?;
            println!("Model files ready:");
            println!("  {}", files.config.display());
            println!("  {}", files.tokenizer.display());
            println!("  {}", files.weights.display());
            Ok(())
        }
        Command::Config { action } => config(&settings, args.config, action),
    }
}

fn load_summarizer(settings: &Settings) -> Result<Summarizer<T5Model>> {
    let files = hub::resolve(settings)?;
    let device = select_device(settings.cpu)?;
    let model = T5Model::load(&files, &settings.model_id, device)
        .with_context(|| format!("Failed to load model {}", settings.model_id))?;
    Ok(Summarizer::new(model, settings.max_input_tokens, settings.seed))
}

fn serve(settings: Settings, bind: Option<String>) -> Result<()> {
    let bind = bind.unwrap_or_else(|| settings.bind.clone());
    // Loaded before the runtime starts: downloads use a blocking client.
    let summarizer = load_summarizer(&settings)?;
    let state = AppState::new(summarizer, settings.generation.clone());

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    runtime.block_on(server::serve(state, &bind))
}

fn summarize(mut settings: Settings, opts: SummarizeArgs) -> Result<()> {
    let text = input::resolve(opts.text, opts.file.as_deref())?;

    let mut request = SummaryRequest::new(text, &settings.generation);
    if let Some(max_length) = opts.max_length {
        request.max_length = max_length;
    }
    if let Some(temperature) = opts.temperature {
        request.temperature = temperature;
    }
    if let Some(beams) = opts.beams {
        request.num_beams = beams;
    }
    if opts.greedy {
        request.do_sample = false;
    }
    if opts.seed.is_some() {
        settings.seed = opts.seed;
    }

    match request.validate() {
        Ok(()) => {}
        Err(SummarizeError::EmptyInput) => {
            eprintln!("Warning: {}", SummarizeError::EmptyInput);
            std::process::exit(1);
        }
        Err(e) => bail!(e),
    }

    let mut summarizer = load_summarizer(&settings)?;
    let response = summarizer.summarize(&request)?;
    println!("{}", response.summary);
    Ok(())
}

fn config(settings: &Settings, path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(settings)?);
        }
        ConfigAction::Init { force } => {
            let path = match path {
                Some(p) => p,
                None => default_config_path()?,
            };
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            let written = Settings::default().save(Some(&path))?;
            println!("Wrote {}", written.display());
        }
    }
    Ok(())
}
