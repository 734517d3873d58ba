//! Command-line front end.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::GlimpseConfig;
use crate::error::GlimpseError;
use crate::host::{FileCapture, ScreenCapture};
use crate::models::{ModelConfig, ModelSelector};
use crate::types::ImageAttachment;

/// Glimpse: screen-aware streaming chat
#[derive(Parser, Debug)]
#[command(name = "glimpse", version, about = "Streaming chat over OpenAI, Anthropic, Gemini and Groq")]
pub struct Cli {
    /// Config file (defaults to glimpse.toml in the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Chat with a model; starts a REPL when no prompt is given
    Chat(ChatArgs),
}

/// Arguments for `glimpse chat`.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Model selector (provider:model, e.g. anthropic:claude-sonnet-4-5)
    #[arg(short, long, default_value = "openai:gpt-4o")]
    pub model: String,

    /// System prompt (overrides the config file)
    #[arg(short, long)]
    pub system: Option<String>,

    /// Temperature (0.0 - 2.0)
    #[arg(short, long)]
    pub temperature: Option<f64>,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Screenshot to offer with the first turn
    #[arg(short, long)]
    pub image: Option<PathBuf>,

    pub prompt: Option<String>,
}

impl ChatArgs {
    /// Adapter config for the selected model with the CLI overrides applied.
    pub fn model_config(&self, config: &GlimpseConfig) -> Result<ModelConfig, GlimpseError> {
        let (provider, model_id) = ModelSelector::parse(&self.model)?;
        let mut model = config.model_config(provider, model_id)?;
        model.temperature = self.temperature.or(model.temperature);
        model.max_output_tokens = self.max_tokens.or(model.max_output_tokens);
        Ok(model)
    }

    /// Read and encode `--image`, if given.
    pub async fn load_image(&self) -> Result<Option<ImageAttachment>, GlimpseError> {
        match &self.image {
            Some(path) => Ok(Some(FileCapture::new(path).capture_screen().await?.preview)),
            None => Ok(None),
        }
    }
}
