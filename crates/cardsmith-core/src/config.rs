//! Generator configuration
//!
//! Settings are read once per invocation from `~/.cardsmith/config.toml`.
//! The core never writes configuration; the only persisted state is the
//! "last used local model" preference (see [`crate::store`]).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants;

/// How user-supplied prompt instructions combine with the built-in prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptMode {
    /// Built-in instructions only
    #[default]
    Default,
    /// Built-in instructions followed by the user's custom text
    Append,
    /// User's custom text only, with template variables substituted
    Custom,
}

/// OpenAI-compatible endpoint settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiCompatibleConfig {
    /// Base URL without the `/chat/completions` suffix
    pub base_url: String,
    /// Some local services (Ollama's HTTP API, llama.cpp) need no key
    pub api_key: String,
    pub model_name: String,
}

/// All user-configurable generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Designs per generation (clamped to 1..=10 at invocation time)
    pub number_of_designs: usize,
    pub prompt_mode: PromptMode,
    /// Custom text for append/custom prompt modes
    pub custom_prompt_instructions: String,
    /// Quality mode: per-design requests even for premium hosted models
    pub separate_requests_for_premium: bool,
    /// Skip the summarize step and design straight from the full post
    pub skip_summarization: bool,
    /// Explicit local-runner model, highest priority during resolution
    pub local_model: Option<String>,
    pub openai_compatible: OpenAiCompatibleConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            number_of_designs: constants::generation::DEFAULT_DESIGN_COUNT,
            prompt_mode: PromptMode::Default,
            custom_prompt_instructions: String::new(),
            separate_requests_for_premium: false,
            skip_summarization: false,
            local_model: None,
            openai_compatible: OpenAiCompatibleConfig::default(),
        }
    }
}

impl GeneratorConfig {
    /// Path of the user config file, `~/.cardsmith/config.toml`
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| {
            home.join(constants::fs::CONFIG_DIR_NAME)
                .join("config.toml")
        })
    }

    /// Load from the default location, falling back to defaults when the
    /// file does not exist.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("failed to parse {}", path.display()))
            }
            _ => Ok(Self::default()),
        }
    }

    /// Requested design count bounded to the supported range
    pub fn clamped_design_count(&self) -> usize {
        self.number_of_designs.clamp(
            constants::generation::MIN_DESIGNS,
            constants::generation::MAX_DESIGNS,
        )
    }
}
