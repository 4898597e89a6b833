use crate::error::{HarkError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarkConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub web: WebConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Custom path for the SQLite database. Defaults to `~/.config/hark/timers.db`.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub env_var: Option<String>,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: usize,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            api_key: None,
            base_url: None,
            env_var: None,
            max_tokens: default_llm_max_tokens(),
            temperature: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    #[serde(default = "default_transcription_provider")]
    pub provider: String,
    #[serde(default = "default_transcription_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub env_var: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            provider: default_transcription_provider(),
            model: default_transcription_model(),
            api_key: None,
            base_url: None,
            env_var: None,
            language: default_language(),
        }
    }
}

/// What to do when the model calls a tool with bad arguments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidArgumentPolicy {
    /// Fail the whole command.
    #[default]
    Abort,
    /// Return the validation message to the model as the tool result so it
    /// can correct itself on the next round.
    Report,
}

/// How `POST /command` feeds recorded audio to the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    /// Speech-to-text first, then a text conversation.
    #[default]
    Transcribe,
    /// Attach the audio to the user message directly.
    Audio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    /// Replaces the built-in system prompt when set.
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub invalid_arguments: InvalidArgumentPolicy,
    #[serde(default)]
    pub input_mode: InputMode,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            system_prompt: None,
            invalid_arguments: InvalidArgumentPolicy::default(),
            input_mode: InputMode::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_web_port")]
    pub port: u16,
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: default_web_port(),
            host: default_web_host(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// Valid chat provider names. All of them speak the OpenAI chat-completions
/// wire format with function tools.
pub const VALID_LLM_PROVIDERS: &[&str] = &["openai", "groq", "ollama", "openai-compatible"];

/// Valid speech-to-text provider names.
pub const VALID_TRANSCRIPTION_PROVIDERS: &[&str] = &["openai", "groq", "openai-compatible"];

// -- Defaults --

fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_llm_max_tokens() -> usize {
    512
}
fn default_transcription_provider() -> String {
    "openai".to_string()
}
fn default_transcription_model() -> String {
    "whisper-1".to_string()
}
fn default_language() -> String {
    "en".to_string()
}
fn default_max_rounds() -> u32 {
    8
}
fn default_web_port() -> u16 {
    5285
}
fn default_web_host() -> String {
    "127.0.0.1".to_string()
}
fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}

impl HarkConfig {
    /// Load configuration with layered merge:
    /// 1. ~/.config/hark/config.toml (global)
    /// 2. .hark/config.toml (project)
    /// 3. .hark/config.local.toml (local, gitignored)
    /// 4. `HARK_*` environment variables (`HARK_LLM__MODEL=...`)
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                builder = builder.add_source(File::from(global_path).required(false));
            }
        }

        if let Some(dir) = project_dir {
            let project_config = dir.join(".hark").join("config.toml");
            if project_config.exists() {
                builder = builder.add_source(File::from(project_config).required(false));
            }

            let local_config = dir.join(".hark").join("config.local.toml");
            if local_config.exists() {
                builder = builder.add_source(File::from(local_config).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("HARK")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| HarkError::Config(e.to_string()))?;

        let mut cfg: Self = config
            .try_deserialize()
            .map_err(|e| HarkError::Config(e.to_string()))?;

        cfg.validate();
        Ok(cfg)
    }

    /// Load with defaults only (no files, no environment).
    pub fn default_config() -> Self {
        Self::default()
    }

    /// Render as TOML, e.g. for `hark init`.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| HarkError::Config(e.to_string()))
    }

    /// Validate config values, clamping out-of-range values and logging warnings.
    /// Lenient: bad values are fixed, never rejected.
    pub fn validate(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !VALID_LLM_PROVIDERS.contains(&self.llm.provider.as_str()) {
            warnings.push(format!(
                "unknown LLM provider '{}', valid: {}",
                self.llm.provider,
                VALID_LLM_PROVIDERS.join(", ")
            ));
        }

        if !VALID_TRANSCRIPTION_PROVIDERS.contains(&self.transcription.provider.as_str()) {
            warnings.push(format!(
                "unknown transcription provider '{}', valid: {}",
                self.transcription.provider,
                VALID_TRANSCRIPTION_PROVIDERS.join(", ")
            ));
        }

        if self.llm.max_tokens == 0 {
            warnings.push("llm.max_tokens = 0, setting to 256".to_string());
            self.llm.max_tokens = 256;
        }

        if let Some(t) = self.llm.temperature {
            if !(0.0..=2.0).contains(&t) {
                warnings.push(format!("llm.temperature = {t} out of range [0.0, 2.0], clamping"));
                self.llm.temperature = Some(t.clamp(0.0, 2.0));
            }
        }

        if self.assistant.max_rounds == 0 {
            warnings.push("assistant.max_rounds = 0, setting to 1".to_string());
            self.assistant.max_rounds = 1;
        }

        if self
            .assistant
            .system_prompt
            .as_deref()
            .is_some_and(|p| p.trim().is_empty())
        {
            warnings.push("assistant.system_prompt is blank, using the built-in prompt".to_string());
            self.assistant.system_prompt = None;
        }

        if self.web.max_upload_bytes == 0 {
            warnings.push(format!(
                "web.max_upload_bytes = 0, setting to {}",
                default_max_upload_bytes()
            ));
            self.web.max_upload_bytes = default_max_upload_bytes();
        }

        for w in &warnings {
            tracing::warn!("config: {}", w);
        }

        warnings
    }
}

fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("hark").join("config.toml"))
}
