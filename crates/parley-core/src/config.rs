use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ParleyError, Result};

/// Environment variable holding the search provider key.
pub const SEARCH_API_KEY_ENV: &str = "TAVILY_API_KEY";
/// Environment variable holding the completion provider key.
pub const GENERATION_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Top-level configuration for Parley.
///
/// Loaded from `~/.parley/config.toml` by default. Every section falls back
/// to its defaults, so a partial file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

impl ParleyConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ParleyConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ParleyError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Fill empty API keys from `TAVILY_API_KEY` and `OPENAI_API_KEY`.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Fill empty API keys using `lookup` as the environment.
    ///
    /// Values already present in the file win over the environment.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if self.search.api_key.is_empty() {
            if let Some(key) = non_empty(SEARCH_API_KEY_ENV) {
                self.search.api_key = key.trim().to_string();
            }
        }
        if self.generation.api_key.is_empty() {
            if let Some(key) = non_empty(GENERATION_API_KEY_ENV) {
                self.generation.api_key = key.trim().to_string();
            }
        }
    }

    /// Key used for speech recognition: its own key, or the generation key.
    pub fn transcription_api_key(&self) -> &str {
        if self.voice.transcription_api_key.is_empty() {
            &self.generation.api_key
        } else {
            &self.voice.transcription_api_key
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Web search provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Full URL of the search endpoint.
    pub endpoint: String,
    pub api_key: String,
    /// Upper bound on results per query.
    pub max_results: usize,
    /// Provider search depth: "basic" or "advanced".
    pub search_depth: String,
    /// Per-result content is cut to this many characters before prompting.
    pub max_content_chars: usize,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.tavily.com/search".to_string(),
            api_key: String::new(),
            max_results: 5,
            search_depth: "basic".to_string(),
            max_content_chars: 1200,
            timeout_secs: 15,
        }
    }
}

/// Completion provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Use incremental (streamed) generation.
    pub stream: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4".to_string(),
            max_tokens: 1000,
            temperature: 0.7,
            timeout_secs: 60,
            stream: false,
        }
    }
}

/// Voice capture, recognition, and synthesis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Speak answers aloud. Can be toggled at runtime.
    pub enabled: bool,
    pub language: String,
    pub pitch: f32,
    /// Speech rate relative to normal (1.0).
    pub rate: f32,
    /// Fixed capture window before the recording is finalized.
    pub capture_window_secs: u64,
    /// Recorder program; `{output}` in the args is replaced by the WAV path.
    pub recorder_program: String,
    pub recorder_args: Vec<String>,
    /// Synthesizer program; `{text}`, `{language}`, `{rate_wpm}` and `{pitch}`
    /// in the args are substituted per utterance.
    pub synthesizer_program: String,
    pub synthesizer_args: Vec<String>,
    /// Base URL of an OpenAI-compatible transcription API.
    pub transcription_endpoint: String,
    pub transcription_model: String,
    /// Falls back to `generation.api_key` when empty.
    pub transcription_api_key: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            language: "en-US".to_string(),
            pitch: 1.0,
            rate: 0.8,
            capture_window_secs: 3,
            recorder_program: "arecord".to_string(),
            recorder_args: ["-q", "-f", "S16_LE", "-r", "16000", "-c", "1", "{output}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            synthesizer_program: "espeak-ng".to_string(),
            synthesizer_args: ["-v", "{language}", "-s", "{rate_wpm}", "-p", "{pitch}", "{text}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            transcription_endpoint: "https://api.openai.com/v1".to_string(),
            transcription_model: "whisper-1".to_string(),
            transcription_api_key: String::new(),
        }
    }
}

/// Orchestrator behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Longest accepted query, in characters.
    pub max_input_chars: usize,
    /// How long `Happy` is shown before returning to `Idle`.
    pub happy_hold_ms: u64,
    /// How long `Confused` is shown after a failed turn.
    pub confused_hold_ms: u64,
    /// How long `Confused` is shown after a capture error.
    pub capture_error_hold_ms: u64,
    /// Text of the placeholder message while a query is in flight.
    pub loading_text: String,
    /// Text appended when a turn fails.
    pub apology_text: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_input_chars: 500,
            happy_hold_ms: 2000,
            confused_hold_ms: 3000,
            capture_error_hold_ms: 2000,
            loading_text: "Thinking and searching...".to_string(),
            apology_text: "I apologize, but I encountered an error processing your request. Please try again.".to_string(),
        }
    }
}
