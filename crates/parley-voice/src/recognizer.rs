//! Speech recognition through an OpenAI-compatible transcription API.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use parley_core::ParleyConfig;
use serde::Deserialize;
use tracing::{debug, info};

use crate::device::SpeechRecognizer;
use crate::error::VoiceError;

const TRANSCRIPTION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Uploads recordings to `{endpoint}/audio/transcriptions`.
pub struct WhisperHttpRecognizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    /// ISO-639-1 hint, e.g. `en`.
    language: Option<String>,
}

impl WhisperHttpRecognizer {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        language: Option<String>,
    ) -> Result<Self, VoiceError> {
        let client = reqwest::Client::builder()
            .timeout(TRANSCRIPTION_TIMEOUT)
            .build()
            .map_err(|e| VoiceError::Recognition(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            language,
        })
    }

    /// Uses the `[voice]` transcription settings; the key falls back to the
    /// generation key.
    pub fn from_config(config: &ParleyConfig) -> Result<Self, VoiceError> {
        Self::new(
            config.voice.transcription_endpoint.clone(),
            config.transcription_api_key(),
            config.voice.transcription_model.clone(),
            language_hint(&config.voice.language),
        )
    }
}

/// `en-US` -> `en`.
fn language_hint(tag: &str) -> Option<String> {
    let primary = tag.split(['-', '_']).next()?.trim().to_lowercase();
    (primary.len() == 2).then_some(primary)
}

#[async_trait]
impl SpeechRecognizer for WhisperHttpRecognizer {
    async fn transcribe(&self, recording: &Path) -> Result<String, VoiceError> {
        if self.api_key.trim().is_empty() {
            return Err(VoiceError::Recognition(
                "transcription API key is not configured".to_string(),
            ));
        }

        let audio = tokio::fs::read(recording).await.map_err(|e| {
            VoiceError::Recognition(format!("failed to read {}: {}", recording.display(), e))
        })?;
        debug!(bytes = audio.len(), "Uploading recording for transcription");

        let file_name = recording
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_string());
        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(file_name)
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::Recognition(e.to_string()))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.endpoint))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| VoiceError::Recognition(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Recognition(format!(
                "transcription API returned {}: {}",
                status, body
            )));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::Recognition(format!("malformed response: {e}")))?;

        let text = parsed.text.trim().to_string();
        info!(transcript_len = text.len(), "Transcription received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_hint() {
        assert_eq!(language_hint("en-US"), Some("en".to_string()));
        assert_eq!(language_hint("fr_FR"), Some("fr".to_string()));
        assert_eq!(language_hint("de"), Some("de".to_string()));
        assert_eq!(language_hint(""), None);
        assert_eq!(language_hint("cmn-Hans"), None);
    }

    #[test]
    fn test_from_config_falls_back_to_generation_key() {
        let mut config = ParleyConfig::default();
        config.generation.api_key = "sk-gen".to_string();
        let recognizer = WhisperHttpRecognizer::from_config(&config).unwrap();
        assert_eq!(recognizer.api_key, "sk-gen");
        assert_eq!(recognizer.model, "whisper-1");
        assert_eq!(recognizer.language.as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn test_missing_key_is_recognition_error() {
        let recognizer =
            WhisperHttpRecognizer::new("http://127.0.0.1:9/v1", "", "whisper-1", None).unwrap();
        let err = recognizer
            .transcribe(Path::new("/tmp/none.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, VoiceError::Recognition(_)));
    }

    #[tokio::test]
    async fn test_unreadable_recording_is_recognition_error() {
        let recognizer =
            WhisperHttpRecognizer::new("http://127.0.0.1:9/v1", "sk", "whisper-1", None).unwrap();
        let err = recognizer
            .transcribe(Path::new("/nonexistent/parley.wav"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
