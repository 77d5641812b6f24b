//! Device seams: capture, recognition, and synthesis.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parley_core::config::VoiceConfig;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::VoiceError;

/// How an utterance should sound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechOptions {
    /// BCP-47 language tag, e.g. `en-US`.
    pub language: String,
    pub pitch: f32,
    /// Relative to normal speed (1.0).
    pub rate: f32,
}

impl SpeechOptions {
    pub fn from_config(config: &VoiceConfig) -> Self {
        Self {
            language: config.language.clone(),
            pitch: config.pitch,
            rate: config.rate,
        }
    }
}

impl Default for SpeechOptions {
    fn default() -> Self {
        Self::from_config(&VoiceConfig::default())
    }
}

/// Lifecycle notifications from a synthesis device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    Started,
    /// Playback ran to completion.
    Done,
    /// Playback was interrupted by `stop`.
    Stopped,
    Error(String),
}

impl SpeechEvent {
    /// Whether this event ends the utterance.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SpeechEvent::Started)
    }
}

/// A microphone that records to a file.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Ask for (or check) permission to record. `false` means denied.
    async fn request_permission(&self) -> bool;

    /// Begin recording.
    async fn start(&self) -> Result<(), VoiceError>;

    /// Finish recording and return the location of the audio.
    async fn stop(&self) -> Result<PathBuf, VoiceError>;
}

/// Turns a recording into text.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn transcribe(&self, recording: &Path) -> Result<String, VoiceError>;
}

/// A speaker.
///
/// `speak` returns once playback has begun; progress is reported on
/// `events`, ending with exactly one terminal event.
#[async_trait]
pub trait SynthesisDevice: Send + Sync {
    async fn speak(
        &self,
        text: &str,
        options: &SpeechOptions,
        events: UnboundedSender<SpeechEvent>,
    ) -> Result<(), VoiceError>;

    /// Interrupt the current utterance, if any.
    async fn stop(&self) -> Result<(), VoiceError>;

    /// Names of the voices this device can use.
    async fn voices(&self) -> Result<Vec<String>, VoiceError> {
        Ok(Vec::new())
    }
}
