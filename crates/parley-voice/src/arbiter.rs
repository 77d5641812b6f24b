//! Exclusive ownership of the audio device.
//!
//! Capture and playback share one device. The arbiter tracks which of the
//! two is active and refuses to start one while the other runs.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use parley_core::config::VoiceConfig;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::device::{CaptureDevice, SpeechEvent, SpeechOptions, SpeechRecognizer, SynthesisDevice};
use crate::error::VoiceError;

/// Sent by `stop_listening` to an active capture; the capture answers with
/// the transcript of what was recorded so far.
type CancelRequest = oneshot::Sender<String>;

#[derive(Default)]
struct DeviceState {
    capturing: bool,
    playing: bool,
    /// Bumped by every `speak`, so a superseded call knows not to clear
    /// `playing` on behalf of its successor.
    playback_generation: u64,
    /// Highest generation a stop was requested for.
    stopped_generation: u64,
    cancel_capture: Option<oneshot::Sender<CancelRequest>>,
}

/// Serializes access to the capture and synthesis devices.
pub struct VoiceArbiter {
    capture: Arc<dyn CaptureDevice>,
    recognizer: Arc<dyn SpeechRecognizer>,
    synthesizer: Arc<dyn SynthesisDevice>,
    options: SpeechOptions,
    capture_window: Duration,
    state: Mutex<DeviceState>,
}

impl VoiceArbiter {
    pub fn new(
        capture: Arc<dyn CaptureDevice>,
        recognizer: Arc<dyn SpeechRecognizer>,
        synthesizer: Arc<dyn SynthesisDevice>,
        options: SpeechOptions,
        capture_window: Duration,
    ) -> Self {
        Self {
            capture,
            recognizer,
            synthesizer,
            options,
            capture_window,
            state: Mutex::new(DeviceState::default()),
        }
    }

    /// Build an arbiter using the `[voice]` section for options and window.
    pub fn from_config(
        capture: Arc<dyn CaptureDevice>,
        recognizer: Arc<dyn SpeechRecognizer>,
        synthesizer: Arc<dyn SynthesisDevice>,
        config: &VoiceConfig,
    ) -> Self {
        Self::new(
            capture,
            recognizer,
            synthesizer,
            SpeechOptions::from_config(config),
            Duration::from_secs(config.capture_window_secs),
        )
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_listening(&self) -> bool {
        self.state().capturing
    }

    pub fn is_speaking(&self) -> bool {
        self.state().playing
    }

    pub fn speech_options(&self) -> &SpeechOptions {
        &self.options
    }

    // =========================================================================
    // Capture
    // =========================================================================

    /// Record for the capture window and return the transcript.
    ///
    /// Returns an empty string if [`stop_listening`](Self::stop_listening)
    /// or [`cleanup`](Self::cleanup) ends the capture first.
    pub async fn start_listening(&self) -> Result<String, VoiceError> {
        let mut cancel_rx = {
            let mut state = self.state();
            if state.capturing || state.playing {
                return Err(VoiceError::Busy);
            }
            let (tx, rx) = oneshot::channel();
            state.capturing = true;
            state.cancel_capture = Some(tx);
            rx
        };
        let guard = CaptureGuard { arbiter: self };

        if !self.capture.request_permission().await {
            warn!("Microphone permission denied");
            return Err(VoiceError::Busy);
        }
        self.capture.start().await?;
        info!(window = ?self.capture_window, "Capture started");

        tokio::select! {
            _ = tokio::time::sleep(self.capture_window) => {
                let recording = self.capture.stop().await?;
                drop(guard);
                let transcript = self.recognizer.transcribe(&recording).await;
                discard_recording(&recording).await;
                let transcript = transcript?;
                info!(transcript_len = transcript.len(), "Capture transcribed");
                Ok(transcript)
            }
            cancel = &mut cancel_rx => {
                match cancel {
                    Ok(reply) => {
                        let transcript = match self.capture.stop().await {
                            Ok(recording) => {
                                drop(guard);
                                let transcript = self.transcribe_or_empty(&recording).await;
                                discard_recording(&recording).await;
                                transcript
                            }
                            Err(e) => {
                                warn!(error = %e, "Failed to finalize cancelled capture");
                                String::new()
                            }
                        };
                        info!(transcript_len = transcript.len(), "Capture stopped early");
                        // The caller may have given up waiting; nothing to do then.
                        let _ = reply.send(transcript);
                    }
                    Err(_) => {
                        match self.capture.stop().await {
                            Ok(recording) => discard_recording(&recording).await,
                            Err(e) => debug!(error = %e, "Capture device already stopped"),
                        }
                        info!("Capture abandoned");
                    }
                }
                Ok(String::new())
            }
        }
    }

    /// End an active capture early and return the transcript so far.
    ///
    /// A no-op returning `""` when nothing is being captured.
    pub async fn stop_listening(&self) -> String {
        let cancel = {
            let mut state = self.state();
            if !state.capturing {
                return String::new();
            }
            state.cancel_capture.take()
        };
        let Some(cancel) = cancel else {
            return String::new();
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if cancel.send(reply_tx).is_err() {
            return String::new();
        }
        reply_rx.await.unwrap_or_default()
    }

    async fn transcribe_or_empty(&self, recording: &Path) -> String {
        match self.recognizer.transcribe(recording).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to transcribe partial capture");
                String::new()
            }
        }
    }

    // =========================================================================
    // Playback
    // =========================================================================

    /// Speak `text` until it finishes or is interrupted.
    ///
    /// Replaces any utterance already playing. Interruption by
    /// [`stop_speaking`](Self::stop_speaking) or a newer `speak` is not an
    /// error.
    pub async fn speak(&self, text: &str) -> Result<(), VoiceError> {
        let (generation, interrupted) = {
            let mut state = self.state();
            if state.capturing {
                return Err(VoiceError::Busy);
            }
            let interrupted = state.playing;
            state.playing = true;
            state.playback_generation += 1;
            (state.playback_generation, interrupted)
        };
        let _guard = PlaybackGuard {
            arbiter: self,
            generation,
        };

        if interrupted {
            debug!("Interrupting current utterance");
            if let Err(e) = self.synthesizer.stop().await {
                warn!(error = %e, "Failed to stop previous utterance");
            }
        }

        let (events_tx, mut events) = mpsc::unbounded_channel();
        self.synthesizer
            .speak(text, &self.options, events_tx)
            .await
            .map_err(|e| match e {
                VoiceError::Synthesis(_) => e,
                other => VoiceError::Synthesis(other.to_string()),
            })?;

        // A stop that landed while the device was starting found nothing to
        // kill; the utterance is registered now, so stop it here.
        if self.state().stopped_generation >= generation {
            info!("Playback stopped before it started");
            if let Err(e) = self.synthesizer.stop().await {
                warn!(error = %e, "Failed to stop utterance");
            }
            return Ok(());
        }

        while let Some(event) = events.recv().await {
            match event {
                SpeechEvent::Started => debug!(text_len = text.len(), "Playback started"),
                SpeechEvent::Done => {
                    info!("Playback finished");
                    return Ok(());
                }
                SpeechEvent::Stopped => {
                    info!("Playback interrupted");
                    return Ok(());
                }
                SpeechEvent::Error(message) => return Err(VoiceError::Synthesis(message)),
            }
        }

        Err(VoiceError::Synthesis(
            "speech events ended without completion".to_string(),
        ))
    }

    /// Interrupt playback. A no-op when nothing is playing.
    pub async fn stop_speaking(&self) {
        if !self.request_playback_stop() {
            return;
        }
        if let Err(e) = self.synthesizer.stop().await {
            warn!(error = %e, "Failed to stop playback");
        }
    }

    /// Mark the current utterance as stopped. Returns whether one is playing.
    fn request_playback_stop(&self) -> bool {
        let mut state = self.state();
        if state.playing {
            state.stopped_generation = state.playback_generation;
        }
        state.playing
    }

    /// Voices offered by the synthesizer, or none if it cannot say.
    pub async fn available_voices(&self) -> Vec<String> {
        match self.synthesizer.voices().await {
            Ok(voices) => voices,
            Err(e) => {
                warn!(error = %e, "Failed to list voices");
                Vec::new()
            }
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Stop capture and playback, logging rather than returning failures.
    pub async fn cleanup(&self) {
        let (capturing, cancel) = {
            let mut state = self.state();
            (state.capturing, state.cancel_capture.take())
        };
        let playing = self.request_playback_stop();
        // Dropping the sender abandons an in-flight capture.
        drop(cancel);

        if capturing {
            match self.capture.stop().await {
                Ok(recording) => discard_recording(&recording).await,
                Err(e) => debug!(error = %e, "Capture stop during cleanup failed"),
            }
        }
        if playing {
            if let Err(e) = self.synthesizer.stop().await {
                warn!(error = %e, "Playback stop during cleanup failed");
            }
        }
        info!("Voice resources released");
    }
}

/// Delete a finished recording; it is only needed for transcription.
async fn discard_recording(recording: &Path) {
    if let Err(e) = tokio::fs::remove_file(recording).await {
        debug!(error = %e, path = %recording.display(), "Failed to delete recording");
    }
}

/// Clears `capturing` however the capture ends.
struct CaptureGuard<'a> {
    arbiter: &'a VoiceArbiter,
}

impl Drop for CaptureGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.arbiter.state();
        state.capturing = false;
        state.cancel_capture = None;
    }
}

/// Clears `playing` unless a newer utterance has taken over.
struct PlaybackGuard<'a> {
    arbiter: &'a VoiceArbiter,
    generation: u64,
}

impl Drop for PlaybackGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.arbiter.state();
        if state.playback_generation == self.generation {
            state.playing = false;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
