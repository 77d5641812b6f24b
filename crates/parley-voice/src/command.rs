//! Capture and synthesis devices backed by external programs.
//!
//! The recorder and the synthesizer are plain command lines from the
//! `[voice]` config section, run with `tokio::process`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use parley_core::config::VoiceConfig;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc::UnboundedSender, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::device::{CaptureDevice, SpeechEvent, SpeechOptions, SynthesisDevice};
use crate::error::VoiceError;

/// Words per minute at rate 1.0 (espeak-ng's default speed).
const BASE_WORDS_PER_MINUTE: f32 = 175.0;
/// Synthesizer pitch at 1.0 on espeak-ng's 0-99 scale.
const BASE_PITCH: f32 = 50.0;

/// Whether `program` names an existing file or an executable on `PATH`.
pub fn program_available(program: &str) -> bool {
    let path = Path::new(program);
    if path.components().count() > 1 {
        return path.is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Recorder
// =============================================================================

struct Recording {
    child: Child,
    output: PathBuf,
}

/// Records by running a program that writes audio to `{output}`.
pub struct CommandRecorder {
    program: String,
    args: Vec<String>,
    output_dir: PathBuf,
    active: Mutex<Option<Recording>>,
}

impl CommandRecorder {
    pub fn new(program: impl Into<String>, args: Vec<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            output_dir: output_dir.into(),
            active: Mutex::new(None),
        }
    }

    /// Recorder writing into the system temp directory.
    pub fn from_config(config: &VoiceConfig) -> Self {
        Self::new(
            config.recorder_program.clone(),
            config.recorder_args.clone(),
            std::env::temp_dir(),
        )
    }
}

#[async_trait]
impl CaptureDevice for CommandRecorder {
    async fn request_permission(&self) -> bool {
        let available = program_available(&self.program);
        if !available {
            warn!(program = %self.program, "Recorder program not found");
        }
        available
    }

    async fn start(&self) -> Result<(), VoiceError> {
        let mut active = lock(&self.active);
        if active.is_some() {
            return Err(VoiceError::Device("recording already in progress".to_string()));
        }

        let output = self
            .output_dir
            .join(format!("parley-capture-{}.wav", Uuid::new_v4()));
        let output_str = output.to_string_lossy();
        let args: Vec<String> = self
            .args
            .iter()
            .map(|arg| arg.replace("{output}", &output_str))
            .collect();

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VoiceError::Device(format!("failed to spawn {}: {}", self.program, e)))?;

        debug!(program = %self.program, output = %output.display(), "Recorder started");
        *active = Some(Recording { child, output });
        Ok(())
    }

    async fn stop(&self) -> Result<PathBuf, VoiceError> {
        let recording = lock(&self.active).take();
        let Some(mut recording) = recording else {
            return Err(VoiceError::Device("no recording in progress".to_string()));
        };

        // The recorder may already have exited on its own.
        if let Err(e) = recording.child.kill().await {
            debug!(error = %e, "Recorder already exited");
        }

        if !recording.output.exists() {
            return Err(VoiceError::Device(format!(
                "recorder produced no audio at {}",
                recording.output.display()
            )));
        }
        info!(output = %recording.output.display(), "Recording finalized");
        Ok(recording.output)
    }
}

// =============================================================================
// Synthesizer
// =============================================================================

/// Speaks by running a program once per utterance.
///
/// Arguments may contain `{text}`, `{language}`, `{rate_wpm}` and `{pitch}`.
pub struct CommandSynthesizer {
    program: String,
    args: Vec<String>,
    /// Kill switch for the utterance currently playing.
    current: Mutex<Option<oneshot::Sender<()>>>,
}

impl CommandSynthesizer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            current: Mutex::new(None),
        }
    }

    pub fn from_config(config: &VoiceConfig) -> Self {
        Self::new(
            config.synthesizer_program.clone(),
            config.synthesizer_args.clone(),
        )
    }

    fn render_args(&self, text: &str, options: &SpeechOptions) -> Vec<String> {
        let rate_wpm = (BASE_WORDS_PER_MINUTE * options.rate).round().max(1.0) as u32;
        let pitch = (BASE_PITCH * options.pitch).round().clamp(0.0, 99.0) as u32;
        let language = options.language.to_lowercase();

        self.args
            .iter()
            .map(|arg| {
                arg.replace("{language}", &language)
                    .replace("{rate_wpm}", &rate_wpm.to_string())
                    .replace("{pitch}", &pitch.to_string())
                    .replace("{text}", text)
            })
            .collect()
    }
}

#[async_trait]
impl SynthesisDevice for CommandSynthesizer {
    async fn speak(
        &self,
        text: &str,
        options: &SpeechOptions,
        events: UnboundedSender<SpeechEvent>,
    ) -> Result<(), VoiceError> {
        let mut child = Command::new(&self.program)
            .args(self.render_args(text, options))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VoiceError::Synthesis(format!("failed to spawn {}: {}", self.program, e)))?;

        let (kill_tx, kill_rx) = oneshot::channel();
        if let Some(previous) = lock(&self.current).replace(kill_tx) {
            let _ = previous.send(());
        }
        let _ = events.send(SpeechEvent::Started);

        let program = self.program.clone();
        tokio::spawn(async move {
            let event = tokio::select! {
                status = child.wait() => match status {
                    Ok(status) if status.success() => SpeechEvent::Done,
                    Ok(status) => SpeechEvent::Error(format!("{program} exited with {status}")),
                    Err(e) => SpeechEvent::Error(format!("failed to wait for {program}: {e}")),
                },
                _ = kill_rx => {
                    if let Err(e) = child.kill().await {
                        debug!(error = %e, "Synthesizer already exited");
                    }
                    SpeechEvent::Stopped
                }
            };
            let _ = events.send(event);
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), VoiceError> {
        if let Some(kill) = lock(&self.current).take() {
            let _ = kill.send(());
        }
        Ok(())
    }

    /// Parses `{program} --voices`, espeak-style: one voice per line with the
    /// language in the second column.
    async fn voices(&self) -> Result<Vec<String>, VoiceError> {
        let output = Command::new(&self.program)
            .arg("--voices")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| VoiceError::Synthesis(format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(VoiceError::Synthesis(format!(
                "{} --voices exited with {}",
                self.program, output.status
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .skip(1)
            .filter_map(|line| line.split_whitespace().nth(1).map(str::to_string))
            .collect())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::VoiceArbiter;
    use crate::device::SpeechRecognizer;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    async fn next_terminal(rx: &mut mpsc::UnboundedReceiver<SpeechEvent>) -> SpeechEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for speech event")
                .expect("event channel closed");
            if event.is_terminal() {
                return event;
            }
        }
    }

    #[test]
    fn test_program_available() {
        assert!(program_available("sh"));
        assert!(!program_available("parley-definitely-not-installed"));
        assert!(!program_available("/nonexistent/bin/recorder"));
    }

    #[test]
    fn test_render_args_substitutes_placeholders() {
        let synth = CommandSynthesizer::from_config(&VoiceConfig::default());
        let rendered = synth.render_args("Hello there", &SpeechOptions::default());
        assert_eq!(
            rendered,
            args(&["-v", "en-us", "-s", "140", "-p", "50", "Hello there"])
        );
    }

    #[test]
    fn test_render_args_clamps_pitch() {
        let synth = CommandSynthesizer::new("espeak-ng", args(&["-p", "{pitch}"]));
        let opts = SpeechOptions {
            pitch: 5.0,
            ..SpeechOptions::default()
        };
        assert_eq!(synth.render_args("x", &opts), args(&["-p", "99"]));
    }

    #[tokio::test]
    async fn test_synthesizer_reports_done() {
        let synth = CommandSynthesizer::new("true", Vec::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        synth.speak("hi", &SpeechOptions::default(), tx).await.unwrap();

        assert_eq!(rx.recv().await, Some(SpeechEvent::Started));
        assert_eq!(next_terminal(&mut rx).await, SpeechEvent::Done);
    }

    #[tokio::test]
    async fn test_synthesizer_reports_failure() {
        let synth = CommandSynthesizer::new("false", Vec::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        synth.speak("hi", &SpeechOptions::default(), tx).await.unwrap();

        assert!(matches!(
            next_terminal(&mut rx).await,
            SpeechEvent::Error(_)
        ));
    }

    #[tokio::test]
    async fn test_synthesizer_stop_interrupts() {
        let synth = CommandSynthesizer::new("sleep", args(&["10"]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        synth.speak("hi", &SpeechOptions::default(), tx).await.unwrap();

        synth.stop().await.unwrap();
        assert_eq!(next_terminal(&mut rx).await, SpeechEvent::Stopped);
        // Nothing left to stop
        synth.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_synthesizer_spawn_failure() {
        let synth = CommandSynthesizer::new("parley-definitely-not-installed", Vec::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = synth
            .speak("hi", &SpeechOptions::default(), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, VoiceError::Synthesis(_)));
    }

    #[tokio::test]
    async fn test_recorder_writes_to_output_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = CommandRecorder::new(
            "sh",
            args(&["-c", "printf RIFF > '{output}'; sleep 10"]),
            dir.path(),
        );

        assert!(recorder.request_permission().await);
        recorder.start().await.unwrap();
        // A second start is rejected while recording
        assert!(matches!(
            recorder.start().await,
            Err(VoiceError::Device(_))
        ));

        tokio::time::sleep(Duration::from_millis(200)).await;
        let path = recorder.stop().await.unwrap();
        assert!(path.starts_with(dir.path()));
        assert_eq!(std::fs::read(&path).unwrap(), b"RIFF");
    }

    struct FixedRecognizer(Result<&'static str, &'static str>);

    #[async_trait]
    impl SpeechRecognizer for FixedRecognizer {
        async fn transcribe(&self, recording: &Path) -> Result<String, VoiceError> {
            assert!(recording.exists());
            self.0
                .map(str::to_string)
                .map_err(|e| VoiceError::Recognition(e.to_string()))
        }
    }

    fn recording_arbiter(
        dir: &tempfile::TempDir,
        transcript: Result<&'static str, &'static str>,
        window: Duration,
    ) -> Arc<VoiceArbiter> {
        let recorder = CommandRecorder::new(
            "sh",
            args(&["-c", "printf RIFF > '{output}'; sleep 10"]),
            dir.path(),
        );
        Arc::new(VoiceArbiter::new(
            Arc::new(recorder),
            Arc::new(FixedRecognizer(transcript)),
            Arc::new(CommandSynthesizer::new("true", Vec::new())),
            SpeechOptions::default(),
            window,
        ))
    }

    fn leftover_files(dir: &tempfile::TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[tokio::test]
    async fn test_arbiter_deletes_recordings_after_transcription() {
        let dir = tempfile::tempdir().unwrap();
        let arbiter = recording_arbiter(&dir, Ok("hello"), Duration::from_millis(200));

        for _ in 0..3 {
            assert_eq!(arbiter.start_listening().await.unwrap(), "hello");
        }
        assert_eq!(leftover_files(&dir), 0);
    }

    #[tokio::test]
    async fn test_arbiter_deletes_recording_when_recognition_fails() {
        let dir = tempfile::tempdir().unwrap();
        let arbiter = recording_arbiter(&dir, Err("status 500"), Duration::from_millis(200));

        assert!(matches!(
            arbiter.start_listening().await,
            Err(VoiceError::Recognition(_))
        ));
        assert_eq!(leftover_files(&dir), 0);
    }

    #[tokio::test]
    async fn test_arbiter_deletes_recording_when_stopped_early() {
        let dir = tempfile::tempdir().unwrap();
        let arbiter = recording_arbiter(&dir, Ok("partial"), Duration::from_secs(10));

        let pending = {
            let arbiter = Arc::clone(&arbiter);
            tokio::spawn(async move { arbiter.start_listening().await })
        };
        // Give the recorder time to create its output
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(leftover_files(&dir), 1);

        assert_eq!(arbiter.stop_listening().await, "partial");
        assert_eq!(pending.await.unwrap().unwrap(), "");
        assert_eq!(leftover_files(&dir), 0);
    }

    #[tokio::test]
    async fn test_recorder_stop_without_start() {
        let recorder = CommandRecorder::new("sh", Vec::new(), std::env::temp_dir());
        assert!(matches!(
            recorder.stop().await,
            Err(VoiceError::Device(_))
        ));
    }

    #[tokio::test]
    async fn test_recorder_without_output_is_device_error() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = CommandRecorder::new("sleep", args(&["10"]), dir.path());
        recorder.start().await.unwrap();
        assert!(matches!(
            recorder.stop().await,
            Err(VoiceError::Device(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_recorder_denies_permission() {
        let recorder = CommandRecorder::new(
            "parley-definitely-not-installed",
            Vec::new(),
            std::env::temp_dir(),
        );
        assert!(!recorder.request_permission().await);
    }
}
