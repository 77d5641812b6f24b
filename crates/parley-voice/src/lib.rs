//! Voice capture, recognition, and playback for Parley.
//!
//! The [`VoiceArbiter`] owns the single audio device and keeps capture and
//! playback mutually exclusive. Devices sit behind the traits in [`device`];
//! [`command`] and [`recognizer`] provide the stock implementations.

pub mod arbiter;
pub mod command;
pub mod device;
pub mod error;
pub mod recognizer;

pub use arbiter::VoiceArbiter;
pub use command::{program_available, CommandRecorder, CommandSynthesizer};
pub use device::{CaptureDevice, SpeechEvent, SpeechOptions, SpeechRecognizer, SynthesisDevice};
pub use error::VoiceError;
pub use recognizer::WhisperHttpRecognizer;
