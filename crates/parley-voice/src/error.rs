//! Error types for voice I/O.

/// Errors from the voice arbiter and its devices.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("voice device is busy")]
    Busy,
    #[error("audio device error: {0}")]
    Device(String),
    #[error("speech synthesis failed: {0}")]
    Synthesis(String),
    #[error("speech recognition failed: {0}")]
    Recognition(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_error_display() {
        assert_eq!(VoiceError::Busy.to_string(), "voice device is busy");
        assert_eq!(
            VoiceError::Device("no microphone".to_string()).to_string(),
            "audio device error: no microphone"
        );
        assert_eq!(
            VoiceError::Synthesis("engine crashed".to_string()).to_string(),
            "speech synthesis failed: engine crashed"
        );
        assert_eq!(
            VoiceError::Recognition("status 500".to_string()).to_string(),
            "speech recognition failed: status 500"
        );
    }
}
