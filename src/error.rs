/// Reasons a capture strategy can refuse to start.
///
/// These never reach the user as hard failures: the recording chain treats
/// each one as "try the next strategy".
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("Shared stream carries no audio track")]
    NoAudioTrack,
}

#[derive(thiserror::Error, Debug)]
pub enum ReaderError {
    #[error("No text to read. Enter some text first.")]
    EmptyInput,
    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),
    #[error("Nothing to download. Play some text to produce a recording first.")]
    NoArtifact,
    #[error("Audio capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("WAV encoding error: {0}")]
    Wav(#[from] hound::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
}
