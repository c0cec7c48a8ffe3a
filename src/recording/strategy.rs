use std::fmt;

use super::{CaptureHost, CaptureStream};
use crate::CaptureError;

/// Which capture method produced a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Microphone,
    DisplayAudio,
    SyntheticTone,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StrategyKind::Microphone => "microphone",
            StrategyKind::DisplayAudio => "display audio",
            StrategyKind::SyntheticTone => "synthetic tone",
        })
    }
}

/// What a successful attempt hands back to the chain.
pub enum Capture {
    /// A live stream that still needs to be recorded and released.
    Live(Box<dyn CaptureStream>),
    /// No device; audio is generated when the session finishes.
    Synthetic,
}

/// One link in the recording fallback chain.
pub trait CaptureStrategy {
    fn kind(&self) -> StrategyKind;

    /// Try to acquire a capture source. An error means "fall through".
    fn attempt(&self, host: &mut dyn CaptureHost) -> Result<Capture, CaptureError>;
}

/// Record from the microphone, picking up whatever the speakers play.
pub struct MicrophoneStrategy;

impl CaptureStrategy for MicrophoneStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Microphone
    }

    fn attempt(&self, host: &mut dyn CaptureHost) -> Result<Capture, CaptureError> {
        let stream = host.request_microphone()?;
        require_audio(stream, CaptureError::DeviceUnavailable("no microphone track".to_string()))
    }
}

/// Record shared screen or tab audio. The user has to tick "share audio".
pub struct DisplayAudioStrategy;

impl CaptureStrategy for DisplayAudioStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DisplayAudio
    }

    fn attempt(&self, host: &mut dyn CaptureHost) -> Result<Capture, CaptureError> {
        let stream = host.request_display_audio()?;
        require_audio(stream, CaptureError::NoAudioTrack)
    }
}

/// Always succeeds; audio is synthesized from the text length.
pub struct SyntheticToneStrategy;

impl CaptureStrategy for SyntheticToneStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SyntheticTone
    }

    fn attempt(&self, _host: &mut dyn CaptureHost) -> Result<Capture, CaptureError> {
        Ok(Capture::Synthetic)
    }
}

/// The default order: microphone, display audio, synthetic tone.
pub fn default_strategies() -> Vec<Box<dyn CaptureStrategy>> {
    vec![
        Box::new(MicrophoneStrategy),
        Box::new(DisplayAudioStrategy),
        Box::new(SyntheticToneStrategy),
    ]
}

/// Reject streams without audio, releasing their tracks first.
fn require_audio(
    mut stream: Box<dyn CaptureStream>,
    missing: CaptureError,
) -> Result<Capture, CaptureError> {
    if stream.audio_track_count() == 0 {
        stream.stop_tracks();
        return Err(missing);
    }
    Ok(Capture::Live(stream))
}
