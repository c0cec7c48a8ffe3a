//! Best-effort capture of the audio played during a session.
//!
//! No host exposes a tap into synthesized speech, so the chain tries, in
//! order:
//!
//! | Strategy | Source | Fails with |
//! |---|---|---|
//! | [`MicrophoneStrategy`] | microphone input | `PermissionDenied`, `DeviceUnavailable` |
//! | [`DisplayAudioStrategy`] | shared screen/tab audio | `PermissionDenied`, `NoAudioTrack` |
//! | [`SyntheticToneStrategy`] | generated bells sized to the text | never |
//!
//! Failures are recovered by moving to the next link; they are reported as
//! fallbacks, never as errors. A live capture that yields zero bytes is
//! replaced with the synthetic tone when the session finishes.

pub mod strategy;
pub mod tone;

use std::time::Duration;

use crate::config::ReaderConfig;
use crate::error::ReaderError;
use crate::{CaptureError, SessionId};

pub use strategy::{
    default_strategies, Capture, CaptureStrategy, DisplayAudioStrategy, MicrophoneStrategy,
    StrategyKind, SyntheticToneStrategy,
};
pub use tone::{ToneAudio, ToneGenerator};

/// Container formats tried for live recording, most preferred first.
pub const RECORDER_MIME_TYPES: [&str; 4] = [
    "audio/webm;codecs=opus",
    "audio/webm",
    "audio/mp4",
    "audio/wav",
];

pub const WAV_MIME_TYPE: &str = "audio/wav";

/// A granted capture source. Dropping it does not release the device;
/// call [`stop_tracks`](Self::stop_tracks).
pub trait CaptureStream {
    fn audio_track_count(&self) -> usize;

    /// Begin recording. The host delivers chunks every `timeslice` through
    /// [`RecordingStrategyChain::push_chunk`].
    fn start_recording(&mut self, mime_type: &str, timeslice: Duration) -> Result<(), CaptureError>;

    /// Stop the recorder, returning any bytes not yet delivered as chunks.
    fn stop_recording(&mut self) -> Vec<u8>;

    /// Stop every track so the host drops its capture indicator.
    fn stop_tracks(&mut self);
}

/// Host recording capabilities.
pub trait CaptureHost {
    fn request_microphone(&mut self) -> Result<Box<dyn CaptureStream>, CaptureError>;

    fn request_display_audio(&mut self) -> Result<Box<dyn CaptureStream>, CaptureError>;

    fn is_mime_supported(&self, mime_type: &str) -> bool;
}

/// First recorder format the host supports, `audio/webm` if none.
pub fn preferred_mime_type(host: &dyn CaptureHost) -> &'static str {
    RECORDER_MIME_TYPES
        .into_iter()
        .find(|m| host.is_mime_supported(m))
        .unwrap_or("audio/webm")
}

/// Capture state for one playback session.
///
/// Owns the live stream, if any; the stream's tracks are stopped when the
/// session is finished, cancelled or dropped.
pub struct RecordingSession {
    pub session: SessionId,
    pub strategy: StrategyKind,
    pub chunks: Vec<Vec<u8>>,
    pub mime_type: String,
    text: String,
    stream: Option<Box<dyn CaptureStream>>,
}

impl RecordingSession {
    pub fn recorded_bytes(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// Stop recording and release the device. Safe to call repeatedly.
    fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let trailing = stream.stop_recording();
            if !trailing.is_empty() {
                self.chunks.push(trailing);
            }
            stream.stop_tracks();
            log::debug!("Session {}: released {} capture", self.session, self.strategy);
        }
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.release();
    }
}

/// Finalized audio for a session.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedAudio {
    pub session: SessionId,
    pub strategy: StrategyKind,
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Result of [`RecordingStrategyChain::begin`].
#[derive(Debug, Clone, PartialEq)]
pub struct BeginOutcome {
    pub strategy: StrategyKind,
    /// Strategies that were skipped, with the reason, in the order tried.
    pub fallbacks: Vec<(StrategyKind, CaptureError)>,
}

/// Runs the capture strategies for one session at a time.
pub struct RecordingStrategyChain<H: CaptureHost> {
    host: H,
    strategies: Vec<Box<dyn CaptureStrategy>>,
    tone: ToneGenerator,
    timeslice: Duration,
    active: Option<RecordingSession>,
}

impl<H: CaptureHost> RecordingStrategyChain<H> {
    pub fn new(host: H, config: &ReaderConfig) -> Self {
        Self::with_strategies(host, default_strategies(), config)
    }

    pub fn with_strategies(
        host: H,
        strategies: Vec<Box<dyn CaptureStrategy>>,
        config: &ReaderConfig,
    ) -> Self {
        Self {
            host,
            strategies,
            tone: ToneGenerator::new(config.tone.clone()),
            timeslice: config.recorder_timeslice(),
            active: None,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn active(&self) -> Option<&RecordingSession> {
        self.active.as_ref()
    }

    /// Start capturing for `session`, trying strategies until one succeeds.
    ///
    /// Any capture still running for an older session is released first.
    pub fn begin(&mut self, session: SessionId, text: &str) -> BeginOutcome {
        if let Some(previous) = self.active.take() {
            log::warn!(
                "Session {}: capture still active when {session} began, releasing",
                previous.session
            );
        }

        let mut fallbacks = Vec::new();
        for strategy in &self.strategies {
            let kind = strategy.kind();
            let capture = match strategy.attempt(&mut self.host) {
                Ok(capture) => capture,
                Err(e) => {
                    log::warn!("Session {session}: {kind} capture unavailable: {e}");
                    fallbacks.push((kind, e));
                    continue;
                }
            };

            match Self::start_capture(&self.host, self.timeslice, session, kind, capture, text) {
                Ok(recording) => {
                    log::info!("Session {session}: recording via {kind}");
                    self.active = Some(recording);
                    return BeginOutcome {
                        strategy: kind,
                        fallbacks,
                    };
                }
                Err(e) => {
                    log::warn!("Session {session}: {kind} recorder failed to start: {e}");
                    fallbacks.push((kind, e));
                }
            }
        }

        log::warn!("Session {session}: every strategy failed, using synthetic tone");
        self.active = Some(synthetic_session(session, text));
        BeginOutcome {
            strategy: StrategyKind::SyntheticTone,
            fallbacks,
        }
    }

    /// Buffer a recorder chunk. Chunks for other sessions or with no bytes
    /// are dropped.
    pub fn push_chunk(&mut self, session: SessionId, bytes: Vec<u8>) -> bool {
        match &mut self.active {
            Some(active) if active.session == session && active.stream.is_some() => {
                if bytes.is_empty() {
                    return false;
                }
                active.chunks.push(bytes);
                true
            }
            _ => {
                log::debug!("Dropping {} byte chunk for stale session {session}", bytes.len());
                false
            }
        }
    }

    /// Stop capturing for `session` and return its audio.
    ///
    /// Always yields non-empty bytes: when nothing was captured, or no capture
    /// was ever started for `session`, a synthetic tone sized to `text` is
    /// returned instead.
    pub fn finish(&mut self, session: SessionId, text: &str) -> Result<RecordedAudio, ReaderError> {
        let mut recording = match self.active.take() {
            Some(active) if active.session == session => active,
            other => {
                if let Some(other) = &other {
                    log::warn!(
                        "Session {session}: finishing while capture belongs to {}",
                        other.session
                    );
                }
                self.active = other;
                synthetic_session(session, text)
            }
        };
        recording.release();

        let captured = recording.recorded_bytes();
        if recording.strategy != StrategyKind::SyntheticTone && captured == 0 {
            log::warn!(
                "Session {session}: {} capture produced no audio, using synthetic tone",
                recording.strategy
            );
        }

        if captured == 0 {
            let audio = self.tone.generate(&recording.text);
            log::info!(
                "Session {session}: synthesized {:.1}s placeholder tone",
                audio.duration_secs()
            );
            return Ok(RecordedAudio {
                session,
                strategy: StrategyKind::SyntheticTone,
                bytes: audio.to_wav_bytes()?,
                mime_type: WAV_MIME_TYPE.to_string(),
            });
        }

        let bytes = recording.chunks.concat();
        log::info!(
            "Session {session}: recorded {} bytes ({}) via {}",
            bytes.len(),
            recording.mime_type,
            recording.strategy
        );
        Ok(RecordedAudio {
            session,
            strategy: recording.strategy,
            bytes,
            mime_type: recording.mime_type.clone(),
        })
    }

    /// Abandon the capture for `session` without producing audio.
    pub fn cancel(&mut self, session: SessionId) -> bool {
        match self.active.take() {
            Some(active) if active.session == session => {
                log::info!("Session {session}: capture cancelled");
                drop(active);
                true
            }
            other => {
                self.active = other;
                false
            }
        }
    }

    fn start_capture(
        host: &H,
        timeslice: Duration,
        session: SessionId,
        kind: StrategyKind,
        capture: Capture,
        text: &str,
    ) -> Result<RecordingSession, CaptureError> {
        let mut stream = match capture {
            Capture::Synthetic => return Ok(synthetic_session(session, text)),
            Capture::Live(stream) => stream,
        };

        let mime_type = preferred_mime_type(host);
        if let Err(e) = stream.start_recording(mime_type, timeslice) {
            stream.stop_tracks();
            return Err(e);
        }

        Ok(RecordingSession {
            session,
            strategy: kind,
            chunks: Vec::new(),
            mime_type: mime_type.to_string(),
            text: text.to_string(),
            stream: Some(stream),
        })
    }
}

fn synthetic_session(session: SessionId, text: &str) -> RecordingSession {
    RecordingSession {
        session,
        strategy: StrategyKind::SyntheticTone,
        chunks: Vec::new(),
        mime_type: WAV_MIME_TYPE.to_string(),
        text: text.to_string(),
        stream: None,
    }
}
