//! # bataa-reader
//!
//! Read Mongolian text aloud through a host speech engine and capture a
//! downloadable recording of the result on a best-effort basis.
//!
//! ## Features
//!
//! - **Voice selection**: ordered preference rules over whatever voices the host exposes
//! - **Playback lifecycle**: an explicit state machine for start/pause/resume/stop
//! - **Recording fallbacks**: microphone, then display/tab audio, then a synthetic tone
//! - **Downloads**: named, revocable audio artifacts
//!
//! The crate does not synthesize speech itself. The embedder implements
//! [`SpeechEngine`] and [`recording::CaptureHost`] on top of the platform and
//! forwards the platform's callbacks into a [`reader::TextReader`].
//!
//! No host exposes a direct tap into its synthesized speech, so recordings are
//! only approximately correlated with what was spoken: microphone and shared
//! tab audio pick up whatever the device plays, and the synthetic tone only
//! matches the estimated length of the text.
//!
//! ## Quick Start
//!
//! ```ignore
//! use bataa_reader::{config::ReaderConfig, playback::SpeechParams, reader::TextReader};
//!
//! let mut reader = TextReader::new(engine, capture, ReaderConfig::default());
//! let session = reader.play("Сайн байна уу", SpeechParams::default())?;
//!
//! // later, from the platform's callbacks:
//! reader.on_engine_event(session, EngineEvent::Start);
//! reader.on_engine_event(session, EngineEvent::End);
//!
//! let artifact = reader.download(std::time::Instant::now())?;
//! std::fs::write(&artifact.suggested_name, &artifact.bytes)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod download;
pub mod error;
pub mod playback;
pub mod reader;
pub mod recording;
pub mod voices;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;

pub use error::{CaptureError, ReaderError};

/// Metadata for a synthesis voice, as exposed by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceDescriptor {
    pub name: String,
    /// BCP 47 style language tag, e.g. `"mn-MN"`.
    pub language_tag: String,
    /// Whether the host flags this voice as its default.
    pub is_default: bool,
}

impl VoiceDescriptor {
    pub fn new(name: impl Into<String>, language_tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language_tag: language_tag.into(),
            is_default: false,
        }
    }

    pub fn with_default(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }
}

/// Identifies one playback session.
///
/// Allocated fresh on every start; platform callbacks carry it back so that
/// callbacks from a superseded session can be discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A fully resolved request handed to the host speech engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub session: SessionId,
    pub text: String,
    pub voice: Option<VoiceDescriptor>,
    /// Language tag the utterance is spoken in.
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

/// Callbacks the host speech engine delivers for an utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Start,
    End,
    Pause,
    Resume,
    /// Synthesis fault, with the platform's reason string.
    Error(String),
}

/// Host speech engine.
///
/// All methods return immediately. Progress is reported later through
/// [`EngineEvent`]s tagged with the utterance's [`SessionId`].
pub trait SpeechEngine {
    /// Queue an utterance for speaking.
    fn speak(&mut self, utterance: &Utterance) -> Result<(), ReaderError>;

    fn pause(&mut self);

    fn resume(&mut self);

    /// Cancel everything the engine is speaking or has queued.
    fn cancel(&mut self);

    /// Enumerate voices currently known to the host.
    ///
    /// May be empty until the host finishes loading its voice list.
    fn list_voices(&self) -> Vec<VoiceDescriptor>;
}
