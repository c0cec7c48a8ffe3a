//! In-crate fakes for the host speech and capture interfaces.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use crate::recording::{CaptureHost, CaptureStream};
use crate::{CaptureError, ReaderError, SpeechEngine, Utterance, VoiceDescriptor};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Speak(Utterance),
    Pause,
    Resume,
    Cancel,
}

#[derive(Default)]
pub struct FakeEngine {
    pub voices: Vec<VoiceDescriptor>,
    pub calls: Vec<EngineCall>,
    pub speak_error: Option<String>,
}

impl FakeEngine {
    pub fn with_voices(voices: Vec<VoiceDescriptor>) -> Self {
        Self {
            voices,
            ..Default::default()
        }
    }

    pub fn spoken(&self) -> Vec<&Utterance> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                EngineCall::Speak(u) => Some(u),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &EngineCall) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }
}

impl SpeechEngine for FakeEngine {
    fn speak(&mut self, utterance: &Utterance) -> Result<(), ReaderError> {
        if let Some(reason) = &self.speak_error {
            return Err(ReaderError::Synthesis(reason.clone()));
        }
        self.calls.push(EngineCall::Speak(utterance.clone()));
        Ok(())
    }

    fn pause(&mut self) {
        self.calls.push(EngineCall::Pause);
    }

    fn resume(&mut self) {
        self.calls.push(EngineCall::Resume);
    }

    fn cancel(&mut self) {
        self.calls.push(EngineCall::Cancel);
    }

    fn list_voices(&self) -> Vec<VoiceDescriptor> {
        self.voices.clone()
    }
}

/// What happened to the streams a [`FakeCapture`] handed out.
#[derive(Debug, Default)]
pub struct StreamLog {
    pub recording_started: Vec<String>,
    pub recording_stopped: usize,
    pub tracks_stopped: usize,
}

/// How a fake capture request should behave.
#[derive(Debug, Clone)]
pub enum Grant {
    Stream { audio_tracks: usize, trailing: Vec<u8> },
    Deny(CaptureError),
}

impl Grant {
    pub fn audio() -> Self {
        Grant::Stream {
            audio_tracks: 1,
            trailing: Vec::new(),
        }
    }

    pub fn denied() -> Self {
        Grant::Deny(CaptureError::PermissionDenied("denied by user".to_string()))
    }
}

pub struct FakeCapture {
    pub microphone: Grant,
    pub display: Grant,
    pub supported: Vec<String>,
    pub requests: Vec<&'static str>,
    pub log: Rc<RefCell<StreamLog>>,
}

impl FakeCapture {
    pub fn new(microphone: Grant, display: Grant) -> Self {
        Self {
            microphone,
            display,
            supported: vec!["audio/webm".to_string()],
            requests: Vec::new(),
            log: Rc::default(),
        }
    }

    pub fn all_denied() -> Self {
        Self::new(Grant::denied(), Grant::denied())
    }

    fn grant(&self, grant: &Grant) -> Result<Box<dyn CaptureStream>, CaptureError> {
        match grant {
            Grant::Stream {
                audio_tracks,
                trailing,
            } => Ok(Box::new(FakeStream {
                audio_tracks: *audio_tracks,
                trailing: trailing.clone(),
                log: Rc::clone(&self.log),
            })),
            Grant::Deny(err) => Err(err.clone()),
        }
    }
}

impl CaptureHost for FakeCapture {
    fn request_microphone(&mut self) -> Result<Box<dyn CaptureStream>, CaptureError> {
        self.requests.push("microphone");
        self.grant(&self.microphone)
    }

    fn request_display_audio(&mut self) -> Result<Box<dyn CaptureStream>, CaptureError> {
        self.requests.push("display");
        self.grant(&self.display)
    }

    fn is_mime_supported(&self, mime_type: &str) -> bool {
        self.supported.iter().any(|m| m == mime_type)
    }
}

struct FakeStream {
    audio_tracks: usize,
    trailing: Vec<u8>,
    log: Rc<RefCell<StreamLog>>,
}

impl CaptureStream for FakeStream {
    fn audio_track_count(&self) -> usize {
        self.audio_tracks
    }

    fn start_recording(
        &mut self,
        mime_type: &str,
        _timeslice: Duration,
    ) -> Result<(), CaptureError> {
        self.log
            .borrow_mut()
            .recording_started
            .push(mime_type.to_string());
        Ok(())
    }

    fn stop_recording(&mut self) -> Vec<u8> {
        self.log.borrow_mut().recording_stopped += 1;
        std::mem::take(&mut self.trailing)
    }

    fn stop_tracks(&mut self) {
        self.log.borrow_mut().tracks_stopped += 1;
    }
}
