use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::config::ReaderConfig;
use crate::download::{ArtifactHandle, DownloadArtifact, DownloadPackager};
use crate::playback::{
    PlaybackController, PlaybackEvent, PlaybackEventKind, PlaybackState, SpeechParams,
};
use crate::recording::{CaptureHost, RecordedAudio, RecordingStrategyChain, StrategyKind};
use crate::{CaptureError, EngineEvent, ReaderError, SessionId, SpeechEngine, VoiceDescriptor};

/// Notifications for the UI surface, in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderEvent {
    Playback(PlaybackEvent),
    RecordingStarted {
        session: SessionId,
        strategy: StrategyKind,
    },
    /// A capture strategy was unavailable and the next one was tried.
    RecordingFallback {
        session: SessionId,
        strategy: StrategyKind,
        reason: CaptureError,
    },
    /// A download is available for `session`.
    RecordingReady {
        session: SessionId,
        strategy: StrategyKind,
        mime_type: String,
        size: usize,
    },
    RecordingFailed {
        session: SessionId,
        reason: String,
    },
}

/// Keyboard chords bound to reader operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    /// Primary modifier + Enter.
    Play,
    /// Primary modifier + Space.
    TogglePause,
    /// Primary modifier + Escape.
    Stop,
}

impl Shortcut {
    /// Map a key name pressed together with the primary modifier
    /// (Ctrl, or Cmd on macOS) to a shortcut.
    pub fn from_key(key: &str, primary_modifier: bool) -> Option<Self> {
        if !primary_modifier {
            return None;
        }
        match key.to_ascii_lowercase().as_str() {
            "enter" => Some(Shortcut::Play),
            " " | "space" => Some(Shortcut::TogglePause),
            "escape" | "esc" => Some(Shortcut::Stop),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct FinishedRecording {
    text: String,
    audio: RecordedAudio,
}

/// Reads text aloud and keeps a downloadable recording of the last session.
///
/// Owns the playback controller, the recording chain and the download
/// packager. Every operation and every host callback drains the
/// controller's notifications and forwards them to the recording chain
/// before returning, so recording always follows playback:
///
/// | Playback | Recording |
/// |---|---|
/// | `Started` | strategies tried, capture begins |
/// | `Ended` | capture finished, download ready |
/// | `Stopped`, `Error` | capture finished if one began |
pub struct TextReader<E: SpeechEngine, H: CaptureHost> {
    playback: PlaybackController<E>,
    recorder: RecordingStrategyChain<H>,
    packager: DownloadPackager,
    recording: Option<FinishedRecording>,
    events: Vec<ReaderEvent>,
}

impl<E: SpeechEngine, H: CaptureHost> TextReader<E, H> {
    pub fn new(engine: E, capture: H, config: ReaderConfig) -> Self {
        Self {
            playback: PlaybackController::new(engine, &config),
            recorder: RecordingStrategyChain::new(capture, &config),
            packager: DownloadPackager::new(&config),
            recording: None,
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.playback.state()
    }

    pub fn playback(&self) -> &PlaybackController<E> {
        &self.playback
    }

    pub fn recorder(&self) -> &RecordingStrategyChain<H> {
        &self.recorder
    }

    pub fn packager(&self) -> &DownloadPackager {
        &self.packager
    }

    /// Audio of the last finished session, if any.
    pub fn recording(&self) -> Option<&RecordedAudio> {
        self.recording.as_ref().map(|r| &r.audio)
    }

    /// Whether [`download`](Self::download) would currently succeed.
    pub fn can_download(&self) -> bool {
        self.recording.is_some() && !self.playback.state().is_active()
    }

    /// Re-run voice selection after the host's voice list changed.
    pub fn voices_changed(&mut self) -> Option<&VoiceDescriptor> {
        self.playback.voices_changed()
    }

    /// Speak `text`, or resume if paused.
    ///
    /// A new session cancels the live one and its capture first, and
    /// disables downloads until the new session finishes.
    pub fn play(&mut self, text: &str, params: SpeechParams) -> Result<SessionId, ReaderError> {
        if text.trim().is_empty() {
            return Err(ReaderError::EmptyInput);
        }

        if self.playback.state() != PlaybackState::Paused {
            if let Some(live) = self.playback.session().map(|s| s.id) {
                self.recorder.cancel(live);
            }
            self.recording = None;
        }

        let result = self.playback.start(text, params);
        self.pump();
        result
    }

    pub fn pause(&mut self) -> bool {
        let changed = self.playback.pause();
        self.pump();
        changed
    }

    pub fn resume(&mut self) -> bool {
        let changed = self.playback.resume();
        self.pump();
        changed
    }

    /// Pause while speaking, resume while paused, otherwise start `text`.
    pub fn toggle(&mut self, text: &str, params: SpeechParams) -> Result<(), ReaderError> {
        match self.playback.state() {
            PlaybackState::Speaking => {
                self.pause();
            }
            PlaybackState::Paused => {
                self.resume();
            }
            _ => {
                self.play(text, params)?;
            }
        }
        Ok(())
    }

    /// Stop the live session. The audio captured so far becomes the download.
    pub fn stop(&mut self) -> bool {
        let changed = self.playback.stop();
        self.pump();
        changed
    }

    /// Stop everything and drop the prepared recording and downloads.
    pub fn clear(&mut self) {
        if let Some(live) = self.playback.session().map(|s| s.id) {
            self.recorder.cancel(live);
        }
        self.stop();
        self.recording = None;
        let released = self.packager.release_all();
        log::info!("Cleared reader, released {released} download handle(s)");
    }

    /// Finish the live capture early while playback continues.
    pub fn stop_recording(&mut self) -> bool {
        let live = match self.playback.session() {
            Some(s) => (s.id, s.text.clone()),
            None => return false,
        };
        if self.recorder.active().map(|a| a.session) != Some(live.0) {
            return false;
        }
        self.finish_recording(live.0, &live.1);
        true
    }

    pub fn apply_shortcut(
        &mut self,
        shortcut: Shortcut,
        text: &str,
        params: SpeechParams,
    ) -> Result<(), ReaderError> {
        match shortcut {
            Shortcut::Play => self.play(text, params).map(|_| ()),
            Shortcut::TogglePause => self.toggle(text, params),
            Shortcut::Stop => {
                self.stop();
                Ok(())
            }
        }
    }

    /// Forward a host speech engine callback.
    pub fn on_engine_event(&mut self, session: SessionId, event: EngineEvent) -> bool {
        let changed = self.playback.on_engine_event(session, event);
        self.pump();
        changed
    }

    /// Forward a recorder chunk from the host.
    pub fn on_chunk(&mut self, session: SessionId, bytes: Vec<u8>) -> bool {
        self.recorder.push_chunk(session, bytes)
    }

    /// Package the last recording for saving, named with the current time.
    pub fn download(&mut self, now: Instant) -> Result<DownloadArtifact, ReaderError> {
        self.download_at(Utc::now(), now)
    }

    pub fn download_at(
        &mut self,
        timestamp: DateTime<Utc>,
        now: Instant,
    ) -> Result<DownloadArtifact, ReaderError> {
        if self.playback.state().is_active() {
            log::warn!("Download requested while a session is playing");
            return Err(ReaderError::NoArtifact);
        }
        let recording = self.recording.as_ref().ok_or(ReaderError::NoArtifact)?;
        self.packager.prepare_at(
            recording.audio.bytes.clone(),
            &recording.audio.mime_type,
            &recording.text,
            timestamp,
            now,
        )
    }

    /// Release download handles whose delay elapsed.
    pub fn release_expired(&mut self, now: Instant) -> Vec<ArtifactHandle> {
        self.packager.release_expired(now)
    }

    pub fn release(&mut self, handle: ArtifactHandle) -> bool {
        self.packager.release(handle)
    }

    /// Drain notifications for the UI.
    pub fn take_events(&mut self) -> Vec<ReaderEvent> {
        std::mem::take(&mut self.events)
    }

    fn pump(&mut self) {
        for event in self.playback.take_events() {
            let session = event.session;
            let text = event.text.clone();
            let kind = event.kind.clone();
            self.events.push(ReaderEvent::Playback(event));

            match kind {
                PlaybackEventKind::Started => self.begin_recording(session, &text),
                PlaybackEventKind::Ended => self.finish_recording(session, &text),
                PlaybackEventKind::Stopped | PlaybackEventKind::Error(_) => {
                    if self.recorder.active().map(|a| a.session) == Some(session) {
                        self.finish_recording(session, &text);
                    }
                }
                PlaybackEventKind::Paused | PlaybackEventKind::Resumed => {}
            }
        }
    }

    fn begin_recording(&mut self, session: SessionId, text: &str) {
        let outcome = self.recorder.begin(session, text);
        for (strategy, reason) in outcome.fallbacks {
            self.events.push(ReaderEvent::RecordingFallback {
                session,
                strategy,
                reason,
            });
        }
        self.events.push(ReaderEvent::RecordingStarted {
            session,
            strategy: outcome.strategy,
        });
    }

    fn finish_recording(&mut self, session: SessionId, text: &str) {
        if self.recording.as_ref().map(|r| r.audio.session) == Some(session) {
            return;
        }

        match self.recorder.finish(session, text) {
            Ok(audio) => {
                self.events.push(ReaderEvent::RecordingReady {
                    session,
                    strategy: audio.strategy,
                    mime_type: audio.mime_type.clone(),
                    size: audio.bytes.len(),
                });
                self.recording = Some(FinishedRecording {
                    text: text.to_string(),
                    audio,
                });
            }
            Err(e) => {
                log::error!("Session {session}: failed to finalize recording: {e}");
                self.events.push(ReaderEvent::RecordingFailed {
                    session,
                    reason: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;

    use super::*;
    use crate::testing::{EngineCall, FakeCapture, FakeEngine, Grant};

    type Reader = TextReader<FakeEngine, FakeCapture>;

    fn reader(capture: FakeCapture) -> Reader {
        let engine = FakeEngine::with_voices(vec![
            VoiceDescriptor::new("Microsoft Zira", "en-US").with_default(true),
            VoiceDescriptor::new("Google Bataa", "mn-MN"),
        ]);
        TextReader::new(engine, capture, ReaderConfig::default())
    }

    fn stamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap()
    }

    fn playback_kinds(events: &[ReaderEvent]) -> Vec<PlaybackEventKind> {
        events
            .iter()
            .filter_map(|e| match e {
                ReaderEvent::Playback(p) => Some(p.kind.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn denied_capture_falls_through_to_tone_download() {
        let mut r = reader(FakeCapture::new(
            Grant::denied(),
            Grant::Stream {
                audio_tracks: 0,
                trailing: Vec::new(),
            },
        ));

        let session = r.play("Сайн байна уу", SpeechParams::default()).unwrap();
        assert_eq!(r.state(), PlaybackState::Speaking);
        assert!(!r.can_download());

        assert!(r.on_engine_event(session, EngineEvent::Start));
        let events = r.take_events();
        assert_eq!(
            events,
            vec![
                ReaderEvent::Playback(PlaybackEvent {
                    session,
                    text: "Сайн байна уу".to_string(),
                    kind: PlaybackEventKind::Started,
                }),
                ReaderEvent::RecordingFallback {
                    session,
                    strategy: StrategyKind::Microphone,
                    reason: CaptureError::PermissionDenied("denied by user".to_string()),
                },
                ReaderEvent::RecordingFallback {
                    session,
                    strategy: StrategyKind::DisplayAudio,
                    reason: CaptureError::NoAudioTrack,
                },
                ReaderEvent::RecordingStarted {
                    session,
                    strategy: StrategyKind::SyntheticTone,
                },
            ]
        );
        assert!(matches!(r.download_at(stamp(), Instant::now()), Err(ReaderError::NoArtifact)));

        assert!(r.on_engine_event(session, EngineEvent::End));
        assert_eq!(r.state(), PlaybackState::Ended);
        let recording = r.recording().unwrap();
        assert_eq!(recording.mime_type, "audio/wav");
        assert!(!recording.bytes.is_empty());

        let artifact = r.download_at(stamp(), Instant::now()).unwrap();
        assert_eq!(artifact.suggested_name, "bataa-Сайнбайнауу-20261018T093000.wav");
        assert_eq!(artifact.mime_type, "audio/wav");
        assert_eq!(&artifact.bytes[0..4], b"RIFF");
    }

    #[test]
    fn empty_input_makes_no_engine_call() {
        let mut r = reader(FakeCapture::all_denied());
        assert!(matches!(r.play("", SpeechParams::default()), Err(ReaderError::EmptyInput)));
        assert!(matches!(r.play("  \t", SpeechParams::default()), Err(ReaderError::EmptyInput)));
        assert_eq!(r.state(), PlaybackState::Idle);
        assert!(r.playback().engine().calls.is_empty());
        assert!(r.take_events().is_empty());
    }

    #[test]
    fn microphone_recording_becomes_download() {
        let mut r = reader(FakeCapture::new(Grant::audio(), Grant::denied()));
        let session = r.play("Монгол хэл", SpeechParams::default()).unwrap();
        r.on_engine_event(session, EngineEvent::Start);
        assert!(r.on_chunk(session, vec![0x1a, 0x45]));
        assert!(r.on_chunk(session, vec![0xdf, 0xa3]));
        r.on_engine_event(session, EngineEvent::End);

        let artifact = r.download_at(stamp(), Instant::now()).unwrap();
        assert_eq!(artifact.bytes, vec![0x1a, 0x45, 0xdf, 0xa3]);
        assert_eq!(artifact.suggested_name, "bataa-Монголхэл-20261018T093000.webm");
        assert_eq!(r.recorder().host().log.borrow().tracks_stopped, 1);
    }

    #[test]
    fn new_session_supersedes_live_one() {
        let mut r = reader(FakeCapture::new(Grant::audio(), Grant::denied()));
        let first = r.play("нэг", SpeechParams::default()).unwrap();
        r.on_engine_event(first, EngineEvent::Start);
        r.on_chunk(first, vec![1, 2, 3]);

        let second = r.play("хоёр", SpeechParams::default()).unwrap();
        assert_eq!(r.recorder().host().log.borrow().tracks_stopped, 1);
        assert!(r.recording().is_none());

        let events = r.take_events();
        let is_event = |e: &ReaderEvent, session: SessionId, kind: PlaybackEventKind| {
            matches!(e, ReaderEvent::Playback(p) if p.session == session && p.kind == kind)
        };
        let stopped_at = events
            .iter()
            .position(|e| is_event(e, first, PlaybackEventKind::Stopped))
            .expect("first session should be stopped");
        assert!(!events[stopped_at..]
            .iter()
            .any(|e| is_event(e, second, PlaybackEventKind::Started)));

        // late callbacks for the first session are ignored
        assert!(!r.on_engine_event(first, EngineEvent::End));
        assert!(!r.on_chunk(first, vec![4]));
        assert_eq!(r.state(), PlaybackState::Speaking);

        r.on_engine_event(second, EngineEvent::Start);
        r.on_engine_event(second, EngineEvent::End);
        assert_eq!(r.recording().unwrap().session, second);
    }

    #[test]
    fn stop_finishes_capture_and_is_idempotent() {
        let mut r = reader(FakeCapture::new(Grant::audio(), Grant::denied()));
        let session = r.play("текст", SpeechParams::default()).unwrap();
        r.on_engine_event(session, EngineEvent::Start);
        r.on_chunk(session, vec![5, 6]);

        assert!(r.stop());
        assert!(!r.stop());
        assert_eq!(r.state(), PlaybackState::Ended);
        assert_eq!(r.recording().unwrap().bytes, vec![5, 6]);
        assert_eq!(r.recorder().host().log.borrow().tracks_stopped, 1);
        assert!(r.recorder().active().is_none());

        let kinds = playback_kinds(&r.take_events());
        assert_eq!(kinds, vec![PlaybackEventKind::Started, PlaybackEventKind::Stopped]);
    }

    #[test]
    fn stop_before_start_leaves_nothing_to_download() {
        let mut r = reader(FakeCapture::all_denied());
        r.play("текст", SpeechParams::default()).unwrap();
        r.stop();
        assert!(r.recording().is_none());
        assert!(r.recorder().host().requests.is_empty());
        assert!(matches!(r.download_at(stamp(), Instant::now()), Err(ReaderError::NoArtifact)));
    }

    #[test]
    fn synthesis_error_is_surfaced_and_capture_released() {
        let mut r = reader(FakeCapture::new(Grant::audio(), Grant::denied()));
        let session = r.play("текст", SpeechParams::default()).unwrap();
        r.on_engine_event(session, EngineEvent::Start);
        r.on_engine_event(session, EngineEvent::Error("audio-busy".into()));

        assert_eq!(r.state(), PlaybackState::Errored);
        assert_eq!(r.playback().last_error(), Some("audio-busy"));
        assert_eq!(r.recorder().host().log.borrow().tracks_stopped, 1);
        let errored = PlaybackEventKind::Error("audio-busy".to_string());
        assert!(r.take_events().iter().any(|e| matches!(
            e,
            ReaderEvent::Playback(PlaybackEvent { kind, .. }) if *kind == errored
        )));

        // retryable afterwards
        r.play("дахин", SpeechParams::default()).unwrap();
        assert_eq!(r.state(), PlaybackState::Speaking);
    }

    #[test]
    fn toggle_cycles_pause_and_resume() {
        let mut r = reader(FakeCapture::all_denied());
        r.toggle("текст", SpeechParams::default()).unwrap();
        assert_eq!(r.state(), PlaybackState::Speaking);
        r.toggle("текст", SpeechParams::default()).unwrap();
        assert_eq!(r.state(), PlaybackState::Paused);
        r.toggle("текст", SpeechParams::default()).unwrap();
        assert_eq!(r.state(), PlaybackState::Speaking);
        assert_eq!(r.playback().engine().spoken().len(), 1);
    }

    #[test]
    fn play_while_paused_resumes_and_keeps_session() {
        let mut r = reader(FakeCapture::all_denied());
        let session = r.play("текст", SpeechParams::default()).unwrap();
        r.pause();
        assert_eq!(r.play("өөр", SpeechParams::default()).unwrap(), session);
        assert_eq!(r.playback().engine().count(&EngineCall::Resume), 1);
    }

    #[test]
    fn shortcuts_map_to_operations() {
        assert_eq!(Shortcut::from_key("Enter", true), Some(Shortcut::Play));
        assert_eq!(Shortcut::from_key(" ", true), Some(Shortcut::TogglePause));
        assert_eq!(Shortcut::from_key("Escape", true), Some(Shortcut::Stop));
        assert_eq!(Shortcut::from_key("Enter", false), None);
        assert_eq!(Shortcut::from_key("a", true), None);

        let mut r = reader(FakeCapture::all_denied());
        r.apply_shortcut(Shortcut::Play, "текст", SpeechParams::default()).unwrap();
        r.apply_shortcut(Shortcut::TogglePause, "текст", SpeechParams::default()).unwrap();
        assert_eq!(r.state(), PlaybackState::Paused);
        r.apply_shortcut(Shortcut::Stop, "текст", SpeechParams::default()).unwrap();
        assert_eq!(r.state(), PlaybackState::Ended);
    }

    #[test]
    fn early_recording_stop_is_not_overwritten_by_end() {
        let mut r = reader(FakeCapture::new(Grant::audio(), Grant::denied()));
        let session = r.play("текст", SpeechParams::default()).unwrap();
        r.on_engine_event(session, EngineEvent::Start);
        r.on_chunk(session, vec![8]);
        assert!(r.stop_recording());
        assert!(!r.stop_recording());
        assert_eq!(r.state(), PlaybackState::Speaking);

        r.on_engine_event(session, EngineEvent::End);
        assert_eq!(r.recording().unwrap().bytes, vec![8]);
        assert_eq!(r.recording().unwrap().strategy, StrategyKind::Microphone);
    }

    #[test]
    fn clear_drops_download_and_handles() {
        let mut r = reader(FakeCapture::all_denied());
        let session = r.play("текст", SpeechParams::default()).unwrap();
        r.on_engine_event(session, EngineEvent::Start);
        r.on_engine_event(session, EngineEvent::End);
        r.download_at(stamp(), Instant::now()).unwrap();
        assert_eq!(r.packager().outstanding(), 1);

        r.clear();
        assert!(!r.can_download());
        assert_eq!(r.packager().outstanding(), 0);
    }

    #[test]
    fn download_handles_are_released_after_delay() {
        let mut r = reader(FakeCapture::all_denied());
        let session = r.play("текст", SpeechParams::default()).unwrap();
        r.on_engine_event(session, EngineEvent::End);

        let t0 = Instant::now();
        let artifact = r.download_at(stamp(), t0).unwrap();
        assert!(r.release_expired(t0 + Duration::from_secs(1)).is_empty());
        assert_eq!(r.release_expired(t0 + Duration::from_secs(2)), vec![artifact.handle]);
        assert!(!r.release(artifact.handle));
    }

    #[test]
    fn end_without_start_still_produces_audio() {
        let mut r = reader(FakeCapture::new(Grant::audio(), Grant::audio()));
        let session = r.play("текст", SpeechParams::default()).unwrap();
        r.on_engine_event(session, EngineEvent::End);
        assert_eq!(r.recording().unwrap().strategy, StrategyKind::SyntheticTone);
        assert!(r.recorder().host().requests.is_empty());
    }
}
