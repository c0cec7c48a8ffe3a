use std::collections::VecDeque;
use std::mem;

use crate::config::{ParamRange, ReaderConfig};
use crate::voices::VoiceSelector;
use crate::{EngineEvent, ReaderError, SessionId, SpeechEngine, Utterance, VoiceDescriptor};

/// Requested speech parameters, before clamping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeechParams {
    /// Speech rate multiplier. Clamped to 0.5–1.5 by default.
    pub rate: f32,
    /// Clamped to 0.5–2.0 by default.
    pub pitch: f32,
    /// Clamped to 0.0–1.0 by default.
    pub volume: f32,
}

impl Default for SpeechParams {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Speaking,
    Paused,
    Ended,
    Errored,
}

impl PlaybackState {
    /// Speaking or paused: a session is live and can be stopped.
    pub fn is_active(self) -> bool {
        matches!(self, PlaybackState::Speaking | PlaybackState::Paused)
    }
}

/// The one live utterance, with its clamped parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSession {
    pub id: SessionId,
    pub text: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub voice: Option<VoiceDescriptor>,
    /// Set once the engine has confirmed the utterance started.
    pub started: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEventKind {
    Started,
    Paused,
    Resumed,
    /// Natural end of the utterance.
    Ended,
    /// Cancelled by `stop()` or by a newer session.
    Stopped,
    Error(String),
}

/// Lifecycle notification, tagged with the session it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackEvent {
    pub session: SessionId,
    pub text: String,
    pub kind: PlaybackEventKind,
}

impl PlaybackEvent {
    /// Whether no further audio will come for this session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            PlaybackEventKind::Ended | PlaybackEventKind::Stopped | PlaybackEventKind::Error(_)
        )
    }
}

enum Lifecycle {
    Idle,
    Speaking(PlaybackSession),
    Paused(PlaybackSession),
    Ended(SessionId),
    Errored { session: SessionId, reason: String },
}

/// Drives one utterance at a time through the host speech engine.
///
/// Calls return immediately; the engine's callbacks come back through
/// [`on_engine_event`](Self::on_engine_event) and are matched against the
/// live session's id. Callbacks for any other session are dropped.
///
/// Lifecycle notifications queue up until drained with
/// [`take_events`](Self::take_events).
pub struct PlaybackController<E: SpeechEngine> {
    engine: E,
    selector: VoiceSelector,
    rate_range: ParamRange,
    pitch_range: ParamRange,
    volume_range: ParamRange,
    fallback_lang: String,
    voice: Option<VoiceDescriptor>,
    lifecycle: Lifecycle,
    next_session: u64,
    events: VecDeque<PlaybackEvent>,
}

impl<E: SpeechEngine> PlaybackController<E> {
    pub fn new(engine: E, config: &ReaderConfig) -> Self {
        let mut controller = Self {
            engine,
            selector: VoiceSelector::from_config(config),
            rate_range: config.rate_range,
            pitch_range: config.pitch_range,
            volume_range: config.volume_range,
            fallback_lang: config.fallback_lang.clone(),
            voice: None,
            lifecycle: Lifecycle::Idle,
            next_session: 1,
            events: VecDeque::new(),
        };
        controller.voices_changed();
        controller
    }

    pub fn state(&self) -> PlaybackState {
        match self.lifecycle {
            Lifecycle::Idle => PlaybackState::Idle,
            Lifecycle::Speaking(_) => PlaybackState::Speaking,
            Lifecycle::Paused(_) => PlaybackState::Paused,
            Lifecycle::Ended(_) => PlaybackState::Ended,
            Lifecycle::Errored { .. } => PlaybackState::Errored,
        }
    }

    /// The live session, if speaking or paused.
    pub fn session(&self) -> Option<&PlaybackSession> {
        match &self.lifecycle {
            Lifecycle::Speaking(s) | Lifecycle::Paused(s) => Some(s),
            _ => None,
        }
    }

    /// Id of the most recent session, live or finished.
    pub fn last_session(&self) -> Option<SessionId> {
        match &self.lifecycle {
            Lifecycle::Idle => None,
            Lifecycle::Speaking(s) | Lifecycle::Paused(s) => Some(s.id),
            Lifecycle::Ended(id) => Some(*id),
            Lifecycle::Errored { session, .. } => Some(*session),
        }
    }

    /// Reason reported by the engine for the last failed session.
    pub fn last_error(&self) -> Option<&str> {
        match &self.lifecycle {
            Lifecycle::Errored { reason, .. } => Some(reason),
            _ => None,
        }
    }

    pub fn voice(&self) -> Option<&VoiceDescriptor> {
        self.voice.as_ref()
    }

    pub fn selector(&self) -> &VoiceSelector {
        &self.selector
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Re-enumerate the host's voices and re-run selection.
    ///
    /// Call whenever the host reports that its voice list changed.
    pub fn voices_changed(&mut self) -> Option<&VoiceDescriptor> {
        let voices = self.engine.list_voices();
        let selected = self.selector.resolve(&voices).cloned();

        match &selected {
            Some(v) => log::info!(
                "Selected voice '{}' ({}) from {} candidates, match: {:?}",
                v.name,
                v.language_tag,
                voices.len(),
                self.selector.describe(v)
            ),
            None => log::warn!("Host exposes no voices yet, using engine default"),
        }

        self.voice = selected;
        self.voice.as_ref()
    }

    /// Start speaking `text`.
    ///
    /// While paused this resumes the current session instead. Otherwise any
    /// live session is cancelled first, so at most one session is ever live.
    pub fn start(&mut self, text: &str, params: SpeechParams) -> Result<SessionId, ReaderError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ReaderError::EmptyInput);
        }

        if let Lifecycle::Paused(session) = &self.lifecycle {
            let id = session.id;
            self.resume();
            return Ok(id);
        }

        self.engine.cancel();
        self.finish_live(PlaybackEventKind::Stopped);

        if self.voice.is_none() {
            self.voices_changed();
        }

        let id = SessionId(self.next_session);
        self.next_session += 1;

        let session = PlaybackSession {
            id,
            text: text.to_string(),
            rate: self.rate_range.clamp(params.rate, 1.0),
            pitch: self.pitch_range.clamp(params.pitch, 1.0),
            volume: self.volume_range.clamp(params.volume, 1.0),
            voice: self.voice.clone(),
            started: false,
        };
        let utterance = self.utterance_for(&session);
        log::info!(
            "Session {id}: speaking {} chars (rate {:.2}, pitch {:.2}, volume {:.2}, lang {})",
            text.chars().count(),
            session.rate,
            session.pitch,
            session.volume,
            utterance.lang
        );
        self.lifecycle = Lifecycle::Speaking(session);

        if let Err(e) = self.engine.speak(&utterance) {
            log::error!("Session {id}: engine refused utterance: {e}");
            let reason = match &e {
                ReaderError::Synthesis(reason) => reason.clone(),
                other => other.to_string(),
            };
            self.finish_live(PlaybackEventKind::Error(reason));
            return Err(e);
        }

        Ok(id)
    }

    /// Pause the live session. No-op unless speaking.
    pub fn pause(&mut self) -> bool {
        if !matches!(self.lifecycle, Lifecycle::Speaking(_)) {
            return false;
        }
        self.engine.pause();
        self.transition_paused()
    }

    /// Resume the paused session. No-op unless paused.
    pub fn resume(&mut self) -> bool {
        if !matches!(self.lifecycle, Lifecycle::Paused(_)) {
            return false;
        }
        self.engine.resume();
        self.transition_resumed()
    }

    /// Cancel the live session. No-op when nothing is speaking or paused.
    pub fn stop(&mut self) -> bool {
        if !self.state().is_active() {
            return false;
        }
        self.engine.cancel();
        self.finish_live(PlaybackEventKind::Stopped)
    }

    /// Feed a callback from the host speech engine.
    ///
    /// Returns `false` if the callback was stale or did not change anything.
    pub fn on_engine_event(&mut self, session: SessionId, event: EngineEvent) -> bool {
        let live = self.session().map(|s| s.id);
        if live != Some(session) {
            log::debug!("Dropping {event:?} for stale session {session} (live: {live:?})");
            return false;
        }

        match event {
            EngineEvent::Start => self.confirm_started(),
            EngineEvent::Pause => self.transition_paused(),
            EngineEvent::Resume => self.transition_resumed(),
            EngineEvent::End => self.finish_live(PlaybackEventKind::Ended),
            EngineEvent::Error(reason) => {
                log::error!("Session {session}: synthesis error: {reason}");
                self.finish_live(PlaybackEventKind::Error(reason))
            }
        }
    }

    /// Drain queued lifecycle notifications, oldest first.
    pub fn take_events(&mut self) -> Vec<PlaybackEvent> {
        self.events.drain(..).collect()
    }

    fn utterance_for(&self, session: &PlaybackSession) -> Utterance {
        let lang = match &session.voice {
            Some(v) if self.selector.in_family(&v.language_tag) => v.language_tag.clone(),
            _ => self.fallback_lang.clone(),
        };
        Utterance {
            session: session.id,
            text: session.text.clone(),
            voice: session.voice.clone(),
            lang,
            rate: session.rate,
            pitch: session.pitch,
            volume: session.volume,
        }
    }

    fn confirm_started(&mut self) -> bool {
        let event = match &mut self.lifecycle {
            Lifecycle::Speaking(s) | Lifecycle::Paused(s) if !s.started => {
                s.started = true;
                Self::event(s, PlaybackEventKind::Started)
            }
            _ => return false,
        };
        self.events.push_back(event);
        true
    }

    fn transition_paused(&mut self) -> bool {
        match mem::replace(&mut self.lifecycle, Lifecycle::Idle) {
            Lifecycle::Speaking(s) => {
                log::info!("Session {}: paused", s.id);
                self.events.push_back(Self::event(&s, PlaybackEventKind::Paused));
                self.lifecycle = Lifecycle::Paused(s);
                true
            }
            other => {
                self.lifecycle = other;
                false
            }
        }
    }

    fn transition_resumed(&mut self) -> bool {
        match mem::replace(&mut self.lifecycle, Lifecycle::Idle) {
            Lifecycle::Paused(s) => {
                log::info!("Session {}: resumed", s.id);
                self.events.push_back(Self::event(&s, PlaybackEventKind::Resumed));
                self.lifecycle = Lifecycle::Speaking(s);
                true
            }
            other => {
                self.lifecycle = other;
                false
            }
        }
    }

    /// Move the live session into its terminal state and queue `kind`.
    fn finish_live(&mut self, kind: PlaybackEventKind) -> bool {
        match mem::replace(&mut self.lifecycle, Lifecycle::Idle) {
            Lifecycle::Speaking(s) | Lifecycle::Paused(s) => {
                log::info!("Session {}: {kind:?}", s.id);
                self.lifecycle = match &kind {
                    PlaybackEventKind::Error(reason) => Lifecycle::Errored {
                        session: s.id,
                        reason: reason.clone(),
                    },
                    _ => Lifecycle::Ended(s.id),
                };
                self.events.push_back(Self::event(&s, kind));
                true
            }
            other => {
                self.lifecycle = other;
                false
            }
        }
    }

    fn event(session: &PlaybackSession, kind: PlaybackEventKind) -> PlaybackEvent {
        PlaybackEvent {
            session: session.id,
            text: session.text.clone(),
            kind,
        }
    }
}
