//! Wake word state machine
//!
//! [`WakeWordMachine`] is a pure transition function: it consumes
//! [`SessionInput`]s and returns the [`SessionAction`]s the runtime in
//! `session.rs` must perform. It never touches audio, timers or channels, so
//! every path is testable without a microphone or a clock.

use std::time::Duration;

use crate::events::{VoiceErrorKind, VoiceEvent};
use crate::platform::RecognitionErrorKind;
use crate::retry::BackoffPolicy;

/// Default activation phrases, including common mishearings
pub const DEFAULT_PHRASES: &[&str] = &["astrova", "astrava", "astrova ai"];

/// Default edit distance tolerated between transcript and phrase
pub const DEFAULT_MAX_DISTANCE: usize = 2;

/// Lifecycle state of the wake word session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Recognizer requested, not yet ready
    Starting,
    Listening,
    /// Activation phrase heard; recognizer released
    Triggered,
    /// Waiting to restart, or halted after a fatal error
    Backoff,
    Destroyed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Listening => "listening",
            Self::Triggered => "triggered",
            Self::Backoff => "backoff",
            Self::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// Input to the state machine
///
/// Recognizer inputs carry the generation of the recognizer that produced
/// them; inputs from a recognizer that has since been replaced are ignored.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    Start,
    Stop,
    Restart,
    Destroy,
    RecognizerReady { generation: u64 },
    Transcript { generation: u64, text: String },
    RecognizerError { generation: u64, kind: RecognitionErrorKind },
    RecognizerEnded { generation: u64 },
    TimerElapsed { token: u64 },
}

/// Side effect requested by the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Create and start a recognizer tagged with `generation`
    OpenRecognizer { generation: u64 },
    /// Abort and drop the current recognizer
    CloseRecognizer,
    /// Arm the restart timer, replacing any armed one
    ScheduleRestart { delay: Duration, token: u64 },
    CancelRestart,
    Emit(VoiceEvent),
}

/// Wake word tuning
#[derive(Debug, Clone, PartialEq)]
pub struct WakeWordOptions {
    pub phrases: Vec<String>,
    pub max_distance: usize,
    pub backoff: BackoffPolicy,
    /// Delay used by an explicit `restart()`
    pub restart_delay: Duration,
    /// Delay before relistening after the recognizer ended on its own
    pub rearm_delay: Duration,
    pub language_tag: String,
}

impl Default for WakeWordOptions {
    fn default() -> Self {
        Self {
            phrases: DEFAULT_PHRASES.iter().map(|p| (*p).to_string()).collect(),
            max_distance: DEFAULT_MAX_DISTANCE,
            backoff: BackoffPolicy::default(),
            restart_delay: Duration::from_secs(1),
            rearm_delay: Duration::from_secs(1),
            language_tag: "en-IN".to_string(),
        }
    }
}

/// Fuzzy activation phrase matcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseMatcher {
    phrases: Vec<String>,
    max_distance: usize,
}

impl PhraseMatcher {
    /// Phrases are normalized; empty ones are dropped
    #[must_use]
    pub fn new<I, S>(phrases: I, max_distance: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for phrase in phrases {
            let p = normalize(phrase.as_ref());
            if !p.is_empty() && !normalized.contains(&p) {
                normalized.push(p);
            }
        }
        Self {
            phrases: normalized,
            max_distance,
        }
    }

    /// The first phrase matching `transcript`
    ///
    /// A phrase matches if it occurs in the transcript on word boundaries, or
    /// if the whole transcript is within `max_distance` edits of it.
    #[must_use]
    pub fn find(&self, transcript: &str) -> Option<&str> {
        let text = normalize(transcript);
        if text.is_empty() {
            return None;
        }
        let padded = format!(" {text} ");

        self.phrases
            .iter()
            .find(|phrase| {
                padded.contains(&format!(" {phrase} "))
                    || edit_distance(&text, phrase) <= self.max_distance
            })
            .map(String::as_str)
    }

    #[must_use]
    pub fn matches(&self, transcript: &str) -> bool {
        self.find(transcript).is_some()
    }

    #[must_use]
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }
}

/// Lowercase, replace punctuation with spaces, collapse whitespace
#[must_use]
pub fn normalize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| {
            if c.is_ascii_punctuation() || is_unicode_punctuation(c) {
                ' '
            } else {
                c
            }
        })
        .collect::<String>()
        .to_lowercase();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_unicode_punctuation(c: char) -> bool {
    matches!(
        c,
        '।' | '॥' | '“' | '”' | '‘' | '’' | '…' | '—' | '–' | '¿' | '¡' | '«' | '»' | '、' | '。'
    )
}

/// Levenshtein distance over chars
#[must_use]
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Wake word session state machine
#[derive(Debug)]
pub struct WakeWordMachine {
    state: SessionState,
    matcher: PhraseMatcher,
    backoff: BackoffPolicy,
    restart_delay: Duration,
    rearm_delay: Duration,
    consecutive_errors: u32,
    /// Stays in Backoff without a restart timer
    halted: bool,
    generation: u64,
    recognizer_open: bool,
    listening: bool,
    timer_token: u64,
    timer_armed: bool,
}

impl WakeWordMachine {
    #[must_use]
    pub fn new(options: &WakeWordOptions) -> Self {
        Self {
            state: SessionState::Idle,
            matcher: PhraseMatcher::new(&options.phrases, options.max_distance),
            backoff: options.backoff.clone(),
            restart_delay: options.restart_delay,
            rearm_delay: options.rearm_delay,
            consecutive_errors: 0,
            halted: false,
            generation: 0,
            recognizer_open: false,
            listening: false,
            timer_token: 0,
            timer_armed: false,
        }
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub const fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// Whether the session gave up and needs an explicit start or restart
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.halted
    }

    /// Generation of the most recently opened recognizer
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub const fn matcher(&self) -> &PhraseMatcher {
        &self.matcher
    }

    /// Apply one input, returning the side effects to perform in order
    pub fn handle(&mut self, input: SessionInput) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        if self.state == SessionState::Destroyed {
            return actions;
        }

        match input {
            SessionInput::Destroy => {
                self.close_recognizer(&mut actions);
                self.cancel_timer(&mut actions);
                self.state = SessionState::Destroyed;
            }
            SessionInput::Start => {
                if !matches!(self.state, SessionState::Starting | SessionState::Listening) {
                    self.consecutive_errors = 0;
                    self.halted = false;
                    self.cancel_timer(&mut actions);
                    self.open_recognizer(&mut actions);
                }
            }
            SessionInput::Stop => {
                self.cancel_timer(&mut actions);
                self.close_recognizer(&mut actions);
                self.consecutive_errors = 0;
                self.halted = false;
                self.state = SessionState::Idle;
            }
            SessionInput::Restart => {
                self.close_recognizer(&mut actions);
                self.consecutive_errors = 0;
                self.halted = false;
                self.schedule_restart(self.restart_delay, &mut actions);
            }
            SessionInput::RecognizerReady { generation } => {
                if self.is_current(generation) && self.state == SessionState::Starting {
                    self.state = SessionState::Listening;
                    self.listening = true;
                    actions.push(SessionAction::Emit(VoiceEvent::ListeningChanged {
                        listening: true,
                    }));
                }
            }
            SessionInput::Transcript { generation, text } => {
                if self.is_current(generation)
                    && matches!(self.state, SessionState::Starting | SessionState::Listening)
                {
                    self.on_transcript(&text, &mut actions);
                }
            }
            SessionInput::RecognizerError { generation, kind } => {
                if self.is_current(generation) {
                    self.on_error(&kind, &mut actions);
                }
            }
            SessionInput::RecognizerEnded { generation } => {
                if self.is_current(generation) {
                    self.on_ended(&mut actions);
                }
            }
            SessionInput::TimerElapsed { token } => {
                if self.timer_armed && token == self.timer_token {
                    self.timer_armed = false;
                    if self.state == SessionState::Backoff && !self.halted {
                        self.open_recognizer(&mut actions);
                    }
                }
            }
        }

        actions
    }

    fn is_current(&self, generation: u64) -> bool {
        self.recognizer_open && generation == self.generation
    }

    fn on_transcript(&mut self, text: &str, actions: &mut Vec<SessionAction>) {
        let Some(phrase) = self.matcher.find(text) else {
            tracing::trace!(transcript = text, "no activation phrase");
            return;
        };

        tracing::info!(phrase, transcript = text, "activation phrase detected");
        self.close_recognizer(actions);
        self.cancel_timer(actions);
        self.consecutive_errors = 0;
        self.state = SessionState::Triggered;
        actions.push(SessionAction::Emit(VoiceEvent::Activated));
    }

    fn on_error(&mut self, kind: &RecognitionErrorKind, actions: &mut Vec<SessionAction>) {
        if kind.is_benign() {
            // The recognizer reports Ended next
            tracing::trace!(%kind, "benign recognizer error");
            return;
        }

        if kind.is_permission() {
            tracing::error!(%kind, "wake word halted: permission denied");
            self.close_recognizer(actions);
            self.cancel_timer(actions);
            self.halted = true;
            self.state = SessionState::Backoff;
            actions.push(SessionAction::Emit(VoiceEvent::Error {
                kind: VoiceErrorKind::Permission,
                message: kind.message(),
            }));
            return;
        }

        self.fail(&kind.message(), actions);
    }

    fn on_ended(&mut self, actions: &mut Vec<SessionAction>) {
        match self.state {
            SessionState::Listening => {
                tracing::debug!(delay = ?self.rearm_delay, "recognizer ended, rearming");
                self.close_recognizer(actions);
                self.consecutive_errors = 0;
                self.schedule_restart(self.rearm_delay, actions);
            }
            SessionState::Starting => {
                self.fail("recognizer ended before it was ready", actions);
            }
            _ => self.close_recognizer(actions),
        }
    }

    /// Count a transient failure and back off, or halt when exhausted
    fn fail(&mut self, reason: &str, actions: &mut Vec<SessionAction>) {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.close_recognizer(actions);

        if self.backoff.is_exhausted(self.consecutive_errors) {
            tracing::error!(
                errors = self.consecutive_errors,
                reason,
                "wake word halted after repeated errors"
            );
            self.cancel_timer(actions);
            self.halted = true;
            self.state = SessionState::Backoff;
            actions.push(SessionAction::Emit(VoiceEvent::Error {
                kind: VoiceErrorKind::TooManyErrors,
                message: format!(
                    "wake word stopped after {} consecutive errors",
                    self.consecutive_errors
                ),
            }));
            return;
        }

        let delay = self.backoff.delay_for(self.consecutive_errors);
        tracing::warn!(
            errors = self.consecutive_errors,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            reason,
            "wake word recognizer failed, backing off"
        );
        self.schedule_restart(delay, actions);
    }

    fn open_recognizer(&mut self, actions: &mut Vec<SessionAction>) {
        self.close_recognizer(actions);
        self.generation += 1;
        self.recognizer_open = true;
        self.state = SessionState::Starting;
        actions.push(SessionAction::OpenRecognizer {
            generation: self.generation,
        });
    }

    fn close_recognizer(&mut self, actions: &mut Vec<SessionAction>) {
        if self.recognizer_open {
            self.recognizer_open = false;
            actions.push(SessionAction::CloseRecognizer);
        }
        if self.listening {
            self.listening = false;
            actions.push(SessionAction::Emit(VoiceEvent::ListeningChanged {
                listening: false,
            }));
        }
    }

    fn schedule_restart(&mut self, delay: Duration, actions: &mut Vec<SessionAction>) {
        self.timer_token += 1;
        self.timer_armed = true;
        self.state = SessionState::Backoff;
        actions.push(SessionAction::ScheduleRestart {
            delay,
            token: self.timer_token,
        });
    }

    fn cancel_timer(&mut self, actions: &mut Vec<SessionAction>) {
        if self.timer_armed {
            self.timer_armed = false;
            actions.push(SessionAction::CancelRestart);
        }
    }
}
