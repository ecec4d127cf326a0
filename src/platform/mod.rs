//! Platform speech primitives
//!
//! Recognition and synthesis engines are reached through the traits here so
//! the resolvers and the wake word session can run against cloud engines in
//! production and fakes in tests.

mod recognition;
mod synthesis;
mod tone;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Result;
use crate::events::VoiceErrorKind;
use crate::voice::VoiceCandidate;

pub use recognition::CloudRecognitionEngine;
pub use synthesis::CloudSynthesisEngine;
pub use tone::SpeakerTone;

/// Recognition failure reported by an engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    /// Listening window elapsed without speech
    NoSpeech,
    /// Recognizer was stopped by its owner
    Aborted,
    /// Speech service unreachable
    Network,
    /// Microphone could not be opened or read
    AudioCapture,
    /// Microphone access denied by the user or platform
    NotAllowed,
    /// Speech service refused to serve the request
    ServiceNotAllowed,
    /// Anything else, carrying the raw code
    Other(String),
}

impl RecognitionErrorKind {
    /// Parse a platform error code such as `no-speech`
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "no-speech" => Self::NoSpeech,
            "aborted" => Self::Aborted,
            "network" => Self::Network,
            "audio-capture" => Self::AudioCapture,
            "not-allowed" => Self::NotAllowed,
            "service-not-allowed" => Self::ServiceNotAllowed,
            other => Self::Other(other.to_string()),
        }
    }

    /// Classify a crate error raised inside an engine
    #[must_use]
    pub fn from_error(error: &crate::Error) -> Self {
        match error {
            crate::Error::Permission(_) => Self::NotAllowed,
            crate::Error::Audio(_) => Self::AudioCapture,
            crate::Error::Http(_) | crate::Error::Stt(_) => Self::Network,
            crate::Error::Unavailable(_) => Self::ServiceNotAllowed,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::NoSpeech => "no-speech",
            Self::Aborted => "aborted",
            Self::Network => "network",
            Self::AudioCapture => "audio-capture",
            Self::NotAllowed => "not-allowed",
            Self::ServiceNotAllowed => "service-not-allowed",
            Self::Other(code) => code,
        }
    }

    /// Expected outcomes that are not failures of the recognizer
    #[must_use]
    pub const fn is_benign(&self) -> bool {
        matches!(self, Self::NoSpeech | Self::Aborted)
    }

    #[must_use]
    pub const fn is_permission(&self) -> bool {
        matches!(self, Self::NotAllowed | Self::ServiceNotAllowed)
    }

    /// User-facing description
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::NoSpeech => "No speech detected".to_string(),
            Self::Aborted => "Recognition aborted".to_string(),
            Self::Network => "Network error - Please check connection".to_string(),
            Self::AudioCapture => "Audio capture error".to_string(),
            Self::NotAllowed => "Microphone permission required".to_string(),
            Self::ServiceNotAllowed => "Speech service not available".to_string(),
            Self::Other(code) => format!("Voice error: {code}"),
        }
    }

    /// Public error kind this maps to
    #[must_use]
    pub const fn voice_error_kind(&self) -> VoiceErrorKind {
        if self.is_permission() {
            VoiceErrorKind::Permission
        } else {
            VoiceErrorKind::Transient
        }
    }
}

impl std::fmt::Display for RecognitionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Event delivered by a running recognizer
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    /// The microphone is open and audio is flowing
    Started,
    /// A transcript, interim or final
    Result {
        transcript: String,
        confidence: Option<f32>,
        is_final: bool,
    },
    /// The recognizer failed; `Ended` follows
    Error(RecognitionErrorKind),
    /// The recognizer released the microphone
    Ended,
}

/// How a recognizer should listen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizerOptions {
    pub language_tag: String,
    /// Keep listening across utterances
    pub continuous: bool,
    pub interim_results: bool,
    pub max_alternatives: u32,
}

impl RecognizerOptions {
    /// Single utterance, final results only
    #[must_use]
    pub fn one_shot(language_tag: &str) -> Self {
        Self {
            language_tag: language_tag.to_string(),
            continuous: false,
            interim_results: false,
            max_alternatives: 1,
        }
    }

    /// Long-running listener for activation phrases
    #[must_use]
    pub fn continuous(language_tag: &str) -> Self {
        Self {
            language_tag: language_tag.to_string(),
            continuous: true,
            interim_results: false,
            max_alternatives: 1,
        }
    }
}

/// A live recognizer holding the microphone
///
/// Dropping a recognizer must release the microphone.
pub trait Recognizer: Send {
    /// Begin listening, delivering events on `events`
    ///
    /// # Errors
    ///
    /// Returns error if the recognizer cannot start
    fn start(&mut self, events: mpsc::UnboundedSender<RecognitionEvent>) -> Result<()>;

    /// Stop listening, delivering any pending result before `Ended`
    fn stop(&mut self);

    /// Stop immediately, discarding pending audio
    fn abort(&mut self);
}

/// Factory for recognizers
pub trait RecognitionEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this engine can run in the current environment
    fn is_available(&self) -> bool;

    /// Create an idle recognizer
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot serve `options`
    fn create(&self, options: &RecognizerOptions) -> Result<Box<dyn Recognizer>>;
}

/// Prosody applied to synthesized speech
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeechStyle {
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Default for SpeechStyle {
    fn default() -> Self {
        Self {
            rate: 0.9,
            pitch: 1.1,
            volume: 0.9,
        }
    }
}

/// One chunk of text to synthesize
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub language_tag: String,
    /// `None` uses the engine default voice
    pub voice: Option<VoiceCandidate>,
    pub style: SpeechStyle,
}

/// Speech synthesis engine
///
/// At most one `speak` is in flight at a time; `cancel` aborts it.
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    /// Voices this engine can speak with
    fn voices(&self) -> Vec<VoiceCandidate>;

    /// Speak an utterance, resolving when playback finishes
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails, or was cancelled
    async fn speak(&self, utterance: &Utterance) -> Result<()>;

    /// Cancel the in-flight utterance, if any
    fn cancel(&self);
}

/// Audible fallback when no speech output is possible
#[async_trait]
pub trait TonePlayer: Send + Sync {
    /// Play a short tone
    ///
    /// # Errors
    ///
    /// Returns error if no output device is usable
    async fn play_tone(&self, frequency_hz: f32, duration: Duration) -> Result<()>;
}
