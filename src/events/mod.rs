//! Voice events exposed to the surrounding application
//!
//! The core never calls back into the host synchronously. Every notification
//! (activation, transcript, speaking/listening indicators, errors) is emitted
//! as a [`VoiceEvent`] on an unbounded channel, so a receiver that reacts by
//! destroying the wake word session cannot re-enter a half-applied transition.

use serde::Serialize;
use tokio::sync::mpsc;

/// Notification emitted by the voice core
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VoiceEvent {
    /// Activation phrase detected, a foreground turn should begin
    Activated,
    /// A completed utterance is available
    Transcript {
        /// Recognized text
        text: String,
        /// Language/region tag the turn will use
        language_tag: String,
    },
    /// Speech output started or stopped
    SpeakingChanged {
        /// Whether audio is currently being spoken
        speaking: bool,
    },
    /// Microphone capture started or stopped
    ListeningChanged {
        /// Whether a recognizer currently holds the microphone
        listening: bool,
    },
    /// Non-fatal or fatal error notification
    Error {
        /// Error classification
        kind: VoiceErrorKind,
        /// Human-readable description
        message: String,
    },
}

/// Public error taxonomy
///
/// Raw platform or bridge errors are mapped onto one of these kinds at the
/// resolver boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceErrorKind {
    /// Recoverable recognition hiccup (no speech, network blip)
    Transient,
    /// Microphone or speech service access denied
    Permission,
    /// Every chunk of a speech output request failed
    ChunkFailure,
    /// No bridge or platform engine can serve the request
    CapabilityUnavailable,
    /// The wake word session gave up after repeated errors
    TooManyErrors,
    /// The response service failed to produce text
    ResponseFailed,
}

impl VoiceErrorKind {
    /// Whether the condition requires explicit caller intervention
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Permission | Self::TooManyErrors)
    }
}

impl std::fmt::Display for VoiceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Transient => "transient",
            Self::Permission => "permission",
            Self::ChunkFailure => "chunk_failure",
            Self::CapabilityUnavailable => "capability_unavailable",
            Self::TooManyErrors => "too_many_errors",
            Self::ResponseFailed => "response_failed",
        };
        f.write_str(s)
    }
}

/// Cloneable sender half for [`VoiceEvent`]s
///
/// Emitting never blocks and never fails; events sent after the receiver is
/// dropped are discarded.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<VoiceEvent>>,
}

impl EventSink {
    /// Create a sink and the receiver that observes it
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<VoiceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that drops every event
    #[must_use]
    pub const fn discard() -> Self {
        Self { tx: None }
    }

    /// Emit an event
    pub fn emit(&self, event: VoiceEvent) {
        if let Some(tx) = &self.tx
            && tx.send(event).is_err()
        {
            tracing::trace!("voice event receiver dropped");
        }
    }

    /// Emit an error event
    pub fn error(&self, kind: VoiceErrorKind, message: impl Into<String>) {
        let message = message.into();
        if kind.is_fatal() {
            tracing::error!(%kind, %message, "voice error");
        } else {
            tracing::warn!(%kind, %message, "voice error");
        }
        self.emit(VoiceEvent::Error { kind, message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_kinds() {
        assert!(VoiceErrorKind::Permission.is_fatal());
        assert!(VoiceErrorKind::TooManyErrors.is_fatal());
        assert!(!VoiceErrorKind::Transient.is_fatal());
        assert!(!VoiceErrorKind::ChunkFailure.is_fatal());
    }

    #[test]
    fn sink_delivers_in_order() {
        let (sink, mut rx) = EventSink::channel();
        sink.emit(VoiceEvent::Activated);
        sink.error(VoiceErrorKind::Transient, "no speech");

        assert_eq!(rx.try_recv().unwrap(), VoiceEvent::Activated);
        assert!(matches!(
            rx.try_recv().unwrap(),
            VoiceEvent::Error { kind: VoiceErrorKind::Transient, .. }
        ));
    }

    #[test]
    fn discard_sink_is_silent() {
        let sink = EventSink::discard();
        sink.emit(VoiceEvent::Activated);
    }

    #[test]
    fn serializes_tagged() {
        let json =
            serde_json::to_string(&VoiceEvent::ListeningChanged { listening: true }).unwrap();
        assert_eq!(json, r#"{"type":"listening_changed","listening":true}"#);
    }
}
