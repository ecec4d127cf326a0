//! Foreground turn controller
//!
//! Ties the wake word session, the speech resolvers, the language scorer and
//! the response service into one loop: activation → capture one utterance →
//! detect language → fetch reply → speak → relisten.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};

use crate::bridge::BridgeTranscript;
use crate::events::{EventSink, VoiceErrorKind, VoiceEvent};
use crate::language::{LanguageScorer, speech_tag_for};
use crate::platform::{RecognitionEngine, RecognitionEvent};
use crate::resolver::{
    RecognitionRoute, SpeechInputResolver, SpeechOutputRequest, SpeechOutputResolver,
};
use crate::response::ResponseService;
use crate::voice::{SessionState, VoiceGender, WakeWordOptions, WakeWordSession};

/// Turn tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOptions {
    /// Language code used when auto-detection is off or finds nothing
    pub language: String,
    /// Reclassify each transcript with the language scorer
    pub auto_detect: bool,
    pub gender: VoiceGender,
    /// How long a foreground capture may take
    pub capture_timeout: Duration,
    /// Identifier passed to the response service
    pub session_id: String,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            language: crate::language::DEFAULT_LANGUAGE.to_string(),
            auto_detect: true,
            gender: VoiceGender::Female,
            capture_timeout: Duration::from_secs(10),
            session_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Nothing could listen; caller should fall back to text input
    InputUnavailable,
    /// Listening finished without a transcript
    NoSpeech,
    /// The response service failed
    ResponseFailed { transcript: String, language: String },
    /// A reply was produced and handed to speech output
    Completed {
        transcript: String,
        language: String,
        reply: String,
        spoken: bool,
    },
}

/// Everything a [`TurnController`] is built from
pub struct TurnParts {
    /// Engine shared by the wake word session and foreground capture
    pub recognition: Option<Arc<dyn RecognitionEngine>>,
    pub wake: WakeWordOptions,
    pub input: SpeechInputResolver,
    pub output: Arc<SpeechOutputResolver>,
    pub scorer: LanguageScorer,
    pub response: Arc<dyn ResponseService>,
    /// Transcripts delivered by bridges
    pub bridge_transcripts: mpsc::UnboundedReceiver<BridgeTranscript>,
    pub options: TurnOptions,
    pub events: EventSink,
}

/// Runs conversational turns between wake word activations
pub struct TurnController {
    session: Option<WakeWordSession>,
    wake_events: Mutex<mpsc::UnboundedReceiver<VoiceEvent>>,
    bridge_transcripts: Mutex<mpsc::UnboundedReceiver<BridgeTranscript>>,
    input: SpeechInputResolver,
    output: Arc<SpeechOutputResolver>,
    scorer: LanguageScorer,
    response: Arc<dyn ResponseService>,
    options: TurnOptions,
    events: EventSink,
}

impl TurnController {
    #[must_use]
    pub fn new(parts: TurnParts) -> Self {
        let (wake_sink, wake_events) = EventSink::channel();
        let session = parts
            .recognition
            .map(|engine| WakeWordSession::new(engine, &parts.wake, wake_sink));

        Self {
            session,
            wake_events: Mutex::new(wake_events),
            bridge_transcripts: Mutex::new(parts.bridge_transcripts),
            input: parts.input,
            output: parts.output,
            scorer: parts.scorer,
            response: parts.response,
            options: parts.options,
            events: parts.events,
        }
    }

    /// The wake word session, if a recognition engine was supplied
    #[must_use]
    pub const fn session(&self) -> Option<&WakeWordSession> {
        self.session.as_ref()
    }

    #[must_use]
    pub const fn options(&self) -> &TurnOptions {
        &self.options
    }

    /// Stop the current speech output
    pub fn stop_speaking(&self) -> bool {
        self.output.stop_speaking()
    }

    /// Listen for activations until `shutdown` resolves
    ///
    /// Events from the wake word session are forwarded to the controller's
    /// sink; each activation runs one turn. Bridge transcripts that arrive
    /// outside a turn are answered directly.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut wake_events = self.wake_events.lock().await;
        let mut bridge = self.bridge_transcripts.lock().await;

        if let Some(session) = &self.session {
            session.start();
        }
        tracing::info!(session_id = %self.options.session_id, "voice loop started");

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                event = wake_events.recv() => {
                    let Some(event) = event else { break };
                    let activated = event == VoiceEvent::Activated;
                    self.events.emit(event);
                    if activated {
                        let outcome = self.turn(&mut bridge).await;
                        tracing::info!(?outcome, "turn finished");
                    }
                }
                transcript = bridge.recv() => {
                    let Some(transcript) = transcript else { continue };
                    let was_active = self.pause_session();
                    let outcome = self
                        .respond(&transcript.text, transcript.language_tag.as_deref())
                        .await;
                    tracing::info!(?outcome, bridge = %transcript.bridge, "bridge turn finished");
                    self.restart_session(was_active);
                }
            }
        }

        if let Some(session) = &self.session {
            session.destroy();
        }
        self.output.stop_speaking();
        tracing::info!("voice loop stopped");
    }

    /// Run one foreground turn now
    pub async fn run_turn(&self) -> TurnOutcome {
        let mut bridge = self.bridge_transcripts.lock().await;
        self.turn(&mut bridge).await
    }

    /// Answer a transcript obtained elsewhere
    ///
    /// `language_tag` is the tag the transcript was recognized in, if known.
    pub async fn handle_transcript(&self, text: &str, language_tag: Option<&str>) -> TurnOutcome {
        let was_active = self.pause_session();
        let outcome = self.respond(text, language_tag).await;
        self.restart_session(was_active);
        outcome
    }

    async fn turn(&self, bridge: &mut mpsc::UnboundedReceiver<BridgeTranscript>) -> TurnOutcome {
        // Release the microphone before foreground capture
        let was_active = self.pause_session();

        let outcome = match self.capture(bridge).await {
            Capture::Unavailable => {
                self.events.error(
                    VoiceErrorKind::CapabilityUnavailable,
                    "speech input unavailable",
                );
                TurnOutcome::InputUnavailable
            }
            Capture::Nothing => TurnOutcome::NoSpeech,
            Capture::Transcript { text, language_tag } => {
                self.respond(&text, language_tag.as_deref()).await
            }
        };

        self.restart_session(was_active);
        outcome
    }

    async fn capture(&self, bridge: &mut mpsc::UnboundedReceiver<BridgeTranscript>) -> Capture {
        let tag = speech_tag_for(&self.options.language);
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Drop stale bridge transcripts from an earlier request
        while bridge.try_recv().is_ok() {}

        let route = match self.input.start_recognition(&tag, tx).await {
            Ok(Some(route)) => route,
            Ok(None) => return Capture::Unavailable,
            Err(e) => {
                let kind = crate::platform::RecognitionErrorKind::from_error(&e);
                self.events.error(kind.voice_error_kind(), kind.message());
                return Capture::Nothing;
            }
        };

        self.events.emit(VoiceEvent::ListeningChanged { listening: true });
        let deadline = self.options.capture_timeout;

        let captured = match route {
            RecognitionRoute::Bridge(name) => {
                match tokio::time::timeout(deadline, bridge.recv()).await {
                    Ok(Some(t)) => Capture::Transcript {
                        text: t.text,
                        language_tag: t.language_tag,
                    },
                    Ok(None) => Capture::Nothing,
                    Err(_) => {
                        tracing::warn!(bridge = %name, "bridge recognition timed out");
                        Capture::Nothing
                    }
                }
            }
            RecognitionRoute::Platform(mut recognizer) => {
                let result = tokio::time::timeout(deadline, self.await_transcript(&mut rx)).await;
                recognizer.abort();
                result.unwrap_or_else(|_| {
                    tracing::warn!("foreground recognition timed out");
                    Capture::Nothing
                })
            }
        };

        self.events.emit(VoiceEvent::ListeningChanged { listening: false });
        captured
    }

    async fn await_transcript(
        &self,
        rx: &mut mpsc::UnboundedReceiver<RecognitionEvent>,
    ) -> Capture {
        while let Some(event) = rx.recv().await {
            match event {
                RecognitionEvent::Started => tracing::debug!("foreground recognition started"),
                RecognitionEvent::Result {
                    transcript,
                    is_final: true,
                    confidence,
                } => {
                    tracing::info!(%transcript, ?confidence, "foreground transcript");
                    return Capture::Transcript {
                        text: transcript,
                        language_tag: None,
                    };
                }
                RecognitionEvent::Result { .. } => {}
                RecognitionEvent::Error(kind) => {
                    if kind.is_benign() {
                        tracing::debug!(%kind, "foreground recognition ended quietly");
                    } else {
                        self.events.error(kind.voice_error_kind(), kind.message());
                    }
                    return Capture::Nothing;
                }
                RecognitionEvent::Ended => break,
            }
        }
        Capture::Nothing
    }

    /// Detect language, fetch a reply and speak it
    async fn respond(&self, text: &str, language_tag: Option<&str>) -> TurnOutcome {
        let text = text.trim();
        if text.is_empty() {
            return TurnOutcome::NoSpeech;
        }

        let language = if self.options.auto_detect {
            self.scorer.detect(text).to_string()
        } else {
            self.options.language.clone()
        };
        let tag = match language_tag {
            Some(tag) if !self.options.auto_detect => tag.to_string(),
            _ => speech_tag_for(&language),
        };

        self.events.emit(VoiceEvent::Transcript {
            text: text.to_string(),
            language_tag: tag.clone(),
        });

        let reply = match self
            .response
            .generate(text, &self.options.session_id, &language)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                self.events
                    .error(VoiceErrorKind::ResponseFailed, format!("no reply: {e}"));
                return TurnOutcome::ResponseFailed {
                    transcript: text.to_string(),
                    language,
                };
            }
        };

        let request = SpeechOutputRequest::new(reply.clone(), tag, self.options.gender);
        let spoken = self.output.speak(&request).await;
        if !spoken.success {
            tracing::warn!(tier = ?spoken.tier, "reply was not spoken");
        }

        TurnOutcome::Completed {
            transcript: text.to_string(),
            language,
            reply,
            spoken: spoken.success,
        }
    }

    /// Release the microphone; returns whether the session was in use
    ///
    /// A halted session holds no recognizer and is left alone so that only an
    /// explicit `start()` can resume it.
    fn pause_session(&self) -> bool {
        let Some(session) = &self.session else {
            return false;
        };
        if session.is_halted() {
            tracing::debug!("wake session halted, not resuming after turn");
            return false;
        }
        let active = !matches!(session.state(), SessionState::Idle | SessionState::Destroyed);
        session.stop();
        active
    }

    fn restart_session(&self, was_active: bool) {
        if let Some(session) = self.session.as_ref().filter(|_| was_active) {
            session.restart();
        }
    }
}

enum Capture {
    Unavailable,
    Nothing,
    Transcript {
        text: String,
        language_tag: Option<String>,
    },
}
