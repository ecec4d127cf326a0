//! Speech output resolution: bridge → synthesis engine → tone

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::cancel::CancelFlag;
use crate::bridge::{BridgeCapability, BridgeRequest, EnvironmentProbe};
use crate::events::{EventSink, VoiceErrorKind, VoiceEvent};
use crate::platform::{SpeechStyle, SynthesisEngine, TonePlayer, Utterance};
use crate::voice::{
    ChunkStatus, DEFAULT_MAX_CHUNK_CHARS, TextChunk, VoiceGender, VoiceSelector, chunk_text,
};

/// A request to speak text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechOutputRequest {
    pub text: String,
    pub language_tag: String,
    pub gender: VoiceGender,
}

impl SpeechOutputRequest {
    #[must_use]
    pub fn new(
        text: impl Into<String>,
        language_tag: impl Into<String>,
        gender: VoiceGender,
    ) -> Self {
        Self {
            text: text.into(),
            language_tag: language_tag.into(),
            gender,
        }
    }
}

/// Tier that handled a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputTier {
    Bridge,
    Engine,
    Tone,
    /// Nothing could produce sound
    None,
}

/// Result of a speech output request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechOutcome {
    pub tier: OutputTier,
    pub success: bool,
    /// Stopped by `stop_speaking` or superseded by a newer request
    pub cancelled: bool,
    /// Chunk statuses when the engine tier ran
    pub chunks: Vec<TextChunk>,
}

impl SpeechOutcome {
    const fn new(tier: OutputTier, success: bool) -> Self {
        Self {
            tier,
            success,
            cancelled: false,
            chunks: Vec::new(),
        }
    }
}

/// Output tuning
#[derive(Debug, Clone, PartialEq)]
pub struct OutputOptions {
    pub max_chunk_chars: usize,
    pub inter_chunk_pause: Duration,
    /// Lower bound on a chunk's timeout
    pub chunk_timeout_floor: Duration,
    /// Timeout budget per character of a chunk
    pub chunk_timeout_per_char: Duration,
    pub style: SpeechStyle,
    pub tone_frequency_hz: f32,
    pub tone_duration: Duration,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            inter_chunk_pause: Duration::from_millis(200),
            chunk_timeout_floor: Duration::from_secs(5),
            chunk_timeout_per_char: Duration::from_millis(100),
            style: SpeechStyle::default(),
            tone_frequency_hz: 880.0,
            tone_duration: Duration::from_millis(200),
        }
    }
}

impl OutputOptions {
    /// `max(floor, per_char × chars)`
    #[must_use]
    pub fn chunk_timeout(&self, chunk: &TextChunk) -> Duration {
        let chars = u32::try_from(chunk.char_len()).unwrap_or(u32::MAX);
        self.chunk_timeout_per_char
            .saturating_mul(chars)
            .max(self.chunk_timeout_floor)
    }
}

struct ActiveRequest {
    id: u64,
    cancel: Arc<CancelFlag>,
}

/// Speaks text through the best available backend
pub struct SpeechOutputResolver {
    probe: EnvironmentProbe,
    engine: Option<Arc<dyn SynthesisEngine>>,
    tone: Option<Arc<dyn TonePlayer>>,
    selector: VoiceSelector,
    options: OutputOptions,
    events: EventSink,
    active: Mutex<Option<ActiveRequest>>,
    next_id: AtomicU64,
}

impl SpeechOutputResolver {
    #[must_use]
    pub fn new(
        probe: EnvironmentProbe,
        engine: Option<Arc<dyn SynthesisEngine>>,
        tone: Option<Arc<dyn TonePlayer>>,
        events: EventSink,
    ) -> Self {
        Self {
            probe,
            engine,
            tone,
            selector: VoiceSelector::default(),
            options: OutputOptions::default(),
            events,
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn with_selector(mut self, selector: VoiceSelector) -> Self {
        self.selector = selector;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: OutputOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub const fn options(&self) -> &OutputOptions {
        &self.options
    }

    /// Whether a request is currently being spoken
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.lock_active().is_some()
    }

    /// Cancel the current chunk and skip the rest
    ///
    /// Returns `true` if a request was in flight.
    pub fn stop_speaking(&self) -> bool {
        let Some(active) = self.lock_active().take() else {
            return false;
        };
        tracing::info!(request = active.id, "speech stopped");
        active.cancel.raise();
        if let Some(engine) = &self.engine {
            engine.cancel();
        }
        self.events.emit(VoiceEvent::SpeakingChanged { speaking: false });
        true
    }

    /// Speak a request, cancelling any request already in flight
    pub async fn speak(&self, request: &SpeechOutputRequest) -> SpeechOutcome {
        if request.text.trim().is_empty() {
            tracing::warn!("ignoring empty speech request");
            return SpeechOutcome::new(OutputTier::None, false);
        }

        let (id, cancel) = self.begin();
        let report = self.probe.probe();

        let outcome = 'tiers: {
            if let Some(bridge) = report.bridge_for(BridgeCapability::SpeechOutput) {
                let invoke = BridgeRequest::Speak {
                    text: request.text.clone(),
                    language_tag: request.language_tag.clone(),
                };
                let result = bridge.try_invoke(&invoke).await;
                if let Err(e) = &result {
                    tracing::warn!(bridge = bridge.name(), error = %e, "bridge speech failed");
                } else {
                    tracing::info!(bridge = bridge.name(), "speech handed to bridge");
                }
                break 'tiers SpeechOutcome::new(OutputTier::Bridge, result.is_ok());
            }

            if let Some(engine) = self.engine.as_ref().filter(|e| e.is_available()) {
                let outcome = self.speak_chunks(engine.as_ref(), request, &cancel).await;
                if outcome.success || outcome.cancelled {
                    break 'tiers outcome;
                }
                self.events.error(
                    VoiceErrorKind::ChunkFailure,
                    format!("all {} speech chunks failed", outcome.chunks.len()),
                );
                if self.play_tone().await {
                    break 'tiers SpeechOutcome {
                        tier: OutputTier::Tone,
                        ..outcome
                    };
                }
                break 'tiers outcome;
            }

            self.events.error(
                VoiceErrorKind::CapabilityUnavailable,
                "no speech output available",
            );
            let tier = if self.play_tone().await {
                OutputTier::Tone
            } else {
                OutputTier::None
            };
            SpeechOutcome::new(tier, false)
        };

        self.finish(id);
        outcome
    }

    async fn speak_chunks(
        &self,
        engine: &dyn SynthesisEngine,
        request: &SpeechOutputRequest,
        cancel: &CancelFlag,
    ) -> SpeechOutcome {
        let mut chunks = chunk_text(&request.text, self.options.max_chunk_chars);
        let total = chunks.len();
        let mut cancelled = false;

        tracing::debug!(chunks = total, engine = engine.name(), "speaking chunked text");

        for i in 0..total {
            if cancel.is_raised() {
                cancelled = true;
                break;
            }

            if i > 0 && !self.options.inter_chunk_pause.is_zero() {
                tokio::select! {
                    () = tokio::time::sleep(self.options.inter_chunk_pause) => {}
                    () = cancel.raised() => {
                        cancelled = true;
                        break;
                    }
                }
            }

            let voices = engine.voices();
            let voice = self
                .selector
                .select(&voices, &request.language_tag, request.gender)
                .cloned();
            let utterance = Utterance {
                text: chunks[i].text.clone(),
                language_tag: request.language_tag.clone(),
                voice,
                style: self.options.style,
            };
            let timeout = self.options.chunk_timeout(&chunks[i]);
            chunks[i].status = ChunkStatus::Speaking;

            // The flag's raiser has already cancelled the engine; cancelling
            // again would stop the utterance of a superseding request
            let status = tokio::select! {
                biased;
                () = cancel.raised() => {
                    cancelled = true;
                    ChunkStatus::Failed
                }
                result = engine.speak(&utterance) => match result {
                    Ok(()) => ChunkStatus::Done,
                    Err(e) => {
                        tracing::warn!(chunk = i, error = %e, "chunk synthesis failed");
                        ChunkStatus::Failed
                    }
                },
                () = tokio::time::sleep(timeout) => {
                    tracing::warn!(chunk = i, ?timeout, "chunk timed out, cancelling");
                    engine.cancel();
                    ChunkStatus::Failed
                }
            };
            chunks[i].status = status;
            tracing::debug!(chunk = i, total, ?status, "chunk finished");

            if cancelled {
                break;
            }
        }

        let success = chunks.iter().any(|c| c.status == ChunkStatus::Done);
        SpeechOutcome {
            tier: OutputTier::Engine,
            success,
            cancelled,
            chunks,
        }
    }

    async fn play_tone(&self) -> bool {
        let Some(tone) = &self.tone else {
            return false;
        };
        match tone
            .play_tone(self.options.tone_frequency_hz, self.options.tone_duration)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "fallback tone failed");
                false
            }
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveRequest>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new request, cancelling the previous one
    fn begin(&self) -> (u64, Arc<CancelFlag>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = Arc::new(CancelFlag::default());
        let previous = self.lock_active().replace(ActiveRequest {
            id,
            cancel: Arc::clone(&cancel),
        });

        match previous {
            Some(previous) => {
                tracing::debug!(previous = previous.id, request = id, "superseding speech");
                previous.cancel.raise();
                if let Some(engine) = &self.engine {
                    engine.cancel();
                }
            }
            None => self.events.emit(VoiceEvent::SpeakingChanged { speaking: true }),
        }
        (id, cancel)
    }

    /// Clear the active slot if it still belongs to `id`
    fn finish(&self, id: u64) {
        let mut active = self.lock_active();
        if active.as_ref().is_some_and(|a| a.id == id) {
            *active = None;
            drop(active);
            self.events.emit(VoiceEvent::SpeakingChanged { speaking: false });
        }
    }
}

impl std::fmt::Debug for SpeechOutputResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechOutputResolver")
            .field("engine", &self.engine.as_ref().map(|e| e.name().to_string()))
            .field("has_tone", &self.tone.is_some())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
