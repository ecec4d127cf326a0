//! Shared test utilities
//!
//! In-memory stand-ins for recognizers, synthesis engines, bridges, tones and
//! the response service. Nothing here touches audio hardware or the network.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};

use astrova_voice::bridge::{BridgeCapability, BridgeRequest, BridgeTranscript, CapabilityProvider};
use astrova_voice::platform::{
    RecognitionEngine, RecognitionErrorKind, RecognitionEvent, Recognizer, RecognizerOptions,
    SynthesisEngine, TonePlayer, Utterance,
};
use astrova_voice::response::ResponseService;
use astrova_voice::voice::VoiceCandidate;
use astrova_voice::{Error, Result, VoiceEvent};

/// Let spawned tasks run; with paused time this advances the clock by 1ms
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Collect every event queued so far
pub fn drain(rx: &mut mpsc::UnboundedReceiver<VoiceEvent>) -> Vec<VoiceEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// -- recognition ----------------------------------------------------------

#[derive(Default)]
struct EngineState {
    available: bool,
    created: usize,
    live: usize,
    max_live: usize,
    options: Vec<RecognizerOptions>,
    current: Option<mpsc::UnboundedSender<RecognitionEvent>>,
    start_failures: VecDeque<Error>,
    /// Scripted result for one-shot recognizers; `None` means silence
    foreground_transcript: Option<String>,
    /// Runs after a recognizer is aborted, outside the engine's own lock
    abort_hook: Option<AbortHook>,
}

type AbortHook = Arc<dyn Fn() + Send + Sync>;

/// Recognition engine whose recognizers are driven from the test
///
/// Continuous recognizers report `Started` and then wait for
/// [`emit`](Self::emit). One-shot recognizers play back the scripted
/// foreground transcript and end.
#[derive(Clone)]
pub struct FakeRecognitionEngine {
    state: Arc<Mutex<EngineState>>,
}

impl FakeRecognitionEngine {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(EngineState {
                available: true,
                ..EngineState::default()
            })),
        }
    }

    pub fn unavailable() -> Self {
        let engine = Self::new();
        engine.state.lock().unwrap().available = false;
        engine
    }

    /// Make the next `start()` calls fail with these errors, in order
    pub fn fail_next_starts(&self, errors: impl IntoIterator<Item = Error>) {
        self.state.lock().unwrap().start_failures.extend(errors);
    }

    pub fn on_abort(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.state.lock().unwrap().abort_hook = Some(Arc::new(hook));
    }

    pub fn clear_abort_hook(&self) {
        self.state.lock().unwrap().abort_hook = None;
    }

    pub fn set_foreground_transcript(&self, transcript: Option<&str>) {
        self.state.lock().unwrap().foreground_transcript = transcript.map(str::to_string);
    }

    /// Send an event to the most recently started recognizer
    pub fn emit(&self, event: RecognitionEvent) {
        let state = self.state.lock().unwrap();
        if let Some(tx) = &state.current {
            let _ = tx.send(event);
        }
    }

    pub fn emit_error(&self, kind: RecognitionErrorKind) {
        self.emit(RecognitionEvent::Error(kind));
        self.emit(RecognitionEvent::Ended);
    }

    pub fn emit_transcript(&self, text: &str) {
        self.emit(RecognitionEvent::Result {
            transcript: text.to_string(),
            confidence: Some(0.9),
            is_final: true,
        });
    }

    /// Recognizers created so far
    pub fn created(&self) -> usize {
        self.state.lock().unwrap().created
    }

    /// Recognizers currently holding the microphone
    pub fn live(&self) -> usize {
        self.state.lock().unwrap().live
    }

    /// Highest number of simultaneously live recognizers ever observed
    pub fn max_live(&self) -> usize {
        self.state.lock().unwrap().max_live
    }

    pub fn options(&self) -> Vec<RecognizerOptions> {
        self.state.lock().unwrap().options.clone()
    }
}

impl RecognitionEngine for FakeRecognitionEngine {
    fn name(&self) -> &str {
        "fake"
    }

    fn is_available(&self) -> bool {
        self.state.lock().unwrap().available
    }

    fn create(&self, options: &RecognizerOptions) -> Result<Box<dyn Recognizer>> {
        let mut state = self.state.lock().unwrap();
        state.created += 1;
        state.options.push(options.clone());
        Ok(Box::new(FakeRecognizer {
            state: Arc::clone(&self.state),
            continuous: options.continuous,
            holding: false,
        }))
    }
}

struct FakeRecognizer {
    state: Arc<Mutex<EngineState>>,
    continuous: bool,
    holding: bool,
}

impl FakeRecognizer {
    fn release(&mut self) {
        if self.holding {
            self.holding = false;
            self.state.lock().unwrap().live -= 1;
        }
    }
}

impl Recognizer for FakeRecognizer {
    fn start(&mut self, events: mpsc::UnboundedSender<RecognitionEvent>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.start_failures.pop_front() {
            return Err(error);
        }

        state.live += 1;
        state.max_live = state.max_live.max(state.live);
        self.holding = true;

        let _ = events.send(RecognitionEvent::Started);
        if !self.continuous {
            if let Some(transcript) = state.foreground_transcript.clone() {
                let _ = events.send(RecognitionEvent::Result {
                    transcript,
                    confidence: Some(0.95),
                    is_final: true,
                });
            }
            let _ = events.send(RecognitionEvent::Ended);
        }
        state.current = Some(events);
        Ok(())
    }

    fn stop(&mut self) {
        self.release();
    }

    fn abort(&mut self) {
        self.release();
        let hook = self.state.lock().unwrap().abort_hook.clone();
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl Drop for FakeRecognizer {
    fn drop(&mut self) {
        self.release();
    }
}

// -- synthesis ------------------------------------------------------------

/// How the fake engine handles one `speak` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakBehavior {
    Succeed,
    Fail,
    /// Never resolves; only a timeout or cancel ends it
    Hang,
}

#[derive(Default)]
struct SynthesisState {
    script: VecDeque<SpeakBehavior>,
    spoken: Vec<Utterance>,
    cancels: usize,
}

/// Synthesis engine that records utterances and follows a per-call script
#[derive(Clone)]
pub struct FakeSynthesisEngine {
    state: Arc<Mutex<SynthesisState>>,
    voices: Vec<VoiceCandidate>,
    speak_time: Duration,
    available: Arc<AtomicBool>,
    interrupt: Option<Arc<Notify>>,
}

impl FakeSynthesisEngine {
    pub fn new() -> Self {
        Self {
            state: Arc::default(),
            voices: vec![
                VoiceCandidate::new("us-zira", "en-US", "Microsoft Zira - English (United States)"),
                VoiceCandidate::new("in-heera", "en-IN", "Microsoft Heera - English (India)"),
                VoiceCandidate::new("in-ravi", "en-IN", "Microsoft Ravi - English (India)"),
                VoiceCandidate::new("hi-google", "hi-IN", "Google हिन्दी"),
            ],
            speak_time: Duration::from_millis(100),
            available: Arc::new(AtomicBool::new(true)),
            interrupt: None,
        }
    }

    /// Engine whose `cancel` aborts whatever utterance is playing, like a
    /// real audio device
    pub fn interrupting() -> Self {
        Self {
            interrupt: Some(Arc::new(Notify::new())),
            ..Self::new()
        }
    }

    pub fn with_speak_time(mut self, speak_time: Duration) -> Self {
        self.speak_time = speak_time;
        self
    }

    /// Behaviors for the next calls; unscripted calls succeed
    pub fn script(&self, behaviors: impl IntoIterator<Item = SpeakBehavior>) {
        self.state.lock().unwrap().script.extend(behaviors);
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn spoken(&self) -> Vec<Utterance> {
        self.state.lock().unwrap().spoken.clone()
    }

    pub fn spoken_texts(&self) -> Vec<String> {
        self.spoken().into_iter().map(|u| u.text).collect()
    }

    pub fn cancels(&self) -> usize {
        self.state.lock().unwrap().cancels
    }
}

#[async_trait]
impl SynthesisEngine for FakeSynthesisEngine {
    fn name(&self) -> &str {
        "fake"
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn voices(&self) -> Vec<VoiceCandidate> {
        self.voices.clone()
    }

    async fn speak(&self, utterance: &Utterance) -> Result<()> {
        let behavior = {
            let mut state = self.state.lock().unwrap();
            state.spoken.push(utterance.clone());
            state.script.pop_front().unwrap_or(SpeakBehavior::Succeed)
        };
        let playing = async {
            match behavior {
                SpeakBehavior::Succeed => {
                    tokio::time::sleep(self.speak_time).await;
                    Ok(())
                }
                SpeakBehavior::Fail => Err(Error::Tts("synthesis failed".to_string())),
                SpeakBehavior::Hang => std::future::pending().await,
            }
        };
        match &self.interrupt {
            Some(interrupt) => tokio::select! {
                result = playing => result,
                () = interrupt.notified() => Err(Error::Tts("playback interrupted".to_string())),
            },
            None => playing.await,
        }
    }

    fn cancel(&self) {
        self.state.lock().unwrap().cancels += 1;
        if let Some(interrupt) = &self.interrupt {
            interrupt.notify_waiters();
        }
    }
}

// -- tone -----------------------------------------------------------------

#[derive(Clone, Default)]
pub struct FakeTone {
    plays: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
}

impl FakeTone {
    pub fn failing() -> Self {
        let tone = Self::default();
        tone.fail.store(true, Ordering::SeqCst);
        tone
    }

    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TonePlayer for FakeTone {
    async fn play_tone(&self, _frequency_hz: f32, _duration: Duration) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Audio("no output device".to_string()));
        }
        self.plays.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// -- bridges --------------------------------------------------------------

/// Bridge that records requests and can answer recognition with a transcript
#[derive(Clone)]
pub struct FakeBridge {
    name: String,
    capabilities: Vec<BridgeCapability>,
    reachable: Arc<AtomicBool>,
    fail: Arc<AtomicBool>,
    requests: Arc<Mutex<Vec<BridgeRequest>>>,
    transcripts: Option<mpsc::UnboundedSender<BridgeTranscript>>,
    reply: Option<String>,
}

impl FakeBridge {
    pub fn new(name: &str, capabilities: &[BridgeCapability]) -> Self {
        Self {
            name: name.to_string(),
            capabilities: capabilities.to_vec(),
            reachable: Arc::new(AtomicBool::new(true)),
            fail: Arc::new(AtomicBool::new(false)),
            requests: Arc::default(),
            transcripts: None,
            reply: None,
        }
    }

    /// Answer `StartRecognition` by sending `text` on `tx`
    pub fn with_transcript(
        mut self,
        tx: mpsc::UnboundedSender<BridgeTranscript>,
        text: &str,
    ) -> Self {
        self.transcripts = Some(tx);
        self.reply = Some(text.to_string());
        self
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<BridgeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CapabilityProvider for FakeBridge {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, capability: BridgeCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    async fn try_invoke(&self, request: &BridgeRequest) -> Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Bridge(format!("{} rejected request", self.name)));
        }
        if let (BridgeRequest::StartRecognition { language_tag }, Some(tx), Some(text)) =
            (request, &self.transcripts, &self.reply)
        {
            let _ = tx.send(BridgeTranscript {
                bridge: self.name.clone(),
                text: text.clone(),
                language_tag: Some(language_tag.clone()),
            });
        }
        Ok(())
    }
}

// -- response -------------------------------------------------------------

/// One call to the response service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseCall {
    pub transcript: String,
    pub session_id: String,
    pub language: String,
}

#[derive(Clone)]
pub struct FakeResponseService {
    reply: Option<String>,
    calls: Arc<Mutex<Vec<ResponseCall>>>,
}

impl FakeResponseService {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: Arc::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> Vec<ResponseCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResponseService for FakeResponseService {
    async fn generate(&self, transcript: &str, session_id: &str, language: &str) -> Result<String> {
        self.calls.lock().unwrap().push(ResponseCall {
            transcript: transcript.to_string(),
            session_id: session_id.to_string(),
            language: language.to_string(),
        });
        self.reply
            .clone()
            .ok_or_else(|| Error::Response("service unavailable".to_string()))
    }
}
