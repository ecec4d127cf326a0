//! Wake word session runtime
//!
//! Drives a [`WakeWordMachine`] with a real recognizer and a tokio timer.
//! The machine and the owned recognizer/timer handles live behind one
//! mutex that is never held across an await; events are sent only after the
//! lock is released.
//!
//! Aborting a recognizer may block while its capture thread winds down, so
//! closed recognizers are aborted after the state lock is dropped. The
//! `device` lock orders those aborts before any later open.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::wake_word::{
    SessionAction, SessionInput, SessionState, WakeWordMachine, WakeWordOptions,
};
use crate::events::{EventSink, VoiceEvent};
use crate::platform::{
    RecognitionEngine, RecognitionErrorKind, RecognitionEvent, Recognizer, RecognizerOptions,
};

/// Long-lived background listener for the activation phrase
///
/// Cloning yields another handle to the same session. Must be used from
/// within a tokio runtime.
#[derive(Clone)]
pub struct WakeWordSession {
    inner: Arc<Inner>,
}

struct Inner {
    engine: Arc<dyn RecognitionEngine>,
    recognizer_options: RecognizerOptions,
    events: EventSink,
    core: Mutex<Core>,
    /// Held while a recognizer is aborted or opened; taken after `core`
    device: Mutex<()>,
}

struct Core {
    machine: WakeWordMachine,
    recognizer: Option<Box<dyn Recognizer>>,
    timer: Option<JoinHandle<()>>,
}

impl WakeWordSession {
    #[must_use]
    pub fn new(
        engine: Arc<dyn RecognitionEngine>,
        options: &WakeWordOptions,
        events: EventSink,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                recognizer_options: RecognizerOptions::continuous(&options.language_tag),
                events,
                core: Mutex::new(Core {
                    machine: WakeWordMachine::new(options),
                    recognizer: None,
                    timer: None,
                }),
                device: Mutex::new(()),
            }),
        }
    }

    /// Begin listening; no-op while already starting or listening
    ///
    /// Returns `false` once the session has been destroyed.
    pub fn start(&self) -> bool {
        if self.state() == SessionState::Destroyed {
            tracing::warn!("start() on destroyed wake word session");
            return false;
        }
        self.inner.dispatch(SessionInput::Start);
        true
    }

    /// Release the microphone and go idle
    pub fn stop(&self) {
        self.inner.dispatch(SessionInput::Stop);
    }

    /// Reset the error counter and relisten after a short delay
    pub fn restart(&self) {
        self.inner.dispatch(SessionInput::Restart);
    }

    /// Terminal: cancels the timer and releases the microphone before returning
    pub fn destroy(&self) {
        self.inner.dispatch(SessionInput::Destroy);
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.lock().machine.state()
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.inner.lock().machine.is_halted()
    }

    #[must_use]
    pub fn consecutive_errors(&self) -> u32 {
        self.inner.lock().machine.consecutive_errors()
    }

    /// Whether a recognizer currently holds the microphone
    #[must_use]
    pub fn holds_recognizer(&self) -> bool {
        self.inner.lock().recognizer.is_some()
    }
}

impl std::fmt::Debug for WakeWordSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WakeWordSession")
            .field("engine", &self.inner.engine.name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_device(&self) -> MutexGuard<'_, ()> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(self: &Arc<Self>, input: SessionInput) {
        let mut outbox = Vec::new();
        let mut released = Vec::new();
        {
            let mut core = self.lock();
            let mut queue = VecDeque::from([input]);

            while let Some(input) = queue.pop_front() {
                let before = core.machine.state();
                let actions = core.machine.handle(input);
                let after = core.machine.state();
                if before != after {
                    tracing::debug!(from = %before, to = %after, "wake word transition");
                }

                for action in actions {
                    match action {
                        SessionAction::OpenRecognizer { generation } => {
                            // Closed in this same pass: release before reopening
                            abort_all(&mut released);
                            if let Some(followup) = self.open_recognizer(&mut core, generation) {
                                queue.push_back(followup);
                            }
                        }
                        SessionAction::CloseRecognizer => {
                            released.extend(core.recognizer.take());
                        }
                        SessionAction::ScheduleRestart { delay, token } => {
                            if let Some(timer) = core.timer.take() {
                                timer.abort();
                            }
                            let weak = Arc::downgrade(self);
                            core.timer = Some(tokio::spawn(async move {
                                tokio::time::sleep(delay).await;
                                if let Some(inner) = weak.upgrade() {
                                    inner.dispatch(SessionInput::TimerElapsed { token });
                                }
                            }));
                        }
                        SessionAction::CancelRestart => {
                            if let Some(timer) = core.timer.take() {
                                timer.abort();
                            }
                        }
                        SessionAction::Emit(event) => outbox.push(event),
                    }
                }
            }
        }

        if !released.is_empty() {
            let _device = self.lock_device();
            abort_all(&mut released);
        }

        for event in outbox {
            match event {
                VoiceEvent::Error { kind, message } => self.events.error(kind, message),
                other => self.events.emit(other),
            }
        }
    }

    /// Start a recognizer; a failure becomes a follow-up input
    fn open_recognizer(
        self: &Arc<Self>,
        core: &mut Core,
        generation: u64,
    ) -> Option<SessionInput> {
        let _device = self.lock_device();
        if let Some(mut previous) = core.recognizer.take() {
            previous.abort();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let started = self
            .engine
            .create(&self.recognizer_options)
            .and_then(|mut recognizer| recognizer.start(tx).map(|()| recognizer));

        match started {
            Ok(recognizer) => {
                tracing::debug!(
                    generation,
                    engine = self.engine.name(),
                    "wake word recognizer opened"
                );
                core.recognizer = Some(recognizer);
                tokio::spawn(pump(Arc::downgrade(self), rx, generation));
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to open wake word recognizer");
                Some(SessionInput::RecognizerError {
                    generation,
                    kind: RecognitionErrorKind::from_error(&e),
                })
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let core = self.core.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut recognizer) = core.recognizer.take() {
            recognizer.abort();
        }
        if let Some(timer) = core.timer.take() {
            timer.abort();
        }
    }
}

fn abort_all(recognizers: &mut Vec<Box<dyn Recognizer>>) {
    for mut recognizer in recognizers.drain(..) {
        recognizer.abort();
    }
}

/// Forward recognizer events into the machine, tagged with their generation
async fn pump(
    session: Weak<Inner>,
    mut events: mpsc::UnboundedReceiver<RecognitionEvent>,
    generation: u64,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = session.upgrade() else {
            return;
        };
        let input = match event {
            RecognitionEvent::Started => SessionInput::RecognizerReady { generation },
            RecognitionEvent::Result { transcript, .. } => SessionInput::Transcript {
                generation,
                text: transcript,
            },
            RecognitionEvent::Error(kind) => SessionInput::RecognizerError { generation, kind },
            RecognitionEvent::Ended => SessionInput::RecognizerEnded { generation },
        };
        inner.dispatch(input);
    }
}
