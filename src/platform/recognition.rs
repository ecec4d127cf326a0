//! Microphone + cloud transcription recognizer

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use super::{
    RecognitionEngine, RecognitionErrorKind, RecognitionEvent, Recognizer, RecognizerOptions,
};
use crate::voice::{
    AudioCapture, EndpointConfig, Endpointer, SAMPLE_RATE, SpeechToText, samples_to_wav,
};
use crate::{Error, Result};

/// How often the capture thread drains the microphone buffer
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Recognition engine backed by the default microphone and a cloud STT API
pub struct CloudRecognitionEngine {
    stt: Arc<SpeechToText>,
    endpoint: EndpointConfig,
    no_speech_timeout: Duration,
}

impl CloudRecognitionEngine {
    /// `no_speech_timeout` bounds how long a one-shot recognizer waits for speech
    #[must_use]
    pub fn new(stt: SpeechToText, no_speech_timeout: Duration) -> Self {
        Self {
            stt: Arc::new(stt),
            endpoint: EndpointConfig::default(),
            no_speech_timeout,
        }
    }

    #[must_use]
    pub const fn with_endpoint(mut self, endpoint: EndpointConfig) -> Self {
        self.endpoint = endpoint;
        self
    }
}

impl RecognitionEngine for CloudRecognitionEngine {
    fn name(&self) -> &'static str {
        "cloud"
    }

    fn is_available(&self) -> bool {
        use cpal::traits::HostTrait;
        cpal::default_host().default_input_device().is_some()
    }

    fn create(&self, options: &RecognizerOptions) -> Result<Box<dyn Recognizer>> {
        Ok(Box::new(CloudRecognizer {
            stt: Arc::clone(&self.stt),
            options: options.clone(),
            endpoint: self.endpoint,
            no_speech_timeout: self.no_speech_timeout,
            running: None,
        }))
    }
}

/// What the capture thread hands to the transcription task
enum Captured {
    Opened,
    Utterance(Vec<f32>),
    Failed(RecognitionErrorKind),
}

struct Running {
    stop: Arc<AtomicBool>,
    abort: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

struct CloudRecognizer {
    stt: Arc<SpeechToText>,
    options: RecognizerOptions,
    endpoint: EndpointConfig,
    no_speech_timeout: Duration,
    running: Option<Running>,
}

impl Recognizer for CloudRecognizer {
    fn start(&mut self, events: mpsc::UnboundedSender<RecognitionEvent>) -> Result<()> {
        if self.running.is_some() {
            return Err(Error::Recognition("recognizer already started".to_string()));
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Recognition(format!("no async runtime: {e}")))?;

        let stop = Arc::new(AtomicBool::new(false));
        let abort = Arc::new(AtomicBool::new(false));
        let (captured_tx, captured_rx) = mpsc::unbounded_channel();

        let thread = {
            let stop = Arc::clone(&stop);
            let endpoint = self.endpoint;
            let continuous = self.options.continuous;
            let no_speech_timeout = self.no_speech_timeout;
            std::thread::Builder::new()
                .name("astrova-capture".to_string())
                .spawn(move || {
                    capture_loop(&captured_tx, &stop, endpoint, continuous, no_speech_timeout);
                })
                .map_err(Error::Io)?
        };

        runtime.spawn(transcribe_loop(
            Arc::clone(&self.stt),
            self.options.clone(),
            captured_rx,
            events,
            Arc::clone(&abort),
        ));

        tracing::debug!(
            language_tag = %self.options.language_tag,
            continuous = self.options.continuous,
            "cloud recognizer started"
        );

        self.running = Some(Running {
            stop,
            abort,
            thread: Some(thread),
        });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(running) = &self.running {
            running.stop.store(true, Ordering::Release);
        }
    }

    fn abort(&mut self) {
        if let Some(mut running) = self.running.take() {
            running.abort.store(true, Ordering::Release);
            running.stop.store(true, Ordering::Release);
            // Joining guarantees the microphone is released on return
            if let Some(thread) = running.thread.take()
                && thread.join().is_err()
            {
                tracing::warn!("capture thread panicked");
            }
        }
    }
}

impl Drop for CloudRecognizer {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Owns the microphone; cpal streams are not `Send`
fn capture_loop(
    out: &mpsc::UnboundedSender<Captured>,
    stop: &AtomicBool,
    endpoint: EndpointConfig,
    continuous: bool,
    no_speech_timeout: Duration,
) {
    let mut capture = match AudioCapture::open().and_then(|mut c| c.start().map(|()| c)) {
        Ok(capture) => capture,
        Err(e) => {
            tracing::warn!(error = %e, "failed to open microphone");
            let _ = out.send(Captured::Failed(RecognitionErrorKind::from_error(&e)));
            return;
        }
    };

    let _ = out.send(Captured::Opened);
    let mut endpointer = Endpointer::new(endpoint);
    let started = Instant::now();

    loop {
        if stop.load(Ordering::Acquire) {
            if let Some(utterance) = endpointer.flush() {
                let _ = out.send(Captured::Utterance(utterance));
            }
            break;
        }

        std::thread::sleep(POLL_INTERVAL);

        if let Some(utterance) = endpointer.push(&capture.take_buffer()) {
            if out.send(Captured::Utterance(utterance)).is_err() {
                break;
            }
            if !continuous {
                break;
            }
        }

        if !continuous
            && endpointer.state() == crate::voice::EndpointState::Quiet
            && started.elapsed() > no_speech_timeout
        {
            let _ = out.send(Captured::Failed(RecognitionErrorKind::NoSpeech));
            break;
        }
    }

    capture.stop();
    tracing::debug!("microphone released");
}

async fn transcribe_loop(
    stt: Arc<SpeechToText>,
    options: RecognizerOptions,
    mut captured: mpsc::UnboundedReceiver<Captured>,
    events: mpsc::UnboundedSender<RecognitionEvent>,
    abort: Arc<AtomicBool>,
) {
    let aborted = || abort.load(Ordering::Acquire);

    while let Some(item) = captured.recv().await {
        if aborted() {
            break;
        }
        let event = match item {
            Captured::Opened => RecognitionEvent::Started,
            Captured::Failed(kind) => RecognitionEvent::Error(kind),
            Captured::Utterance(samples) => {
                match transcribe(&stt, &samples, &options.language_tag).await {
                    Ok(Some((text, confidence))) => RecognitionEvent::Result {
                        transcript: text,
                        confidence,
                        is_final: true,
                    },
                    Ok(None) if options.continuous => continue,
                    Ok(None) => RecognitionEvent::Error(RecognitionErrorKind::NoSpeech),
                    Err(e) => {
                        tracing::warn!(error = %e, "transcription failed");
                        RecognitionEvent::Error(RecognitionErrorKind::from_error(&e))
                    }
                }
            }
        };
        if aborted() || events.send(event).is_err() {
            break;
        }
    }

    if !aborted() {
        let _ = events.send(RecognitionEvent::Ended);
    }
}

async fn transcribe(
    stt: &SpeechToText,
    samples: &[f32],
    language_tag: &str,
) -> Result<Option<(String, Option<f32>)>> {
    let wav = samples_to_wav(samples, SAMPLE_RATE)?;
    let result = stt.transcribe(&wav, language_tag).await?;
    if result.text.is_empty() {
        Ok(None)
    } else {
        Ok(Some((result.text, result.confidence)))
    }
}
