//! Cloud TTS synthesis with local playback

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{SynthesisEngine, Utterance};
use crate::voice::{
    AudioPlayback, MULTILINGUAL_TAG, PlaybackOutcome, TextToSpeech, TtsProvider, VoiceCandidate,
    decode_mp3,
};
use crate::{Error, Result};

/// Built-in `OpenAI` voices; all of them speak every supported language
const OPENAI_VOICES: &[(&str, &str)] = &[
    ("nova", "Nova (female)"),
    ("shimmer", "Shimmer (female)"),
    ("alloy", "Alloy (female)"),
    ("onyx", "Onyx (male)"),
    ("echo", "Echo (male)"),
    ("fable", "Fable (male)"),
];

/// Synthesis engine backed by a cloud TTS API and the default speaker
pub struct CloudSynthesisEngine {
    tts: TextToSpeech,
    default_voice: String,
    voices: Vec<VoiceCandidate>,
    in_flight: Mutex<Option<Arc<AtomicBool>>>,
}

impl CloudSynthesisEngine {
    /// `voices` empty means the provider's built-in catalog
    #[must_use]
    pub fn new(tts: TextToSpeech, default_voice: String, voices: Vec<VoiceCandidate>) -> Self {
        let voices = if voices.is_empty() && tts.provider() == TtsProvider::OpenAI {
            OPENAI_VOICES
                .iter()
                .map(|(id, name)| VoiceCandidate::new(id, MULTILINGUAL_TAG, name))
                .collect()
        } else {
            voices
        };

        Self {
            tts,
            default_voice,
            voices,
            in_flight: Mutex::new(None),
        }
    }

    /// Register a fresh cancel flag, cancelling any previous one
    fn begin(&self) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        if let Ok(mut slot) = self.in_flight.lock()
            && let Some(previous) = slot.replace(Arc::clone(&flag))
        {
            previous.store(true, Ordering::Release);
        }
        flag
    }

    fn finish(&self, flag: &Arc<AtomicBool>) {
        if let Ok(mut slot) = self.in_flight.lock()
            && slot.as_ref().is_some_and(|f| Arc::ptr_eq(f, flag))
        {
            *slot = None;
        }
    }
}

#[async_trait]
impl SynthesisEngine for CloudSynthesisEngine {
    fn name(&self) -> &'static str {
        "cloud"
    }

    fn is_available(&self) -> bool {
        use cpal::traits::HostTrait;
        cpal::default_host().default_output_device().is_some()
    }

    fn voices(&self) -> Vec<VoiceCandidate> {
        self.voices.clone()
    }

    async fn speak(&self, utterance: &Utterance) -> Result<()> {
        let cancel = self.begin();
        let voice = utterance
            .voice
            .as_ref()
            .map_or(self.default_voice.as_str(), |v| v.identifier.as_str());

        if (utterance.style.pitch - 1.0).abs() > f32::EPSILON {
            tracing::trace!(pitch = utterance.style.pitch, "pitch not supported by cloud TTS");
        }

        let result: Result<()> = async {
            let audio = self
                .tts
                .synthesize(&utterance.text, voice, utterance.style.rate)
                .await?;

            if cancel.load(Ordering::Acquire) {
                return Err(Error::Tts("cancelled".to_string()));
            }

            let volume = utterance.style.volume;
            let flag = Arc::clone(&cancel);
            let outcome = tokio::task::spawn_blocking(move || {
                let mut clip = decode_mp3(&audio)?;
                clip.apply_volume(volume);
                AudioPlayback::open(clip.sample_rate)?.play_blocking(clip, &flag)
            })
            .await
            .map_err(|e| Error::Audio(format!("playback task failed: {e}")))??;

            match outcome {
                PlaybackOutcome::Finished => Ok(()),
                PlaybackOutcome::Cancelled => Err(Error::Tts("cancelled".to_string())),
            }
        }
        .await;

        self.finish(&cancel);
        result
    }

    fn cancel(&self) {
        if let Ok(mut slot) = self.in_flight.lock()
            && let Some(flag) = slot.take()
        {
            flag.store(true, Ordering::Release);
            tracing::debug!("synthesis cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    #[test]
    fn openai_catalog_is_multilingual() {
        let tts = TextToSpeech::new(TtsProvider::OpenAI, SecretString::from("k".to_string()), None)
            .unwrap();
        let engine = CloudSynthesisEngine::new(tts, "nova".into(), Vec::new());
        let voices = engine.voices();
        assert_eq!(voices.len(), OPENAI_VOICES.len());
        assert!(voices.iter().all(|v| v.language_tag == MULTILINGUAL_TAG));
    }

    #[test]
    fn cancel_raises_in_flight_flag() {
        let tts = TextToSpeech::new(TtsProvider::OpenAI, SecretString::from("k".to_string()), None)
            .unwrap();
        let engine = CloudSynthesisEngine::new(tts, "nova".into(), Vec::new());
        let first = engine.begin();
        let second = engine.begin();
        assert!(first.load(Ordering::Acquire));
        engine.cancel();
        assert!(second.load(Ordering::Acquire));
    }
}
