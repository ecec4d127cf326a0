//! Speaker tone fallback

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use async_trait::async_trait;

use super::TonePlayer;
use crate::voice::{AudioPlayback, PLAYBACK_SAMPLE_RATE, tone};
use crate::{Error, Result};

/// Plays a sine tone on the default output device
#[derive(Debug, Clone, Copy)]
pub struct SpeakerTone {
    volume: f32,
}

impl SpeakerTone {
    #[must_use]
    pub const fn new(volume: f32) -> Self {
        Self { volume }
    }
}

impl Default for SpeakerTone {
    fn default() -> Self {
        Self::new(0.3)
    }
}

#[async_trait]
impl TonePlayer for SpeakerTone {
    async fn play_tone(&self, frequency_hz: f32, duration: Duration) -> Result<()> {
        let volume = self.volume;
        tokio::task::spawn_blocking(move || {
            let clip = tone(frequency_hz, duration, PLAYBACK_SAMPLE_RATE, volume);
            let never = AtomicBool::new(false);
            AudioPlayback::open(PLAYBACK_SAMPLE_RATE)?.play_blocking(clip, &never)
        })
        .await
        .map_err(|e| Error::Audio(format!("tone task failed: {e}")))??;

        tracing::debug!(frequency_hz, ?duration, "fallback tone played");
        Ok(())
    }
}
