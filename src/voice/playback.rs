//! Audio playback to speakers

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};

use crate::{Error, Result};

/// Sample rate of `OpenAI` TTS output
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Decoded mono audio ready for playback
#[derive(Debug, Clone, Default)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioClip {
    /// Playback length of the clip
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// Scale every sample by `volume` (clamped to `0.0..=1.0`)
    pub fn apply_volume(&mut self, volume: f32) {
        let gain = volume.clamp(0.0, 1.0);
        if (gain - 1.0).abs() < f32::EPSILON {
            return;
        }
        for sample in &mut self.samples {
            *sample *= gain;
        }
    }
}

/// How a blocking playback ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Finished,
    Cancelled,
}

/// Plays audio to the default output device
///
/// The underlying cpal stream is not `Send`, so playback runs on the calling
/// thread. Async callers should wrap it in `spawn_blocking`.
pub struct AudioPlayback {
    device: Device,
    config: StreamConfig,
}

impl AudioPlayback {
    /// Open the default output device at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn open(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supports_rate = |c: &cpal::SupportedStreamConfigRange| {
            c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        };

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| c.channels() == 1 && supports_rate(c))
            .or_else(|| {
                // Fallback: try stereo
                device
                    .supported_output_configs()
                    .ok()?
                    .find(|c| c.channels() == 2 && supports_rate(c))
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self { device, config })
    }

    /// Play a clip, returning early when `cancel` is raised
    ///
    /// # Errors
    ///
    /// Returns error if the output stream cannot be built
    pub fn play_blocking(&self, clip: AudioClip, cancel: &AtomicBool) -> Result<PlaybackOutcome> {
        if clip.samples.is_empty() {
            return Ok(PlaybackOutcome::Finished);
        }

        let channels = usize::from(self.config.channels);
        let expected = clip.duration();
        let sample_count = clip.samples.len();

        let samples = Arc::new(clip.samples);
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);
            self.device
                .build_output_stream(
                    &self.config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut pos = position.load(Ordering::Relaxed);
                        for frame in data.chunks_mut(channels) {
                            let sample = samples.get(pos).copied().unwrap_or_else(|| {
                                finished.store(true, Ordering::Release);
                                0.0
                            });
                            frame.fill(sample);
                            if pos < samples.len() {
                                pos += 1;
                            }
                        }
                        position.store(pos, Ordering::Relaxed);
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let start = Instant::now();
        let deadline = expected + Duration::from_millis(500);
        let mut outcome = PlaybackOutcome::Finished;

        while !finished.load(Ordering::Acquire) {
            if cancel.load(Ordering::Acquire) {
                outcome = PlaybackOutcome::Cancelled;
                break;
            }
            if start.elapsed() > deadline {
                tracing::warn!(samples = sample_count, "playback overran, stopping");
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        if outcome == PlaybackOutcome::Finished {
            // Let the device drain its last buffer
            std::thread::sleep(Duration::from_millis(100));
        }

        drop(stream);
        tracing::debug!(samples = sample_count, ?outcome, "playback complete");

        Ok(outcome)
    }
}

/// Decode MP3 bytes to a mono clip
///
/// # Errors
///
/// Returns error if the data is not valid MP3
pub fn decode_mp3(mp3_data: &[u8]) -> Result<AudioClip> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut clip = AudioClip {
        samples: Vec::new(),
        sample_rate: PLAYBACK_SAMPLE_RATE,
    };

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if let Ok(rate) = u32::try_from(frame.sample_rate) {
                    clip.sample_rate = rate;
                }
                if frame.channels == 2 {
                    clip.samples.extend(frame.data.chunks(2).map(|pair| {
                        let left = f32::from(pair[0]) / 32768.0;
                        let right = f32::from(pair.get(1).copied().unwrap_or(pair[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    clip.samples
                        .extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(clip)
}

/// Generate a sine tone with short fades to avoid clicks
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn tone(frequency_hz: f32, duration: Duration, sample_rate: u32, volume: f32) -> AudioClip {
    let total = (duration.as_secs_f64() * f64::from(sample_rate)) as usize;
    let fade = (total / 10).max(1);
    let step = std::f32::consts::TAU * frequency_hz / sample_rate as f32;

    let samples = (0..total)
        .map(|i| {
            let envelope = if i < fade {
                i as f32 / fade as f32
            } else if i + fade > total {
                (total - i) as f32 / fade as f32
            } else {
                1.0
            };
            (step * i as f32).sin() * volume * envelope
        })
        .collect();

    AudioClip {
        samples,
        sample_rate,
    }
}
