//! Energy-based utterance endpointing
//!
//! Splits a live microphone stream into utterances so each one can be sent
//! to a batch transcription API.

use super::capture::SAMPLE_RATE;

/// Minimum RMS energy considered speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum speech before an utterance is worth transcribing (0.3 s)
const MIN_SPEECH_SAMPLES: usize = SAMPLE_RATE as usize * 3 / 10;

/// Trailing silence that ends an utterance (0.5 s)
const SILENCE_SAMPLES: usize = SAMPLE_RATE as usize / 2;

/// Hard cap on one utterance (15 s)
const MAX_UTTERANCE_SAMPLES: usize = SAMPLE_RATE as usize * 15;

/// Endpointer tuning
#[derive(Debug, Clone, Copy)]
pub struct EndpointConfig {
    pub energy_threshold: f32,
    pub min_speech_samples: usize,
    pub silence_samples: usize,
    pub max_utterance_samples: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            energy_threshold: ENERGY_THRESHOLD,
            min_speech_samples: MIN_SPEECH_SAMPLES,
            silence_samples: SILENCE_SAMPLES,
            max_utterance_samples: MAX_UTTERANCE_SAMPLES,
        }
    }
}

/// Endpointer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// Waiting for speech
    Quiet,
    /// Accumulating an utterance
    InSpeech,
}

/// Segments audio into utterances by energy
#[derive(Debug)]
pub struct Endpointer {
    config: EndpointConfig,
    state: EndpointState,
    buffer: Vec<f32>,
    silence: usize,
}

impl Endpointer {
    #[must_use]
    pub const fn new(config: EndpointConfig) -> Self {
        Self {
            config,
            state: EndpointState::Quiet,
            buffer: Vec::new(),
            silence: 0,
        }
    }

    /// Feed samples; returns a finished utterance when one completes
    pub fn push(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        if samples.is_empty() {
            return None;
        }

        let energy = rms_energy(samples);
        let is_speech = energy > self.config.energy_threshold;

        match self.state {
            EndpointState::Quiet => {
                if is_speech {
                    self.state = EndpointState::InSpeech;
                    self.buffer.clear();
                    self.buffer.extend_from_slice(samples);
                    self.silence = 0;
                    tracing::trace!(energy, "speech onset");
                }
                None
            }
            EndpointState::InSpeech => {
                self.buffer.extend_from_slice(samples);
                if is_speech {
                    self.silence = 0;
                } else {
                    self.silence += samples.len();
                }

                let voiced = self.buffer.len().saturating_sub(self.silence);

                if self.buffer.len() >= self.config.max_utterance_samples {
                    tracing::debug!(samples = self.buffer.len(), "utterance hit length cap");
                    return Some(self.finish());
                }

                if self.silence > self.config.silence_samples {
                    if voiced >= self.config.min_speech_samples {
                        tracing::debug!(samples = self.buffer.len(), "utterance complete");
                        return Some(self.finish());
                    }
                    // Too short: a click or a cough
                    tracing::trace!(voiced, "discarding short burst");
                    self.reset();
                }
                None
            }
        }
    }

    /// Flush whatever speech is buffered, if long enough
    pub fn flush(&mut self) -> Option<Vec<f32>> {
        let voiced = self.buffer.len().saturating_sub(self.silence);
        if self.state == EndpointState::InSpeech && voiced >= self.config.min_speech_samples {
            Some(self.finish())
        } else {
            self.reset();
            None
        }
    }

    #[must_use]
    pub const fn state(&self) -> EndpointState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = EndpointState::Quiet;
        self.buffer.clear();
        self.silence = 0;
    }

    fn finish(&mut self) -> Vec<f32> {
        let utterance = std::mem::take(&mut self.buffer);
        self.reset();
        utterance
    }
}

impl Default for Endpointer {
    fn default() -> Self {
        Self::new(EndpointConfig::default())
    }
}

/// RMS energy of a block of samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> EndpointConfig {
        EndpointConfig {
            energy_threshold: 0.1,
            min_speech_samples: 100,
            silence_samples: 50,
            max_utterance_samples: 1000,
        }
    }

    #[test]
    fn energy_calculation() {
        assert!(rms_energy(&[0.0; 100]) < 0.001);
        assert!(rms_energy(&[0.5; 100]) > 0.4);
        assert!(rms_energy(&[]).abs() < f32::EPSILON);
    }

    #[test]
    fn emits_utterance_after_trailing_silence() {
        let mut ep = Endpointer::new(small());
        assert!(ep.push(&[0.0; 40]).is_none());
        assert!(ep.push(&[0.5; 120]).is_none());
        assert_eq!(ep.state(), EndpointState::InSpeech);
        assert!(ep.push(&[0.0; 40]).is_none());
        let utterance = ep.push(&[0.0; 40]).unwrap();
        assert_eq!(utterance.len(), 200);
        assert_eq!(ep.state(), EndpointState::Quiet);
    }

    #[test]
    fn drops_short_bursts() {
        let mut ep = Endpointer::new(small());
        ep.push(&[0.5; 20]);
        assert!(ep.push(&[0.0; 60]).is_none());
        assert_eq!(ep.state(), EndpointState::Quiet);
    }

    #[test]
    fn caps_long_utterances() {
        let mut ep = Endpointer::new(small());
        let mut out = None;
        for _ in 0..20 {
            out = out.or_else(|| ep.push(&[0.5; 100]));
        }
        assert_eq!(out.map(|u| u.len()), Some(1000));
    }

    #[test]
    fn flush_returns_pending_speech() {
        let mut ep = Endpointer::new(small());
        ep.push(&[0.5; 150]);
        assert_eq!(ep.flush().map(|u| u.len()), Some(150));
        assert!(ep.flush().is_none());
    }
}
