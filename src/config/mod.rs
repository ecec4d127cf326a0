//! Configuration management for the voice core
//!
//! Layering: environment variables override the TOML file, which overrides
//! built-in defaults.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::bridge::{SHELL_SOCKET_ENV, SpeechCommand};
use crate::language::{DEFAULT_LANGUAGE, LanguageProfile, default_profiles, speech_tag_for};
use crate::platform::SpeechStyle;
use crate::resolver::OutputOptions;
use crate::retry::{BackoffPolicy, RetryPolicy};
use crate::voice::{
    SttProvider, TtsProvider, VoiceCandidate, VoiceGender, VoiceSelector, WakeWordOptions,
};
use crate::{Error, Result};

pub use file::{VoiceConfigFile, config_file_path, load_config_file};

/// Voice core configuration
#[derive(Debug)]
pub struct Config {
    pub wake: WakeWordOptions,
    pub output: OutputConfig,
    pub input: InputConfig,
    pub language: LanguageConfig,
    pub bridges: BridgesConfig,
    pub response: ResponseConfig,
    pub api_keys: ApiKeys,
}

/// Speech output configuration
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub options: OutputOptions,
    pub gender: VoiceGender,
    pub tts_provider: TtsProvider,
    /// `None` uses the provider default
    pub tts_model: Option<String>,
    /// Voice used when selection finds nothing
    pub voice: String,
    pub voices: Vec<VoiceCandidate>,
    pub selector: VoiceSelector,
}

/// Speech input configuration
#[derive(Debug, Clone)]
pub struct InputConfig {
    /// Upper bound on one foreground capture
    pub capture_timeout: Duration,
    pub stt_provider: SttProvider,
    pub stt_model: String,
}

/// Language detection configuration
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    pub default: String,
    pub auto_detect: bool,
    /// Keyword profiles in priority order
    pub profiles: Vec<LanguageProfile>,
}

/// Native bridge configuration
#[derive(Debug, Clone, Default)]
pub struct BridgesConfig {
    pub shell_socket: Option<PathBuf>,
    pub commands: Vec<SpeechCommand>,
}

/// Response service configuration
#[derive(Debug)]
pub struct ResponseConfig {
    /// Endpoint; `None` disables the assistant loop
    pub url: Option<String>,
    pub api_key: Option<SecretString>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

/// API keys for speech services
#[derive(Debug, Default)]
pub struct ApiKeys {
    pub openai: Option<SecretString>,
    pub elevenlabs: Option<SecretString>,
    pub deepgram: Option<SecretString>,
}

fn ms(value: Option<u64>, default: Duration) -> Duration {
    value.map_or(default, Duration::from_millis)
}

fn secret(value: Option<String>) -> Option<SecretString> {
    value.filter(|v| !v.is_empty()).map(SecretString::from)
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file is unreadable or the merged
    /// configuration is invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = load_config_file(path)?;
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Merge a parsed file with environment lookups from `env`
    ///
    /// # Errors
    ///
    /// Returns error if the merged configuration is invalid
    pub fn resolve(fc: VoiceConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let default_language = env("ASTROVA_LANGUAGE")
            .or(fc.language.default)
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

        let language = LanguageConfig {
            auto_detect: fc.language.auto_detect.unwrap_or(true),
            profiles: if fc.language.profiles.is_empty() {
                default_profiles()
            } else {
                fc.language.profiles
            },
            default: default_language,
        };

        let wake_defaults = WakeWordOptions::default();
        let backoff_defaults = BackoffPolicy::default();
        let wake = WakeWordOptions {
            phrases: fc.wake.phrases.unwrap_or(wake_defaults.phrases),
            max_distance: fc.wake.max_distance.unwrap_or(wake_defaults.max_distance),
            backoff: BackoffPolicy {
                base: ms(fc.wake.backoff_base_ms, backoff_defaults.base),
                step: ms(fc.wake.backoff_step_ms, backoff_defaults.step),
                cap: ms(fc.wake.backoff_cap_ms, backoff_defaults.cap),
                max_consecutive_errors: fc
                    .wake
                    .max_consecutive_errors
                    .unwrap_or(backoff_defaults.max_consecutive_errors),
            },
            restart_delay: ms(fc.wake.restart_delay_ms, wake_defaults.restart_delay),
            rearm_delay: ms(fc.wake.rearm_delay_ms, wake_defaults.rearm_delay),
            language_tag: fc
                .wake
                .language_tag
                .unwrap_or_else(|| speech_tag_for(&language.default)),
        };

        let option_defaults = OutputOptions::default();
        let style_defaults = SpeechStyle::default();
        let selector_defaults = VoiceSelector::default();
        let output = OutputConfig {
            options: OutputOptions {
                max_chunk_chars: fc
                    .output
                    .max_chunk_chars
                    .unwrap_or(option_defaults.max_chunk_chars),
                inter_chunk_pause: ms(
                    fc.output.inter_chunk_pause_ms,
                    option_defaults.inter_chunk_pause,
                ),
                chunk_timeout_floor: ms(
                    fc.output.chunk_timeout_floor_ms,
                    option_defaults.chunk_timeout_floor,
                ),
                chunk_timeout_per_char: ms(
                    fc.output.chunk_timeout_per_char_ms,
                    option_defaults.chunk_timeout_per_char,
                ),
                style: SpeechStyle {
                    rate: fc.output.rate.unwrap_or(style_defaults.rate),
                    pitch: fc.output.pitch.unwrap_or(style_defaults.pitch),
                    volume: fc.output.volume.unwrap_or(style_defaults.volume),
                },
                tone_frequency_hz: fc
                    .output
                    .tone_frequency_hz
                    .unwrap_or(option_defaults.tone_frequency_hz),
                tone_duration: ms(fc.output.tone_duration_ms, option_defaults.tone_duration),
            },
            gender: fc.output.gender.unwrap_or_default(),
            tts_provider: fc.output.tts_provider.unwrap_or(TtsProvider::OpenAI),
            tts_model: env("ASTROVA_TTS_MODEL").or(fc.output.tts_model),
            voice: env("ASTROVA_TTS_VOICE")
                .or(fc.output.voice)
                .unwrap_or_else(|| "nova".to_string()),
            voices: fc.output.voices,
            selector: VoiceSelector {
                target_region: fc.output.target_region.or(selector_defaults.target_region),
                regional_markers: fc
                    .output
                    .regional_markers
                    .unwrap_or(selector_defaults.regional_markers),
                female_keywords: fc
                    .output
                    .female_keywords
                    .unwrap_or(selector_defaults.female_keywords),
                male_keywords: fc
                    .output
                    .male_keywords
                    .unwrap_or(selector_defaults.male_keywords),
            },
        };

        let stt_provider = fc.input.stt_provider.unwrap_or(SttProvider::Whisper);
        let input = InputConfig {
            capture_timeout: ms(fc.input.capture_timeout_ms, Duration::from_secs(10)),
            stt_provider,
            stt_model: env("ASTROVA_STT_MODEL")
                .or(fc.input.stt_model)
                .unwrap_or_else(|| match stt_provider {
                    SttProvider::Whisper => "whisper-1".to_string(),
                    SttProvider::Deepgram => "nova-2".to_string(),
                }),
        };

        let bridges = BridgesConfig {
            shell_socket: env(SHELL_SOCKET_ENV)
                .map(PathBuf::from)
                .or(fc.bridges.shell_socket),
            commands: fc.bridges.commands,
        };

        let retry_defaults = RetryPolicy::default();
        let response = ResponseConfig {
            url: env("ASTROVA_RESPONSE_URL").or(fc.response.url),
            api_key: secret(env("ASTROVA_RESPONSE_KEY").or(fc.response.api_key)),
            timeout: ms(fc.response.timeout_ms, Duration::from_secs(30)),
            retry: RetryPolicy {
                max_retries: fc.response.max_retries.unwrap_or(retry_defaults.max_retries),
                base_delay: ms(fc.response.retry_base_ms, retry_defaults.base_delay),
                max_delay: ms(fc.response.retry_max_ms, retry_defaults.max_delay),
            },
        };

        let api_keys = ApiKeys {
            openai: secret(env("OPENAI_API_KEY").or(fc.api_keys.openai)),
            elevenlabs: secret(env("ELEVENLABS_API_KEY").or(fc.api_keys.elevenlabs)),
            deepgram: secret(env("DEEPGRAM_API_KEY").or(fc.api_keys.deepgram)),
        };

        let config = Self {
            wake,
            output,
            input,
            language,
            bridges,
            response,
            api_keys,
        };
        config.validate()?;
        Ok(config)
    }

    /// Key for the configured STT provider
    #[must_use]
    pub const fn stt_key(&self) -> Option<&SecretString> {
        match self.input.stt_provider {
            SttProvider::Whisper => self.api_keys.openai.as_ref(),
            SttProvider::Deepgram => self.api_keys.deepgram.as_ref(),
        }
    }

    /// Key for the configured TTS provider
    #[must_use]
    pub const fn tts_key(&self) -> Option<&SecretString> {
        match self.output.tts_provider {
            TtsProvider::OpenAI => self.api_keys.openai.as_ref(),
            TtsProvider::ElevenLabs => self.api_keys.elevenlabs.as_ref(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.wake.phrases.iter().all(|p| p.trim().is_empty()) {
            return Err(Error::Config("at least one wake phrase is required".to_string()));
        }
        if self.wake.backoff.cap < self.wake.backoff.base {
            return Err(Error::Config("backoff cap must be at least the base delay".to_string()));
        }
        if self.output.options.max_chunk_chars == 0 {
            return Err(Error::Config("max_chunk_chars must be positive".to_string()));
        }
        let style = self.output.options.style;
        if !(0.0..=1.0).contains(&style.volume) {
            return Err(Error::Config(format!("volume {} outside 0.0..=1.0", style.volume)));
        }
        if style.rate <= 0.0 || style.pitch <= 0.0 {
            return Err(Error::Config("rate and pitch must be positive".to_string()));
        }
        if let Some(url) = &self.response.url {
            url::Url::parse(url)
                .map_err(|e| Error::Config(format!("invalid response url {url}: {e}")))?;
        }
        Ok(())
    }
}
