//! TOML configuration file loading
//!
//! Supports `~/.config/astrova/voice/config.toml` as a persistent config
//! source. All fields are optional; the file is a partial overlay on top of
//! defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::bridge::SpeechCommand;
use crate::language::LanguageProfile;
use crate::voice::{SttProvider, TtsProvider, VoiceCandidate, VoiceGender};
use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct VoiceConfigFile {
    #[serde(default)]
    pub wake: WakeFileConfig,

    #[serde(default)]
    pub output: OutputFileConfig,

    #[serde(default)]
    pub input: InputFileConfig,

    #[serde(default)]
    pub language: LanguageFileConfig,

    #[serde(default)]
    pub bridges: BridgesFileConfig,

    #[serde(default)]
    pub response: ResponseFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Wake word session
#[derive(Debug, Default, Deserialize)]
pub struct WakeFileConfig {
    /// Activation phrases (e.g. `["astrova", "astrava"]`)
    pub phrases: Option<Vec<String>>,

    /// Edit distance tolerated by the fuzzy matcher
    pub max_distance: Option<usize>,

    pub backoff_base_ms: Option<u64>,
    pub backoff_step_ms: Option<u64>,
    pub backoff_cap_ms: Option<u64>,

    /// Errors in a row before the session gives up (0 = never)
    pub max_consecutive_errors: Option<u32>,

    pub restart_delay_ms: Option<u64>,
    pub rearm_delay_ms: Option<u64>,

    /// Tag the wake recognizer listens in; defaults to the default language
    pub language_tag: Option<String>,
}

/// Speech output
#[derive(Debug, Default, Deserialize)]
pub struct OutputFileConfig {
    pub max_chunk_chars: Option<usize>,
    pub inter_chunk_pause_ms: Option<u64>,
    pub chunk_timeout_floor_ms: Option<u64>,
    pub chunk_timeout_per_char_ms: Option<u64>,

    pub gender: Option<VoiceGender>,
    pub rate: Option<f32>,
    pub pitch: Option<f32>,
    pub volume: Option<f32>,

    /// "openai" or "elevenlabs"
    pub tts_provider: Option<TtsProvider>,
    pub tts_model: Option<String>,

    /// Voice used when selection finds nothing (e.g. "nova")
    pub voice: Option<String>,

    /// Voice catalog; empty uses the provider's built-in voices
    #[serde(default)]
    pub voices: Vec<VoiceCandidate>,

    /// Region subtag to prefer (e.g. "IN")
    pub target_region: Option<String>,
    pub regional_markers: Option<Vec<String>>,
    pub female_keywords: Option<Vec<String>>,
    pub male_keywords: Option<Vec<String>>,

    pub tone_frequency_hz: Option<f32>,
    pub tone_duration_ms: Option<u64>,
}

/// Speech input
#[derive(Debug, Default, Deserialize)]
pub struct InputFileConfig {
    pub capture_timeout_ms: Option<u64>,

    /// "whisper" or "deepgram"
    pub stt_provider: Option<SttProvider>,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: Option<String>,
}

/// Language detection
#[derive(Debug, Default, Deserialize)]
pub struct LanguageFileConfig {
    /// Fallback language code (e.g. "en")
    pub default: Option<String>,

    pub auto_detect: Option<bool>,

    /// Keyword profiles in priority order; replaces the built-in set
    #[serde(default)]
    pub profiles: Vec<LanguageProfile>,
}

/// Native bridges
#[derive(Debug, Default, Deserialize)]
pub struct BridgesFileConfig {
    /// Embedded shell socket path
    pub shell_socket: Option<PathBuf>,

    /// Local speech commands to try, in order (e.g. `["espeak-ng"]`)
    #[serde(default)]
    pub commands: Vec<SpeechCommand>,
}

/// Response service
#[derive(Debug, Default, Deserialize)]
pub struct ResponseFileConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_base_ms: Option<u64>,
    pub retry_max_ms: Option<u64>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub elevenlabs: Option<String>,
    pub deepgram: Option<String>,
}

/// Load the config file
///
/// An explicit `path` must exist and parse. Without one, the default path is
/// used if present, and a broken default file falls back to defaults.
///
/// # Errors
///
/// Returns error if an explicit path cannot be read or parsed
pub fn load_config_file(path: Option<&Path>) -> Result<VoiceConfigFile> {
    if let Some(path) = path {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let Some(path) = config_file_path() else {
        return Ok(VoiceConfigFile::default());
    };

    if !path.exists() {
        return Ok(VoiceConfigFile::default());
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                Ok(config)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                Ok(VoiceConfigFile::default())
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            Ok(VoiceConfigFile::default())
        }
    }
}

/// Return the config file path: `~/.config/astrova/voice/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("astrova")
            .join("voice")
            .join("config.toml")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_file() {
        let file: VoiceConfigFile = toml::from_str(
            r#"
            [wake]
            phrases = ["astrova", "hey astrova"]
            backoff_cap_ms = 8000

            [output]
            gender = "male"
            tts_provider = "elevenlabs"
            voices = [{ identifier = "v1", language_tag = "hi-IN", display_name = "Heera" }]

            [language]
            auto_detect = false
            profiles = [{ code = "ta", keywords = ["vanakkam"], scripts = ["tamil"] }]

            [bridges]
            commands = ["espeak-ng", "spd-say"]
            "#,
        )
        .unwrap();

        assert_eq!(file.wake.phrases.as_ref().map(Vec::len), Some(2));
        assert_eq!(file.wake.backoff_cap_ms, Some(8000));
        assert_eq!(file.output.gender, Some(VoiceGender::Male));
        assert_eq!(file.output.tts_provider, Some(TtsProvider::ElevenLabs));
        assert_eq!(file.output.voices[0].display_name, "Heera");
        assert_eq!(file.language.auto_detect, Some(false));
        assert_eq!(file.language.profiles[0].code, "ta");
        assert_eq!(
            file.bridges.commands,
            vec![SpeechCommand::EspeakNg, SpeechCommand::SpdSay]
        );
        assert!(file.response.url.is_none());
    }

    #[test]
    fn explicit_path_must_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[wake\nphrases = 1").unwrap();
        assert!(load_config_file(Some(&path)).is_err());

        let missing = dir.path().join("missing.toml");
        assert!(matches!(load_config_file(Some(&missing)), Err(Error::Config(_))));
    }
}
