//! Error types for the Astrova voice core

use thiserror::Error;

/// Result type alias for Astrova voice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur inside the voice core
///
/// These never cross the public event interface directly; resolvers and the
/// wake word session translate them into [`crate::events::VoiceErrorKind`].
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Microphone or speech service access denied
    #[error("permission denied: {0}")]
    Permission(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Recognition engine error
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Native bridge error
    #[error("bridge error: {0}")]
    Bridge(String),

    /// Capability is not available in the current host
    #[error("capability unavailable: {0}")]
    Unavailable(String),

    /// Response service error
    #[error("response service error: {0}")]
    Response(String),

    /// Wake word session error
    #[error("wake word error: {0}")]
    WakeWord(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
