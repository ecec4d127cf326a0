//! Speech-to-text (STT) processing

use secrecy::{ExposeSecret, SecretString};

use crate::{Error, Result};

/// Response from `OpenAI` Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
    #[serde(default)]
    confidence: Option<f32>,
}

/// STT provider backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SttProvider {
    Whisper,
    Deepgram,
}

impl std::str::FromStr for SttProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "whisper" | "openai" => Ok(Self::Whisper),
            "deepgram" => Ok(Self::Deepgram),
            other => Err(Error::Config(format!("unknown STT provider: {other}"))),
        }
    }
}

/// A finished transcription
#[derive(Debug, Clone, PartialEq)]
pub struct Transcription {
    pub text: String,
    pub confidence: Option<f32>,
}

/// Transcribes speech to text
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    provider: SttProvider,
}

impl std::fmt::Debug for SpeechToText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechToText")
            .field("model", &self.model)
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl SpeechToText {
    /// Create a new STT client for `provider`
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(provider: SttProvider, api_key: SecretString, model: String) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config(format!(
                "API key required for {provider:?} transcription"
            )));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            provider,
        })
    }

    /// Provider in use
    #[must_use]
    pub const fn provider(&self) -> SttProvider {
        self.provider
    }

    /// Transcribe WAV audio, hinting the spoken language with a BCP-47 tag
    ///
    /// # Errors
    ///
    /// Returns [`Error::Permission`] when the service rejects the credentials,
    /// [`Error::Stt`] for other API failures, and [`Error::Http`] when the
    /// service cannot be reached
    pub async fn transcribe(&self, audio: &[u8], language_tag: &str) -> Result<Transcription> {
        match self.provider {
            SttProvider::Whisper => self.transcribe_whisper(audio, language_tag).await,
            SttProvider::Deepgram => self.transcribe_deepgram(audio, language_tag).await,
        }
    }

    async fn transcribe_whisper(&self, audio: &[u8], language_tag: &str) -> Result<Transcription> {
        tracing::debug!(audio_bytes = audio.len(), language_tag, "starting Whisper transcription");

        let mut form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        // Whisper only takes ISO-639-1
        if let Some(primary) = primary_subtag(language_tag) {
            form = form.text("language", primary);
        }

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "Whisper request failed"))?;

        let response = check_status(response, "Whisper").await?;
        let result: WhisperResponse = response.json().await?;

        tracing::info!(transcript = %result.text, "transcription complete");
        Ok(Transcription {
            text: result.text.trim().to_string(),
            confidence: None,
        })
    }

    async fn transcribe_deepgram(&self, audio: &[u8], language_tag: &str) -> Result<Transcription> {
        tracing::debug!(audio_bytes = audio.len(), language_tag, "starting Deepgram transcription");

        let mut url = url::Url::parse("https://api.deepgram.com/v1/listen")
            .map_err(|e| Error::Stt(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("model", &self.model)
            .append_pair("punctuate", "true");
        if !language_tag.is_empty() {
            url.query_pairs_mut().append_pair("language", language_tag);
        }

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Token {}", self.api_key.expose_secret()))
            .header("Content-Type", "audio/wav")
            .body(audio.to_vec())
            .send()
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "Deepgram request failed"))?;

        let response = check_status(response, "Deepgram").await?;
        let result: DeepgramResponse = response.json().await?;

        let transcription = result
            .results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| Transcription {
                text: a.transcript.trim().to_string(),
                confidence: a.confidence,
            })
            .unwrap_or_else(|| Transcription {
                text: String::new(),
                confidence: None,
            });

        tracing::info!(transcript = %transcription.text, "transcription complete");
        Ok(transcription)
    }
}

async fn check_status(response: reqwest::Response, service: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(status = %status, body = %body, service, "transcription API error");

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        Err(Error::Permission(format!("{service} rejected credentials ({status})")))
    } else {
        Err(Error::Stt(format!("{service} API error {status}: {body}")))
    }
}

/// Primary language subtag of a BCP-47 tag (`hi-IN` → `hi`)
fn primary_subtag(tag: &str) -> Option<String> {
    tag.split(['-', '_'])
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_ascii_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_subtag_strips_region() {
        assert_eq!(primary_subtag("hi-IN").as_deref(), Some("hi"));
        assert_eq!(primary_subtag("EN_us").as_deref(), Some("en"));
        assert_eq!(primary_subtag(""), None);
    }

    #[test]
    fn rejects_empty_key() {
        let err = SpeechToText::new(
            SttProvider::Whisper,
            SecretString::from(String::new()),
            "whisper-1".into(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn provider_parses() {
        assert_eq!("OpenAI".parse::<SttProvider>().unwrap(), SttProvider::Whisper);
        assert_eq!("deepgram".parse::<SttProvider>().unwrap(), SttProvider::Deepgram);
        assert!("bogus".parse::<SttProvider>().is_err());
    }
}
