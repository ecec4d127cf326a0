//! Response service client
//!
//! The dialogue itself lives behind an HTTP endpoint that takes the guest's
//! transcript and returns the text to speak.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::retry::{RetryPolicy, delay_for_attempt, is_recoverable, parse_retry_after};
use crate::{Error, Result};

/// Produces the assistant's reply for a transcript
#[async_trait]
pub trait ResponseService: Send + Sync {
    /// Generate reply text
    ///
    /// # Errors
    ///
    /// Returns error if no reply could be produced
    async fn generate(&self, transcript: &str, session_id: &str, language: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    user_input: &'a str,
    session_id: &'a str,
    language: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// [`ResponseService`] over HTTP
pub struct HttpResponseService {
    client: reqwest::Client,
    endpoint: url::Url,
    api_key: Option<SecretString>,
    retry: RetryPolicy,
}

impl HttpResponseService {
    /// # Errors
    ///
    /// Returns error if the endpoint is not a valid URL or the client cannot be built
    pub fn new(
        endpoint: &str,
        api_key: Option<SecretString>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let endpoint = url::Url::parse(endpoint)
            .map_err(|e| Error::Config(format!("invalid response endpoint {endpoint}: {e}")))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            retry,
        })
    }

    /// Single request; `Err((error, retry_after, recoverable))` on failure
    async fn attempt(
        &self,
        body: &GenerateRequest<'_>,
    ) -> std::result::Result<String, (Error, Option<Duration>, bool)> {
        let mut request = self.client.post(self.endpoint.clone()).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let recoverable = e.is_timeout() || e.is_connect();
                return Err((Error::Http(e), None, recoverable));
            }
        };

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let text = response
            .text()
            .await
            .map_err(|e| (Error::Http(e), None, true))?;

        let parsed: Option<GenerateResponse> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            let message = parsed
                .and_then(|p| p.error)
                .unwrap_or_else(|| text.clone());
            return Err((
                Error::Response(format!("{status}: {message}")),
                retry_after,
                is_recoverable(status.as_u16(), &text),
            ));
        }

        match parsed {
            Some(GenerateResponse {
                response: Some(reply),
                ..
            }) if !reply.trim().is_empty() => Ok(reply),
            Some(GenerateResponse {
                error: Some(message),
                ..
            }) => Err((Error::Response(message), None, false)),
            _ => Err((
                Error::Response("response service returned no text".to_string()),
                None,
                false,
            )),
        }
    }
}

#[async_trait]
impl ResponseService for HttpResponseService {
    async fn generate(&self, transcript: &str, session_id: &str, language: &str) -> Result<String> {
        let body = GenerateRequest {
            user_input: transcript,
            session_id,
            language,
        };

        let mut attempt = 0;
        loop {
            match self.attempt(&body).await {
                Ok(reply) => {
                    tracing::info!(
                        session_id,
                        language,
                        chars = reply.chars().count(),
                        "reply received"
                    );
                    return Ok(reply);
                }
                Err((error, retry_after, recoverable)) => {
                    if !recoverable || attempt >= self.retry.max_retries {
                        tracing::error!(error = %error, attempt, "response service failed");
                        return Err(error);
                    }
                    let delay = delay_for_attempt(&self.retry, attempt, retry_after);
                    tracing::warn!(
                        error = %error,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "response service failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl std::fmt::Debug for HttpResponseService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponseService")
            .field("endpoint", &self.endpoint.as_str())
            .field("has_key", &self.api_key.is_some())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
