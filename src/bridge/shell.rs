//! Embedded host shell bridge
//!
//! When the assistant runs inside a native shell (kiosk app, set-top box),
//! the shell exposes a Unix socket accepting newline-delimited JSON:
//!
//! ```text
//! -> {"type":"SPEAK_TEXT","text":"...","language":"hi-IN"}
//! -> {"type":"START_RECOGNITION","language":"hi-IN"}
//! <- {"type":"TRANSCRIPT","text":"...","language":"hi-IN"}
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use super::{BridgeCapability, BridgeRequest, CapabilityProvider};
use crate::{Error, Result};

/// Env var naming the shell socket
pub const SHELL_SOCKET_ENV: &str = "ASTROVA_SHELL_SOCKET";

/// How long to wait for the shell to accept a message
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a bridge recognition may take before the reader gives up
const RECOGNITION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum ShellMessage<'a> {
    SpeakText { text: &'a str, language: &'a str },
    StartRecognition { language: &'a str },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum ShellReply {
    Transcript {
        text: String,
        #[serde(default)]
        language: Option<String>,
    },
    Error {
        message: String,
    },
}

/// Transcript delivered by a bridge recognition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeTranscript {
    pub bridge: String,
    pub text: String,
    pub language_tag: Option<String>,
}

/// Bridge to the embedded shell's socket
#[derive(Debug, Clone)]
pub struct ShellSocketBridge {
    path: PathBuf,
    transcripts: Option<mpsc::UnboundedSender<BridgeTranscript>>,
}

impl ShellSocketBridge {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            transcripts: None,
        }
    }

    /// Deliver bridge recognition results to `tx`
    ///
    /// Without a transcript channel the bridge does not offer speech input.
    #[must_use]
    pub fn with_transcripts(mut self, tx: mpsc::UnboundedSender<BridgeTranscript>) -> Self {
        self.transcripts = Some(tx);
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn send(&self, message: &ShellMessage<'_>) -> Result<tokio::net::UnixStream> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');

        let mut stream = tokio::time::timeout(
            CONNECT_TIMEOUT,
            tokio::net::UnixStream::connect(&self.path),
        )
        .await
        .map_err(|_| Error::Bridge(format!("shell socket {} timed out", self.path.display())))??;

        stream.write_all(line.as_bytes()).await?;
        stream.flush().await?;
        Ok(stream)
    }
}

#[async_trait]
impl CapabilityProvider for ShellSocketBridge {
    fn name(&self) -> &'static str {
        "shell"
    }

    fn supports(&self, capability: BridgeCapability) -> bool {
        match capability {
            BridgeCapability::SpeechOutput => true,
            BridgeCapability::SpeechInput => self.transcripts.is_some(),
        }
    }

    fn is_reachable(&self) -> bool {
        is_socket(&self.path)
    }

    async fn try_invoke(&self, request: &BridgeRequest) -> Result<()> {
        match request {
            BridgeRequest::Speak { text, language_tag } => {
                self.send(&ShellMessage::SpeakText {
                    text,
                    language: language_tag,
                })
                .await?;
                tracing::debug!(chars = text.chars().count(), "speech handed to shell");
                Ok(())
            }
            BridgeRequest::StartRecognition { language_tag } => {
                let Some(tx) = self.transcripts.clone() else {
                    return Err(Error::Unavailable(
                        "shell bridge has no transcript channel".to_string(),
                    ));
                };
                let stream = self
                    .send(&ShellMessage::StartRecognition {
                        language: language_tag,
                    })
                    .await?;
                tokio::spawn(read_transcript(stream, tx));
                Ok(())
            }
        }
    }
}

async fn read_transcript(
    stream: tokio::net::UnixStream,
    tx: mpsc::UnboundedSender<BridgeTranscript>,
) {
    let mut lines = BufReader::new(stream).lines();
    let line = match tokio::time::timeout(RECOGNITION_TIMEOUT, lines.next_line()).await {
        Ok(Ok(Some(line))) => line,
        Ok(Ok(None)) => {
            tracing::debug!("shell closed recognition without a transcript");
            return;
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "shell recognition read failed");
            return;
        }
        Err(_) => {
            tracing::warn!("shell recognition timed out");
            return;
        }
    };

    match serde_json::from_str::<ShellReply>(&line) {
        Ok(ShellReply::Transcript { text, language }) => {
            let _ = tx.send(BridgeTranscript {
                bridge: "shell".to_string(),
                text,
                language_tag: language,
            });
        }
        Ok(ShellReply::Error { message }) => {
            tracing::warn!(message, "shell recognition failed");
        }
        Err(e) => tracing::warn!(error = %e, line, "unparseable shell reply"),
    }
}

#[cfg(unix)]
fn is_socket(path: &Path) -> bool {
    use std::os::unix::fs::FileTypeExt;
    std::fs::metadata(path).is_ok_and(|m| m.file_type().is_socket())
}

#[cfg(not(unix))]
fn is_socket(_path: &Path) -> bool {
    false
}
