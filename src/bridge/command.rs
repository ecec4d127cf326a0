//! Local speech command bridges (`say`, `spd-say`, `espeak-ng`)

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{BridgeCapability, BridgeRequest, CapabilityProvider};
use crate::platform::SpeechStyle;
use crate::{Error, Result};

/// Upper bound on one command invocation
const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Supported speech commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpeechCommand {
    /// macOS
    Say,
    /// speech-dispatcher
    SpdSay,
    EspeakNg,
}

impl SpeechCommand {
    #[must_use]
    pub const fn program(self) -> &'static str {
        match self {
            Self::Say => "say",
            Self::SpdSay => "spd-say",
            Self::EspeakNg => "espeak-ng",
        }
    }

    /// Arguments for speaking `text` in `language_tag` with `style`
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn args(self, text: &str, language_tag: &str, style: SpeechStyle) -> Vec<String> {
        let primary = language_tag.split(['-', '_']).next().unwrap_or_default();
        match self {
            Self::Say => {
                let wpm = (175.0 * style.rate).round() as i32;
                vec!["-r".into(), wpm.to_string(), text.into()]
            }
            Self::SpdSay => {
                // -100..=100 around a neutral 0
                let rate = ((style.rate - 1.0) * 100.0).round().clamp(-100.0, 100.0) as i32;
                let pitch = ((style.pitch - 1.0) * 100.0).round().clamp(-100.0, 100.0) as i32;
                let volume = style
                    .volume
                    .mul_add(200.0, -100.0)
                    .round()
                    .clamp(-100.0, 100.0) as i32;
                let mut args = vec![
                    "-w".into(),
                    "-r".into(),
                    rate.to_string(),
                    "-p".into(),
                    pitch.to_string(),
                    "-i".into(),
                    volume.to_string(),
                ];
                if !primary.is_empty() {
                    args.extend(["-l".into(), primary.to_string()]);
                }
                args.push(text.into());
                args
            }
            Self::EspeakNg => {
                let wpm = (175.0 * style.rate).round() as i32;
                let pitch = (50.0 * style.pitch).round().clamp(0.0, 99.0) as i32;
                let amplitude = (100.0 * style.volume).round().clamp(0.0, 200.0) as i32;
                let mut args = vec![
                    "-s".into(),
                    wpm.to_string(),
                    "-p".into(),
                    pitch.to_string(),
                    "-a".into(),
                    amplitude.to_string(),
                ];
                if !primary.is_empty() {
                    args.extend(["-v".into(), primary.to_string()]);
                }
                args.push(text.into());
                args
            }
        }
    }
}

/// Bridge that speaks through a local command
#[derive(Debug, Clone)]
pub struct CommandBridge {
    command: SpeechCommand,
    style: SpeechStyle,
}

impl CommandBridge {
    #[must_use]
    pub const fn new(command: SpeechCommand, style: SpeechStyle) -> Self {
        Self { command, style }
    }

    fn resolve(&self) -> Option<PathBuf> {
        which::which(self.command.program()).ok()
    }
}

#[async_trait]
impl CapabilityProvider for CommandBridge {
    fn name(&self) -> &'static str {
        self.command.program()
    }

    fn supports(&self, capability: BridgeCapability) -> bool {
        capability == BridgeCapability::SpeechOutput
    }

    fn is_reachable(&self) -> bool {
        self.resolve().is_some()
    }

    async fn try_invoke(&self, request: &BridgeRequest) -> Result<()> {
        let BridgeRequest::Speak { text, language_tag } = request else {
            return Err(Error::Unavailable(format!(
                "{} cannot recognize speech",
                self.command.program()
            )));
        };

        let program = self.resolve().ok_or_else(|| {
            Error::Unavailable(format!("{} not found on PATH", self.command.program()))
        })?;

        let child = Command::new(&program)
            .args(self.command.args(text, language_tag, self.style))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Bridge(format!("failed to run {}: {e}", program.display())))?;

        let output = tokio::time::timeout(COMMAND_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| Error::Bridge(format!("{} timed out", self.command.program())))??;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Bridge(format!(
                "{} exited with code {code}: {}",
                self.command.program(),
                stderr.trim()
            )));
        }

        tracing::debug!(command = self.command.program(), "speech command finished");
        Ok(())
    }
}
