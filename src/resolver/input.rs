//! Speech input resolution: bridge → platform recognizer

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::Result;
use crate::bridge::{BridgeCapability, BridgeRequest, EnvironmentProbe};
use crate::platform::{RecognitionEngine, RecognitionEvent, Recognizer, RecognizerOptions};

/// Where a started recognition is running
pub enum RecognitionRoute {
    /// Handed to a bridge; the transcript arrives on the bridge's channel
    Bridge(String),
    /// A one-shot platform recognizer delivering on the caller's channel
    Platform(Box<dyn Recognizer>),
}

impl std::fmt::Debug for RecognitionRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bridge(name) => f.debug_tuple("Bridge").field(name).finish(),
            Self::Platform(_) => f.write_str("Platform"),
        }
    }
}

/// Starts one-shot recognition on the best available backend
pub struct SpeechInputResolver {
    probe: EnvironmentProbe,
    engine: Option<Arc<dyn RecognitionEngine>>,
}

impl SpeechInputResolver {
    #[must_use]
    pub fn new(probe: EnvironmentProbe, engine: Option<Arc<dyn RecognitionEngine>>) -> Self {
        Self { probe, engine }
    }

    /// Start recognition for `language_tag`
    ///
    /// Returns `Ok(None)` when no bridge or engine can listen. Platform
    /// events are delivered on `events`.
    ///
    /// # Errors
    ///
    /// Returns error if the platform recognizer fails to start
    pub async fn start_recognition(
        &self,
        language_tag: &str,
        events: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> Result<Option<RecognitionRoute>> {
        let report = self.probe.probe();

        if let Some(bridge) = report.bridge_for(BridgeCapability::SpeechInput) {
            let request = BridgeRequest::StartRecognition {
                language_tag: language_tag.to_string(),
            };
            match bridge.try_invoke(&request).await {
                Ok(()) => {
                    tracing::info!(
                        bridge = bridge.name(),
                        language_tag,
                        "recognition handed to bridge"
                    );
                    return Ok(Some(RecognitionRoute::Bridge(bridge.name().to_string())));
                }
                Err(e) => {
                    tracing::warn!(bridge = bridge.name(), error = %e, "bridge recognition failed");
                }
            }
        }

        let Some(engine) = self.engine.as_ref().filter(|e| e.is_available()) else {
            tracing::warn!(language_tag, "no speech input available");
            return Ok(None);
        };

        let mut recognizer = engine.create(&RecognizerOptions::one_shot(language_tag))?;
        recognizer.start(events)?;
        tracing::info!(engine = engine.name(), language_tag, "platform recognition started");
        Ok(Some(RecognitionRoute::Platform(recognizer)))
    }
}

impl std::fmt::Debug for SpeechInputResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechInputResolver")
            .field("engine", &self.engine.as_ref().map(|e| e.name().to_string()))
            .finish_non_exhaustive()
    }
}
