//! Native speech bridges
//!
//! A bridge is a capability provider outside the process: the embedded host
//! shell's socket, or a local speech command. Bridges are kept in an ordered
//! [`BridgeRegistry`] and reached through the uniform
//! [`CapabilityProvider::try_invoke`]; which of them are usable is decided
//! per call by the [`EnvironmentProbe`].

mod command;
mod probe;
mod shell;

use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;

pub use command::{CommandBridge, SpeechCommand};
pub use probe::{EMBEDDED_ENV, EnvironmentProbe, EnvironmentReport, HostKind};
pub use shell::{BridgeTranscript, SHELL_SOCKET_ENV, ShellSocketBridge};

/// What a bridge can do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeCapability {
    SpeechOutput,
    SpeechInput,
}

/// Request handed to a bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeRequest {
    /// Speak the full, unchunked text
    Speak { text: String, language_tag: String },
    /// Start a recognition whose transcript arrives on the bridge's own channel
    StartRecognition { language_tag: String },
}

impl BridgeRequest {
    #[must_use]
    pub const fn capability(&self) -> BridgeCapability {
        match self {
            Self::Speak { .. } => BridgeCapability::SpeechOutput,
            Self::StartRecognition { .. } => BridgeCapability::SpeechInput,
        }
    }
}

/// A named native capability provider
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    fn name(&self) -> &str;

    fn supports(&self, capability: BridgeCapability) -> bool;

    /// Whether the bridge can be reached right now
    fn is_reachable(&self) -> bool;

    /// Hand the request to the bridge
    ///
    /// # Errors
    ///
    /// Returns error if the bridge rejects or cannot deliver the request
    async fn try_invoke(&self, request: &BridgeRequest) -> Result<()>;
}

/// Ordered list of bridges; earlier entries are preferred
#[derive(Clone, Default)]
pub struct BridgeRegistry {
    providers: Vec<Arc<dyn CapabilityProvider>>,
}

impl BridgeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider at the lowest priority
    pub fn register(&mut self, provider: Arc<dyn CapabilityProvider>) {
        tracing::debug!(bridge = provider.name(), "bridge registered");
        self.providers.push(provider);
    }

    #[must_use]
    pub fn with(mut self, provider: Arc<dyn CapabilityProvider>) -> Self {
        self.register(provider);
        self
    }

    #[must_use]
    pub fn providers(&self) -> &[Arc<dyn CapabilityProvider>] {
        &self.providers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for BridgeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|p| p.name()))
            .finish()
    }
}
