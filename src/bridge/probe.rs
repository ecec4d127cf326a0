//! Host environment probe

use std::path::PathBuf;
use std::sync::Arc;

use super::{BridgeCapability, BridgeRegistry, CapabilityProvider};

/// Env var set by native shells that embed the assistant
pub const EMBEDDED_ENV: &str = "ASTROVA_EMBEDDED";

/// Where the assistant is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKind {
    /// A general-purpose host with direct device access
    OpenPlatform,
    /// Inside a native shell that owns speech devices
    EmbeddedShell,
}

impl std::fmt::Display for HostKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::OpenPlatform => "open_platform",
            Self::EmbeddedShell => "embedded_shell",
        })
    }
}

/// Snapshot of the host at probe time
#[derive(Clone)]
pub struct EnvironmentReport {
    pub host_kind: HostKind,
    /// Reachable bridges in priority order
    pub available_bridges: Vec<Arc<dyn CapabilityProvider>>,
}

impl EnvironmentReport {
    /// Highest-priority reachable bridge offering `capability`
    #[must_use]
    pub fn bridge_for(&self, capability: BridgeCapability) -> Option<Arc<dyn CapabilityProvider>> {
        self.available_bridges
            .iter()
            .find(|b| b.supports(capability))
            .cloned()
    }

    #[must_use]
    pub fn bridge_names(&self) -> Vec<String> {
        self.available_bridges
            .iter()
            .map(|b| b.name().to_string())
            .collect()
    }
}

impl std::fmt::Debug for EnvironmentReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentReport")
            .field("host_kind", &self.host_kind)
            .field("available_bridges", &self.bridge_names())
            .finish()
    }
}

/// Detects the host kind and reachable bridges
///
/// Holds no results between calls: every [`probe`](Self::probe) re-queries
/// the host, so a shell that appears or vanishes mid-session is noticed on
/// the next resolver call.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentProbe {
    registry: BridgeRegistry,
    shell_socket: Option<PathBuf>,
    embedded_env: Option<String>,
}

impl EnvironmentProbe {
    #[must_use]
    pub fn new(registry: BridgeRegistry) -> Self {
        Self {
            registry,
            shell_socket: None,
            embedded_env: Some(EMBEDDED_ENV.to_string()),
        }
    }

    /// Treat the existence of `path` as a marker of an embedded shell
    #[must_use]
    pub fn with_shell_socket(mut self, path: Option<PathBuf>) -> Self {
        self.shell_socket = path;
        self
    }

    /// Env var marking an embedded shell; `None` disables the check
    #[must_use]
    pub fn with_embedded_env(mut self, var: Option<String>) -> Self {
        self.embedded_env = var;
        self
    }

    #[must_use]
    pub const fn registry(&self) -> &BridgeRegistry {
        &self.registry
    }

    /// Query the host now
    #[must_use]
    pub fn probe(&self) -> EnvironmentReport {
        let host_kind = self.host_kind();
        let available_bridges: Vec<_> = self
            .registry
            .providers()
            .iter()
            .filter(|b| b.is_reachable())
            .cloned()
            .collect();

        tracing::debug!(
            %host_kind,
            bridges = available_bridges.len(),
            registered = self.registry.len(),
            "environment probed"
        );

        EnvironmentReport {
            host_kind,
            available_bridges,
        }
    }

    fn host_kind(&self) -> HostKind {
        let env_marker = self
            .embedded_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .is_some_and(|v| is_truthy(&v));
        let socket_marker = self.shell_socket.as_deref().is_some_and(std::path::Path::exists);

        if env_marker || socket_marker {
            HostKind::EmbeddedShell
        } else {
            HostKind::OpenPlatform
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
