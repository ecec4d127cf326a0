//! Astrova Voice - voice I/O resilience and turn control for a spoken assistant
//!
//! This library provides the voice layer of the Astrova hospitality assistant:
//! - Continuous wake word listening with bounded restart backoff
//! - Speech output with bridge, chunked engine and tone fallbacks
//! - Speech input with bridge and platform recognizer fallbacks
//! - Keyword/script language detection and voice selection
//! - A foreground turn controller tying these to a response service
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Turn Controller                     │
//! │   wake → capture → detect language → reply → speak  │
//! └──────────┬──────────────────┬───────────────────────┘
//!            │                  │
//! ┌──────────▼─────────┐ ┌──────▼──────────────────────┐
//! │  Wake Word Session │ │  Speech Input / Output       │
//! │  (state machine)   │ │  Resolvers                   │
//! └──────────┬─────────┘ └──────┬──────────────────────┘
//!            │                  │
//! ┌──────────▼──────────────────▼───────────────────────┐
//! │   Bridges (shell socket, speech commands)  │ Engines │
//! │   Environment Probe                        │ STT/TTS │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod events;
pub mod language;
pub mod platform;
pub mod resolver;
pub mod response;
pub mod retry;
pub mod turn;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use events::{EventSink, VoiceErrorKind, VoiceEvent};
pub use resolver::{SpeechInputResolver, SpeechOutputRequest, SpeechOutputResolver};
pub use response::{HttpResponseService, ResponseService};
pub use turn::{TurnController, TurnOptions, TurnOutcome, TurnParts};
pub use voice::{WakeWordOptions, WakeWordSession};
