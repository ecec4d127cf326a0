//! Per-call speech backend resolution
//!
//! Each resolver probes the environment on every call and walks its tiers in
//! order: native bridge first, then the platform engine, then (for output)
//! an audible tone.

mod cancel;
mod input;
mod output;

pub use input::{RecognitionRoute, SpeechInputResolver};
pub use output::{
    OutputOptions, OutputTier, SpeechOutcome, SpeechOutputRequest, SpeechOutputResolver,
};
