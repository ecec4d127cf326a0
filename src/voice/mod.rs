//! Voice processing
//!
//! Audio capture and playback, cloud STT/TTS clients, utterance
//! endpointing, text chunking, voice selection and the wake word session.

mod capture;
mod chunking;
mod endpoint;
mod playback;
mod selector;
mod session;
mod stt;
mod tts;
mod wake_word;

pub use capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
pub use chunking::{ChunkStatus, DEFAULT_MAX_CHUNK_CHARS, TextChunk, chunk_text, split_text};
pub use endpoint::{EndpointConfig, EndpointState, Endpointer, rms_energy};
pub use playback::{
    AudioClip, AudioPlayback, PLAYBACK_SAMPLE_RATE, PlaybackOutcome, decode_mp3, tone,
};
pub use selector::{MULTILINGUAL_TAG, VoiceCandidate, VoiceGender, VoiceSelector};
pub use session::WakeWordSession;
pub use stt::{SpeechToText, SttProvider, Transcription};
pub use tts::{TextToSpeech, TtsProvider};
pub use wake_word::{
    DEFAULT_MAX_DISTANCE, DEFAULT_PHRASES, PhraseMatcher, SessionAction, SessionInput,
    SessionState, WakeWordMachine, WakeWordOptions, edit_distance, normalize,
};
