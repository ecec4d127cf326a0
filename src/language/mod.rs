//! Language catalog and transcript language detection

mod catalog;
mod scorer;

pub use catalog::{
    DEFAULT_LANGUAGE, Language, SUPPORTED_LANGUAGES, language_by_code, speech_tag_for,
};
pub use scorer::{LanguageProfile, LanguageScore, LanguageScorer, Script, default_profiles};
