//! Supported languages and their speech region tags

/// Fallback language code when detection finds nothing
pub const DEFAULT_LANGUAGE: &str = "en";

/// A language the assistant can listen and speak in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    /// Short code used by detection and configuration (e.g. "hi")
    pub code: &'static str,
    /// English name
    pub name: &'static str,
    /// Region tag handed to recognizers and synthesizers (e.g. "hi-IN")
    pub speech_code: &'static str,
    /// Name in the language itself
    pub native_name: &'static str,
}

const fn lang(
    code: &'static str,
    name: &'static str,
    speech_code: &'static str,
    native_name: &'static str,
) -> Language {
    Language {
        code,
        name,
        speech_code,
        native_name,
    }
}

/// Every language offered by the assistant, Indian English first
pub const SUPPORTED_LANGUAGES: &[Language] = &[
    lang("en", "English", "en-IN", "English (India)"),
    lang("en-us", "English (US)", "en-US", "English (US)"),
    lang("hi", "Hindi", "hi-IN", "हिन्दी"),
    lang("bn", "Bengali", "bn-IN", "বাংলা"),
    lang("te", "Telugu", "te-IN", "తెలుగు"),
    lang("mr", "Marathi", "mr-IN", "मराठी"),
    lang("ta", "Tamil", "ta-IN", "தமிழ்"),
    lang("gu", "Gujarati", "gu-IN", "ગુજરાતી"),
    lang("kn", "Kannada", "kn-IN", "ಕನ್ನಡ"),
    lang("ml", "Malayalam", "ml-IN", "മലയാളം"),
    lang("pa", "Punjabi", "pa-IN", "ਪੰਜਾਬੀ"),
    lang("or", "Odia", "or-IN", "ଓଡ଼ିଆ"),
    lang("as", "Assamese", "as-IN", "অসমীয়া"),
    lang("ur", "Urdu", "ur-IN", "اردو"),
    lang("sa", "Sanskrit", "sa-IN", "संस्कृत"),
    lang("ne", "Nepali", "ne-IN", "नेपाली"),
    lang("si", "Sindhi", "sd-IN", "سنڌي"),
];

/// Look up a supported language by its short code (case-insensitive)
#[must_use]
pub fn language_by_code(code: &str) -> Option<&'static Language> {
    SUPPORTED_LANGUAGES
        .iter()
        .find(|lang| lang.code.eq_ignore_ascii_case(code))
}

/// Region tag for a language code
///
/// Unknown codes are passed through unchanged so callers may configure a
/// full tag (e.g. "fr-FR") directly.
#[must_use]
pub fn speech_tag_for(code: &str) -> String {
    language_by_code(code).map_or_else(|| code.to_string(), |lang| lang.speech_code.to_string())
}
