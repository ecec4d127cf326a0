//! Keyword and script based language detection
//!
//! Each registered language owns a set of romanized keywords and native
//! scripts. A transcript is scored by counting keyword hits (whole words,
//! case-insensitive) plus runs of characters in the language's scripts. The
//! highest count wins; ties go to the language registered first, so the
//! registration order doubles as the product's language priority.

use std::str::FromStr;

use regex::Regex;
use serde::Deserialize;

use super::catalog::DEFAULT_LANGUAGE;
use crate::{Error, Result};

/// Unicode script a language is written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Script {
    Devanagari,
    Bengali,
    Gurmukhi,
    Gujarati,
    Oriya,
    Tamil,
    Telugu,
    Kannada,
    Malayalam,
    Arabic,
}

impl Script {
    /// Regex fragment matching one run of this script
    const fn pattern(self) -> &'static str {
        match self {
            Self::Devanagari => r"\p{Devanagari}+",
            Self::Bengali => r"\p{Bengali}+",
            Self::Gurmukhi => r"\p{Gurmukhi}+",
            Self::Gujarati => r"\p{Gujarati}+",
            Self::Oriya => r"\p{Oriya}+",
            Self::Tamil => r"\p{Tamil}+",
            Self::Telugu => r"\p{Telugu}+",
            Self::Kannada => r"\p{Kannada}+",
            Self::Malayalam => r"\p{Malayalam}+",
            Self::Arabic => r"\p{Arabic}+",
        }
    }
}

impl FromStr for Script {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "devanagari" => Ok(Self::Devanagari),
            "bengali" | "bangla" => Ok(Self::Bengali),
            "gurmukhi" => Ok(Self::Gurmukhi),
            "gujarati" => Ok(Self::Gujarati),
            "oriya" | "odia" => Ok(Self::Oriya),
            "tamil" => Ok(Self::Tamil),
            "telugu" => Ok(Self::Telugu),
            "kannada" => Ok(Self::Kannada),
            "malayalam" => Ok(Self::Malayalam),
            "arabic" => Ok(Self::Arabic),
            other => Err(Error::Config(format!("unknown script: {other}"))),
        }
    }
}

/// Keyword and script set for one language
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LanguageProfile {
    /// Language code returned on detection
    pub code: String,
    /// Romanized or native keywords, matched as whole words
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Scripts whose character runs count as matches
    #[serde(default)]
    pub scripts: Vec<Script>,
}

impl LanguageProfile {
    /// Build a profile from static keyword and script lists
    #[must_use]
    pub fn new(code: &str, keywords: &[&str], scripts: &[Script]) -> Self {
        Self {
            code: code.to_string(),
            keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
            scripts: scripts.to_vec(),
        }
    }

    fn compile(&self) -> Result<Option<Regex>> {
        let mut alternatives = Vec::new();

        let words: Vec<String> = self
            .keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(regex::escape)
            .collect();
        if !words.is_empty() {
            alternatives.push(format!(r"\b(?:{})\b", words.join("|")));
        }
        alternatives.extend(self.scripts.iter().map(|s| s.pattern().to_string()));

        if alternatives.is_empty() {
            return Ok(None);
        }

        let pattern = format!("(?i){}", alternatives.join("|"));
        Regex::new(&pattern)
            .map(Some)
            .map_err(|e| Error::Config(format!("invalid keywords for {}: {e}", self.code)))
    }
}

/// Per-language match counts for one transcript, in priority order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageScore {
    counts: Vec<(String, usize)>,
}

impl LanguageScore {
    /// Match count for a language code
    #[must_use]
    pub fn count(&self, code: &str) -> usize {
        self.counts
            .iter()
            .find(|(c, _)| c == code)
            .map_or(0, |(_, n)| *n)
    }

    /// All counts in priority order
    #[must_use]
    pub fn counts(&self) -> &[(String, usize)] {
        &self.counts
    }

    /// Code with the strictly highest non-zero count; earlier entries win ties
    #[must_use]
    pub fn best(&self) -> Option<&str> {
        let mut best: Option<(&str, usize)> = None;
        for (code, n) in &self.counts {
            if *n == 0 {
                continue;
            }
            if best.is_none_or(|(_, top)| *n > top) {
                best = Some((code, *n));
            }
        }
        best.map(|(code, _)| code)
    }
}

struct CompiledProfile {
    code: String,
    pattern: Option<Regex>,
}

/// Guesses the spoken language of a transcript
///
/// Pure: the same transcript always yields the same code.
pub struct LanguageScorer {
    profiles: Vec<CompiledProfile>,
    default_language: String,
}

impl std::fmt::Debug for LanguageScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageScorer")
            .field(
                "languages",
                &self.profiles.iter().map(|p| p.code.as_str()).collect::<Vec<_>>(),
            )
            .field("default_language", &self.default_language)
            .finish()
    }
}

impl LanguageScorer {
    /// Create a scorer from profiles in priority order
    ///
    /// # Errors
    ///
    /// Returns error if a profile's keywords do not form a valid pattern
    pub fn new(profiles: &[LanguageProfile], default_language: impl Into<String>) -> Result<Self> {
        let profiles = profiles
            .iter()
            .map(|p| {
                Ok(CompiledProfile {
                    code: p.code.clone(),
                    pattern: p.compile()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            profiles,
            default_language: default_language.into(),
        })
    }

    /// Scorer over the built-in profiles with English as the fallback
    ///
    /// # Errors
    ///
    /// Returns error if the built-in profiles fail to compile
    pub fn with_defaults() -> Result<Self> {
        Self::new(&default_profiles(), DEFAULT_LANGUAGE)
    }

    /// Count matches for every registered language
    #[must_use]
    pub fn score(&self, transcript: &str) -> LanguageScore {
        let counts = self
            .profiles
            .iter()
            .map(|p| {
                let n = p
                    .pattern
                    .as_ref()
                    .map_or(0, |re| re.find_iter(transcript).count());
                (p.code.clone(), n)
            })
            .collect();
        LanguageScore { counts }
    }

    /// Best-guess language code for a transcript
    #[must_use]
    pub fn detect(&self, transcript: &str) -> &str {
        let score = self.score(transcript);
        let code = score.best().map(str::to_string);
        tracing::debug!(?code, counts = ?score.counts(), "language scored");

        code.and_then(|c| self.profiles.iter().find(|p| p.code == c))
            .map_or(self.default_language.as_str(), |p| p.code.as_str())
    }

    /// Fallback language code
    #[must_use]
    pub fn default_language(&self) -> &str {
        &self.default_language
    }
}

/// Built-in profiles, Hindi first so Hinglish ties resolve to Hindi
#[must_use]
pub fn default_profiles() -> Vec<LanguageProfile> {
    use Script::{
        Arabic, Bengali, Devanagari, Gujarati, Gurmukhi, Kannada, Malayalam, Oriya, Tamil,
        Telugu,
    };

    vec![
        LanguageProfile::new(
            "hi",
            &[
                "namaste", "namaskar", "kripya", "kripaya", "madad", "dhanyavad", "dhanyawad",
                "shukriya", "kya", "kaise", "kahan", "kitna", "kitne", "chahiye", "mujhe",
                "hamein", "aap", "aapka", "hai", "hain", "nahi", "nahin", "haan", "kamra",
                "kamre", "khana", "paani", "karen", "karein", "bataiye", "batayiye",
            ],
            &[Devanagari],
        ),
        LanguageProfile::new(
            "en",
            &[
                "hello", "please", "thank", "thanks", "room", "help", "book", "booking", "price",
                "service", "need", "want", "what", "where", "when", "how", "can", "could",
                "would", "the", "is", "are", "my", "you",
            ],
            &[],
        ),
        LanguageProfile::new(
            "mr",
            &["aahe", "ahe", "pahije", "mala", "tumhi", "kasa", "kashi", "kay", "hoy"],
            &[Devanagari],
        ),
        LanguageProfile::new(
            "bn",
            &["nomoskar", "dhonnobad", "ami", "tumi", "apni", "kemon", "achhe", "bhalo"],
            &[Bengali],
        ),
        LanguageProfile::new(
            "ta",
            &["vanakkam", "nandri", "enna", "eppadi", "venum", "irukku", "romba"],
            &[Tamil],
        ),
        LanguageProfile::new(
            "te",
            &["namaskaram", "dhanyavadalu", "emi", "ela", "kavali", "undi", "meeru"],
            &[Telugu],
        ),
        LanguageProfile::new(
            "gu",
            &["kem cho", "aavjo", "joie", "tame", "shu", "majama"],
            &[Gujarati],
        ),
        LanguageProfile::new(
            "kn",
            &["namaskara", "dhanyavadagalu", "hegiddira", "beku", "illa", "nimma"],
            &[Kannada],
        ),
        LanguageProfile::new(
            "ml",
            &["nanni", "enthu", "engane", "venam", "undo", "sukhamano"],
            &[Malayalam],
        ),
        LanguageProfile::new(
            "pa",
            &["sat sri akal", "kiddan", "tusi", "chahida", "tuhanu"],
            &[Gurmukhi],
        ),
        LanguageProfile::new("or", &["dhanyabad", "kemiti", "mote", "darkar"], &[Oriya]),
        LanguageProfile::new(
            "ur",
            &["assalam", "salaam", "janab", "meherbani", "kijiye"],
            &[Arabic],
        ),
    ]
}
