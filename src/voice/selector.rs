//! Synthetic voice selection
//!
//! Platform voice metadata is opaque: names like "Microsoft Heera - English
//! (India)" or "Google हिन्दी" are the only signal. Selection is therefore a
//! keyword heuristic that degrades to the first voice for the language.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Preferred voice gender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceGender {
    #[default]
    Female,
    Male,
}

impl FromStr for VoiceGender {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "female" | "f" => Ok(Self::Female),
            "male" | "m" => Ok(Self::Male),
            other => Err(Error::Config(format!("unknown voice gender: {other}"))),
        }
    }
}

/// A synthetic voice offered by the platform
///
/// Read-only: selection inspects the name and tag but never mutates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceCandidate {
    /// Engine-specific voice identifier
    pub identifier: String,
    /// Language/region tag (e.g. "en-IN")
    pub language_tag: String,
    /// Human-readable name
    pub display_name: String,
}

impl VoiceCandidate {
    /// Create a candidate
    #[must_use]
    pub fn new(identifier: &str, language_tag: &str, display_name: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            language_tag: language_tag.to_string(),
            display_name: display_name.to_string(),
        }
    }

    fn name_tokens(&self) -> Vec<String> {
        format!("{} {}", self.display_name, self.identifier)
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Picks the best voice for a language and gender preference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceSelector {
    /// Region subtag the product targets (e.g. "IN")
    pub target_region: Option<String>,
    /// Name tokens that signal the targeted accent
    pub regional_markers: Vec<String>,
    /// Name tokens that signal a female voice
    pub female_keywords: Vec<String>,
    /// Name tokens that signal a male voice
    pub male_keywords: Vec<String>,
}

impl Default for VoiceSelector {
    fn default() -> Self {
        fn owned(words: &[&str]) -> Vec<String> {
            words.iter().map(|w| (*w).to_string()).collect()
        }

        Self {
            target_region: Some("IN".to_string()),
            regional_markers: owned(&[
                "indian", "india", "raveena", "aditi", "priya", "heera", "kajal",
            ]),
            female_keywords: owned(&[
                "female", "woman", "zira", "eva", "samantha", "alloy", "aria", "sarah", "alice",
                "nova", "shimmer", "heera", "kajal", "veena", "lekha",
            ]),
            male_keywords: owned(&[
                "male", "man", "david", "mark", "daniel", "alex", "fred", "ravi", "hemant",
                "onyx", "echo", "fable", "guy", "rishi",
            ]),
        }
    }
}

impl VoiceSelector {
    /// Select a voice for `language_tag`, or `None` if no voice speaks it
    ///
    /// Priority: a voice signalling the targeted regional accent (gender match
    /// preferred among those), then a gender match, then the first voice.
    #[must_use]
    pub fn select<'a>(
        &self,
        voices: &'a [VoiceCandidate],
        language_tag: &str,
        gender: VoiceGender,
    ) -> Option<&'a VoiceCandidate> {
        let matching: Vec<&VoiceCandidate> = voices
            .iter()
            .filter(|v| language_matches(&v.language_tag, language_tag))
            .collect();

        if matching.is_empty() {
            tracing::debug!(language_tag, "no voice for language");
            return None;
        }

        let regional: Vec<&VoiceCandidate> = matching
            .iter()
            .copied()
            .filter(|v| self.is_regional(v))
            .collect();
        if !regional.is_empty() {
            let chosen = regional
                .iter()
                .copied()
                .find(|v| self.matches_gender(v, gender))
                .unwrap_or(regional[0]);
            tracing::debug!(voice = %chosen.display_name, "selected regional voice");
            return Some(chosen);
        }

        if let Some(chosen) = matching.iter().copied().find(|v| self.matches_gender(v, gender)) {
            tracing::debug!(voice = %chosen.display_name, ?gender, "selected voice by gender");
            return Some(chosen);
        }

        tracing::debug!(voice = %matching[0].display_name, "selected first voice for language");
        Some(matching[0])
    }

    fn is_regional(&self, voice: &VoiceCandidate) -> bool {
        let region_match = self.target_region.as_deref().is_some_and(|target| {
            region_subtag(&voice.language_tag).is_some_and(|r| r.eq_ignore_ascii_case(target))
        });
        region_match || contains_any(&voice.name_tokens(), &self.regional_markers)
    }

    fn matches_gender(&self, voice: &VoiceCandidate, gender: VoiceGender) -> bool {
        let keywords = match gender {
            VoiceGender::Female => &self.female_keywords,
            VoiceGender::Male => &self.male_keywords,
        };
        contains_any(&voice.name_tokens(), keywords)
    }
}

fn contains_any(tokens: &[String], keywords: &[String]) -> bool {
    keywords
        .iter()
        .any(|k| tokens.iter().any(|t| t.eq_ignore_ascii_case(k)))
}

/// Language tag for voices that speak any language
pub const MULTILINGUAL_TAG: &str = "mul";

fn normalize_tag(tag: &str) -> String {
    tag.trim().replace('_', "-").to_lowercase()
}

/// Whether one tag is a subtag-aligned prefix of the other
///
/// "en" matches "en-IN" and vice versa; "en-IN" does not match "en-US".
/// Multilingual voices (tag `mul`) match every language.
fn language_matches(candidate: &str, requested: &str) -> bool {
    let candidate = normalize_tag(candidate);
    let requested = normalize_tag(requested);

    if requested.is_empty() || candidate == MULTILINGUAL_TAG || candidate == requested {
        return true;
    }

    let is_prefix = |short: &str, long: &str| {
        !short.is_empty() && long.starts_with(short) && long[short.len()..].starts_with('-')
    };
    is_prefix(&requested, &candidate) || is_prefix(&candidate, &requested)
}

fn region_subtag(tag: &str) -> Option<&str> {
    tag.split(['-', '_'])
        .skip(1)
        .find(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_alphabetic()))
}
