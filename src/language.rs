//! # Language Identification
//!
//! Picks which recognition model a session should use. The classifier is an
//! opaque capability behind [`LanguageIdentifier`]; the shipped implementation
//! interprets the accumulated audio bytes as lossy UTF-8 text and runs
//! `whatlang` restricted to the supported languages, which mirrors how the
//! deployed service classified streams. Classification failure is never
//! fatal: the [`LanguageSelector`] falls back to the configured default tag.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;
use whatlang::{Detector, Lang};

/// Identifier for one supported recognition language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageTag {
    En,
    Vi,
}

impl LanguageTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageTag::En => "en",
            LanguageTag::Vi => "vi",
        }
    }

    /// All tags the registry must carry a model for.
    pub fn all() -> [LanguageTag; 2] {
        [LanguageTag::En, LanguageTag::Vi]
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LanguageTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "en" => Ok(LanguageTag::En),
            "vi" => Ok(LanguageTag::Vi),
            other => Err(format!("unsupported language tag: {}", other)),
        }
    }
}

/// Capability that maps raw audio bytes to a language tag.
///
/// Implementations must be deterministic for identical input bytes so that
/// a retried recognition reproduces the original decision. `None` means the
/// classifier has no confident answer.
pub trait LanguageIdentifier: Send + Sync {
    fn identify(&self, audio: &[u8]) -> Option<LanguageTag>;
}

/// Default classifier: lossy UTF-8 text over the byte stream, scored by
/// `whatlang` with an allowlist of the supported languages.
pub struct WhatlangIdentifier {
    detector: Detector,
}

impl WhatlangIdentifier {
    pub fn new() -> Self {
        Self {
            detector: Detector::with_allowlist(vec![Lang::Eng, Lang::Vie]),
        }
    }
}

impl Default for WhatlangIdentifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageIdentifier for WhatlangIdentifier {
    fn identify(&self, audio: &[u8]) -> Option<LanguageTag> {
        if audio.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(audio);
        match self.detector.detect_lang(&text) {
            Some(Lang::Eng) => Some(LanguageTag::En),
            Some(Lang::Vie) => Some(LanguageTag::Vi),
            _ => None,
        }
    }
}

/// Chooses the session language from accumulated audio, with a configured
/// default when the classifier cannot decide.
pub struct LanguageSelector {
    identifier: Box<dyn LanguageIdentifier>,
    default: LanguageTag,
}

impl LanguageSelector {
    pub fn new(identifier: Box<dyn LanguageIdentifier>, default: LanguageTag) -> Self {
        Self {
            identifier,
            default,
        }
    }

    /// Selector backed by the shipped `whatlang` classifier.
    pub fn with_default(default: LanguageTag) -> Self {
        Self::new(Box::new(WhatlangIdentifier::new()), default)
    }

    pub fn default_tag(&self) -> LanguageTag {
        self.default
    }

    /// Classify the buffer; never fails.
    pub fn select(&self, audio: &[u8]) -> LanguageTag {
        match self.identifier.identify(audio) {
            Some(tag) => {
                debug!(language = %tag, bytes = audio.len(), "language classified");
                tag
            }
            None => {
                debug!(
                    fallback = %self.default,
                    bytes = audio.len(),
                    "language classification inconclusive, using default"
                );
                self.default
            }
        }
    }
}
