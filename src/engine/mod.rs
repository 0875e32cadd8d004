//! # Recognition Engine Abstraction
//!
//! The gateway treats speech recognition as an opaque capability: an
//! [`AcousticModel`] loaded once per language at startup, from which each
//! session constructs short-lived [`Recognizer`] handles bound to the
//! session's current options. Results cross this boundary as the engine's
//! own serialized JSON so the dispatcher can pass them through verbatim.
//!
//! ## Backends:
//! - `null` (default build): accepts any audio, yields empty transcripts
//! - `vosk` (cargo feature `vosk`): Kaldi models via libvosk

pub mod null;
#[cfg(feature = "vosk")]
pub mod vosk;

pub use null::NullModel;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::ModelConfig;
use crate::language::LanguageTag;

/// Options a recognizer handle is bound to at construction. Changing any of
/// them on a live session invalidates the handle.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizerOptions {
    pub sample_rate: f32,
    pub show_words: bool,
    pub max_alternatives: u32,
}

/// Engine verdict after consuming a waveform chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoding {
    /// Utterance still open; carries the engine's partial-result JSON.
    Running { partial: String },
    /// The engine closed the utterance; carries the full result JSON.
    Finalized { result: String },
}

/// Failures raised by model loading, recognizer construction, or decoding.
/// All of them are fatal for the session that triggered them.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    ModelUnavailable(String),
    RecognizerConstruction(String),
    InvalidAudio(String),
    DecodingFailed(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::ModelUnavailable(msg) => write!(f, "model unavailable: {}", msg),
            EngineError::RecognizerConstruction(msg) => {
                write!(f, "recognizer construction failed: {}", msg)
            }
            EngineError::InvalidAudio(msg) => write!(f, "invalid audio: {}", msg),
            EngineError::DecodingFailed(msg) => write!(f, "decoding failed: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

/// Stateful decoding handle bound to one model and one option set.
///
/// Not safe for concurrent use; a handle is owned by exactly one session and
/// moved into at most one worker job at a time.
pub trait Recognizer: Send {
    /// Feed raw little-endian PCM16 bytes and report the utterance state.
    fn accept_waveform(&mut self, audio: &[u8]) -> Result<Decoding, EngineError>;

    /// Flush pending audio and return the terminal result JSON for the
    /// utterance. After this call the handle is drained.
    fn final_result(&mut self) -> Result<String, EngineError>;
}

/// Loaded per-language model, shared read-only across all sessions.
pub trait AcousticModel: Send + Sync {
    fn language(&self) -> LanguageTag;

    fn create_recognizer(
        &self,
        options: &RecognizerOptions,
    ) -> Result<Box<dyn Recognizer>, EngineError>;
}

/// Load one model per supported language from deployment configuration.
#[cfg(feature = "vosk")]
pub fn load_models(
    config: &ModelConfig,
) -> Result<HashMap<LanguageTag, Arc<dyn AcousticModel>>, EngineError> {
    vosk::load_models(config)
}

/// Fallback loader for builds without a recognition backend: every language
/// resolves to a [`NullModel`] so the gateway still speaks the full protocol.
#[cfg(not(feature = "vosk"))]
pub fn load_models(
    _config: &ModelConfig,
) -> Result<HashMap<LanguageTag, Arc<dyn AcousticModel>>, EngineError> {
    tracing::warn!(
        "built without a recognition backend; all sessions will receive empty transcripts"
    );
    let mut models: HashMap<LanguageTag, Arc<dyn AcousticModel>> = HashMap::new();
    for tag in LanguageTag::all() {
        models.insert(tag, Arc::new(NullModel::new(tag)));
    }
    Ok(models)
}
