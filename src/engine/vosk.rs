//! Kaldi-based recognition backend over libvosk. Enabled with the `vosk`
//! cargo feature; the shared library and the language model directories must
//! be present at runtime.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};
use vosk::{
    CompleteResult, DecodingState, Model, PartialResult, Recognizer as KaldiRecognizer,
    SpeakerModel,
};

use crate::audio;
use crate::config::ModelConfig;
use crate::engine::{AcousticModel, Decoding, EngineError, Recognizer, RecognizerOptions};
use crate::language::LanguageTag;

/// One loaded Kaldi model plus the optional shared speaker model for
/// speaker-adapted recognizers.
pub struct VoskModel {
    language: LanguageTag,
    model: Model,
    speaker: Option<Arc<SpeakerModel>>,
}

impl AcousticModel for VoskModel {
    fn language(&self) -> LanguageTag {
        self.language
    }

    fn create_recognizer(
        &self,
        options: &RecognizerOptions,
    ) -> Result<Box<dyn Recognizer>, EngineError> {
        let mut inner = match &self.speaker {
            Some(speaker) => {
                KaldiRecognizer::new_with_speaker(&self.model, options.sample_rate, speaker)
            }
            None => KaldiRecognizer::new(&self.model, options.sample_rate),
        }
        .ok_or_else(|| {
            EngineError::RecognizerConstruction(format!(
                "language {} at {} Hz",
                self.language, options.sample_rate
            ))
        })?;

        if options.max_alternatives > 0 {
            inner.set_max_alternatives(options.max_alternatives.min(u16::MAX as u32) as u16);
        }
        inner.set_words(options.show_words);

        debug!(
            language = %self.language,
            sample_rate = options.sample_rate,
            max_alternatives = options.max_alternatives,
            words = options.show_words,
            "kaldi recognizer created"
        );
        Ok(Box::new(VoskRecognizer { inner }))
    }
}

pub struct VoskRecognizer {
    inner: KaldiRecognizer,
}

impl Recognizer for VoskRecognizer {
    fn accept_waveform(&mut self, audio: &[u8]) -> Result<Decoding, EngineError> {
        let samples = audio::pcm16_samples(audio).map_err(EngineError::InvalidAudio)?;
        let state = self
            .inner
            .accept_waveform(&samples)
            .map_err(|err| EngineError::DecodingFailed(err.to_string()))?;
        match state {
            DecodingState::Finalized => Ok(Decoding::Finalized {
                result: complete_json(self.inner.result()),
            }),
            DecodingState::Running => Ok(Decoding::Running {
                partial: partial_json(&self.inner.partial_result()),
            }),
            DecodingState::Failed => Err(EngineError::DecodingFailed(
                "recognizer reported a decoding failure".to_string(),
            )),
        }
    }

    fn final_result(&mut self) -> Result<String, EngineError> {
        Ok(complete_json(self.inner.final_result()))
    }
}

fn partial_json(partial: &PartialResult<'_>) -> String {
    serde_json::json!({ "partial": partial.partial }).to_string()
}

/// Rebuild the engine's JSON shape from a complete result: an object with
/// `text` (plus word timings when requested) in single mode, or
/// `alternatives` when alternatives were requested.
fn complete_json(result: CompleteResult<'_>) -> String {
    match result {
        CompleteResult::Single(single) => {
            let mut value = serde_json::json!({ "text": single.text });
            if !single.result.is_empty() {
                let words: Vec<serde_json::Value> = single
                    .result
                    .iter()
                    .map(|word| {
                        serde_json::json!({
                            "conf": word.conf,
                            "start": word.start,
                            "end": word.end,
                            "word": word.word,
                        })
                    })
                    .collect();
                value["result"] = serde_json::Value::Array(words);
            }
            value.to_string()
        }
        CompleteResult::Multiple(multiple) => {
            let alternatives: Vec<serde_json::Value> = multiple
                .alternatives
                .iter()
                .map(|alternative| {
                    let mut entry = serde_json::json!({
                        "confidence": alternative.confidence,
                        "text": alternative.text,
                    });
                    if !alternative.result.is_empty() {
                        let words: Vec<serde_json::Value> = alternative
                            .result
                            .iter()
                            .map(|word| {
                                serde_json::json!({
                                    "start": word.start,
                                    "end": word.end,
                                    "word": word.word,
                                })
                            })
                            .collect();
                        entry["result"] = serde_json::Value::Array(words);
                    }
                    entry
                })
                .collect();
            serde_json::json!({ "alternatives": alternatives }).to_string()
        }
    }
}

/// Load the per-language Kaldi models and, when configured, the shared
/// speaker model.
pub fn load_models(
    config: &ModelConfig,
) -> Result<HashMap<LanguageTag, Arc<dyn AcousticModel>>, EngineError> {
    let speaker = match &config.speaker_model_path {
        Some(path) => {
            info!(path = %path, "loading speaker model");
            let model = SpeakerModel::new(path).ok_or_else(|| {
                EngineError::ModelUnavailable(format!("speaker model at {}", path))
            })?;
            Some(Arc::new(model))
        }
        None => None,
    };

    let mut models: HashMap<LanguageTag, Arc<dyn AcousticModel>> = HashMap::new();
    for tag in LanguageTag::all() {
        let path = config.path_for(tag);
        info!(language = %tag, path = %path, "loading acoustic model");
        let model = Model::new(path)
            .ok_or_else(|| EngineError::ModelUnavailable(format!("{} model at {}", tag, path)))?;
        models.insert(
            tag,
            Arc::new(VoskModel {
                language: tag,
                model,
                speaker: speaker.clone(),
            }),
        );
    }
    Ok(models)
}
