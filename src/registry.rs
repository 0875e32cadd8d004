//! # Language Model Registry
//!
//! Maps language tags to loaded acoustic models. Built once at startup from
//! the deployment's model paths and shared read-only across every session;
//! nothing mutates it after construction, so lookups need no locking. The
//! optional speaker model is loaded alongside and carried inside each
//! backend model handle rather than here, keeping the registry
//! engine-agnostic.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::AcousticModel;
use crate::error::{GatewayError, GatewayResult};
use crate::language::LanguageTag;

pub struct ModelRegistry {
    models: HashMap<LanguageTag, Arc<dyn AcousticModel>>,
    default: LanguageTag,
}

impl ModelRegistry {
    /// Build the registry. The default tag must be backed by a model; other
    /// tags may be absent and will resolve to the default.
    pub fn new(
        models: HashMap<LanguageTag, Arc<dyn AcousticModel>>,
        default: LanguageTag,
    ) -> GatewayResult<Self> {
        if !models.contains_key(&default) {
            return Err(GatewayError::Configuration(format!(
                "no model loaded for default language {}",
                default
            )));
        }
        Ok(Self { models, default })
    }

    /// Resolve a tag to its model; tags without a loaded model fall back to
    /// the default language's model.
    pub fn resolve(&self, tag: LanguageTag) -> Arc<dyn AcousticModel> {
        match self.models.get(&tag) {
            Some(model) => Arc::clone(model),
            None => Arc::clone(&self.models[&self.default]),
        }
    }

    pub fn default_tag(&self) -> LanguageTag {
        self.default
    }

    /// Number of distinct models loaded.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
