//! # Configuration Management
//!
//! Deployment configuration, loaded from layered sources:
//! 1. Built-in defaults (the `Default` impls below)
//! 2. `gateway.toml` in the working directory, if present
//! 3. Environment variables with the `ASR_` prefix
//! 4. Legacy flat variable names kept for deployment compatibility
//!    (`VOSK_SERVER_PORT`, `VOSK_EN_MODEL_PATH`, `LLM_HOST`, ...)
//!
//! `.env` files are read by the binary before loading, so any of the above
//! can live there as well.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

use crate::language::LanguageTag;
use crate::workers;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub models: ModelConfig,
    pub recognition: RecognitionConfig,
    pub pool: PoolSettings,
    pub forwarder: ForwarderConfig,
}

/// Listener binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub interface: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            interface: "0.0.0.0".to_string(),
            port: 2700,
        }
    }
}

/// Acoustic model storage paths, one per supported language, plus the
/// optional speaker model shared by all of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub en_model_path: String,
    pub vi_model_path: String,
    pub speaker_model_path: Option<String>,
}

impl ModelConfig {
    pub fn path_for(&self, tag: LanguageTag) -> &str {
        match tag {
            LanguageTag::En => &self.en_model_path,
            LanguageTag::Vi => &self.vi_model_path,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            en_model_path: "/opt/vosk-model-en".to_string(),
            vi_model_path: "/opt/vosk-model-vi".to_string(),
            speaker_model_path: None,
        }
    }
}

/// Session defaults and recognition behavior. `sample_rate`, `show_words`
/// and `max_alternatives` seed every new session and remain overridable per
/// session through `config` messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionConfig {
    pub sample_rate: f32,
    pub show_words: bool,
    pub max_alternatives: u32,
    pub default_language: LanguageTag,
    /// Emit engine partials per audio chunk instead of recognizing once at
    /// end-of-stream.
    pub streaming_partials: bool,
    /// Optional cap on a single recognition call; expiry is retried as a
    /// transient failure.
    pub timeout_ms: Option<u64>,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000.0,
            show_words: true,
            max_alternatives: 0,
            default_language: LanguageTag::En,
            streaming_partials: false,
            timeout_ms: None,
        }
    }
}

/// Worker-pool sizing and the transient-failure retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    pub slots: usize,
    pub acquire_timeout_ms: u64,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            slots: workers::default_slots(),
            acquire_timeout_ms: 5_000,
            retry_attempts: 3,
            retry_base_delay_ms: 250,
        }
    }
}

/// Downstream consumer endpoint; unset disables forwarding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForwarderConfig {
    pub consumer_base: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            models: ModelConfig::default(),
            recognition: RecognitionConfig::default(),
            pool: PoolSettings::default(),
            forwarder: ForwarderConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from defaults, optional `gateway.toml`, `ASR_*`
    /// environment variables, and the legacy flat variable names.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&GatewayConfig::default())?)
            .add_source(config::File::with_name("gateway").required(false))
            .add_source(config::Environment::with_prefix("ASR").separator("_"));

        // Legacy flat names; they outrank everything else.
        for (var, key) in [
            ("VOSK_SERVER_INTERFACE", "server.interface"),
            ("VOSK_SERVER_PORT", "server.port"),
            ("VOSK_EN_MODEL_PATH", "models.en_model_path"),
            ("VOSK_VI_MODEL_PATH", "models.vi_model_path"),
            ("VOSK_SPK_MODEL_PATH", "models.speaker_model_path"),
            ("VOSK_SAMPLE_RATE", "recognition.sample_rate"),
            ("VOSK_ALTERNATIVES", "recognition.max_alternatives"),
            ("VOSK_SHOW_WORDS", "recognition.show_words"),
            ("LLM_HOST", "forwarder.consumer_base"),
        ] {
            if let Ok(value) = env::var(var) {
                settings = settings.set_override(key, value)?;
            }
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Reject configurations that cannot serve.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("server port cannot be 0"));
        }

        if !self.recognition.sample_rate.is_finite() || self.recognition.sample_rate <= 0.0 {
            return Err(anyhow::anyhow!(
                "default sample rate must be a positive number, got {}",
                self.recognition.sample_rate
            ));
        }

        if self.pool.slots == 0 {
            return Err(anyhow::anyhow!("worker pool needs at least one slot"));
        }

        if self.pool.retry_attempts == 0 {
            return Err(anyhow::anyhow!("retry attempts must be at least 1"));
        }

        if let Some(base) = &self.forwarder.consumer_base {
            if !base.starts_with("http://") && !base.starts_with("https://") {
                return Err(anyhow::anyhow!(
                    "consumer base must be an http(s) URL, got {}",
                    base
                ));
            }
        }

        if cfg!(feature = "vosk") {
            for tag in LanguageTag::all() {
                if self.models.path_for(tag).is_empty() {
                    return Err(anyhow::anyhow!("missing model path for language {}", tag));
                }
            }
        }

        Ok(())
    }
}
