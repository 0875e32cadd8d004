//! # Process-Wide State
//!
//! Everything shared across connections lives here, constructed once at
//! startup and handed to each connection task as an `Arc`. All of it is
//! immutable after assembly: the registry is read-only, the pool
//! synchronizes internally, and the notifier is stateless.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc (Atomically Reference Counted)
//! - **Purpose**: lets every connection task share one context without copying it
//! - **Cleanup**: the context is freed when the listener and the last session drop their handles
//! - **Thread safety**: `Arc<T>` is `Send + Sync` when `T` is, so any runtime thread may hold it
//!
//! ### Why there is no lock at this level
//! - **Immutable fields**: configuration and registry never change after startup
//! - **Internal synchronization**: the pool guards its slots with a semaphore and its counters with atomics
//! - **Per-session state**: mutable session data lives in [`crate::session::Session`], owned by exactly one task

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{GatewayConfig, RecognitionConfig};
use crate::coordinator::{RecognitionCoordinator, RetryPolicy};
use crate::engine;
use crate::error::GatewayResult;
use crate::forwarder::{ConsumerNotifier, HttpForwarder};
use crate::language::LanguageSelector;
use crate::registry::ModelRegistry;
use crate::workers::{PoolConfig, RecognitionPool};

/// Shared context handed to every connection task.
///
/// ## Thread Safety:
/// Every field is either immutable after construction or synchronizes
/// internally, so the struct is shared as a plain `Arc<GatewayContext>`
/// with no outer lock.
pub struct GatewayContext {
    /// Session defaults and recognition mode.
    pub recognition: RecognitionConfig,
    pub registry: Arc<ModelRegistry>,
    pub pool: Arc<RecognitionPool>,
    pub coordinator: RecognitionCoordinator,
    pub notifier: Arc<dyn ConsumerNotifier>,
    started: Instant,
}

impl GatewayContext {
    pub fn new(
        recognition: RecognitionConfig,
        registry: Arc<ModelRegistry>,
        pool: Arc<RecognitionPool>,
        selector: Arc<LanguageSelector>,
        retry: RetryPolicy,
        notifier: Arc<dyn ConsumerNotifier>,
    ) -> Arc<Self> {
        let coordinator =
            RecognitionCoordinator::new(Arc::clone(&registry), Arc::clone(&pool), selector, retry);
        Arc::new(Self {
            recognition,
            registry,
            pool,
            coordinator,
            notifier,
            started: Instant::now(),
        })
    }

    /// Assemble every process-wide resource from deployment configuration.
    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Arc<Self>> {
        let models = engine::load_models(&config.models)?;
        let registry = Arc::new(ModelRegistry::new(
            models,
            config.recognition.default_language,
        )?);
        let pool = Arc::new(RecognitionPool::new(PoolConfig {
            slots: config.pool.slots,
            acquire_timeout: Duration::from_millis(config.pool.acquire_timeout_ms),
            run_timeout: config.recognition.timeout_ms.map(Duration::from_millis),
        }));
        let selector = Arc::new(LanguageSelector::with_default(
            config.recognition.default_language,
        ));
        let retry = RetryPolicy {
            attempts: config.pool.retry_attempts,
            base_delay: Duration::from_millis(config.pool.retry_base_delay_ms),
        };
        let notifier: Arc<dyn ConsumerNotifier> =
            Arc::new(HttpForwarder::new(config.forwarder.consumer_base.clone())?);

        Ok(Self::new(
            config.recognition.clone(),
            registry,
            pool,
            selector,
            retry,
            notifier,
        ))
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}
