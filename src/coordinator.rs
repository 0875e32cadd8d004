//! # Recognition Coordinator
//!
//! Owns the single-flight recognition contract for a session: pins the
//! language on first use, binds a recognizer handle to the session's current
//! options, moves handle plus an owned audio snapshot into a worker-pool
//! job, and awaits the result. Transient pool failures (saturation, run
//! timeout) are retried with doubling backoff against the same audio and the
//! already-pinned language; a handle lost to a timed-out job is rebuilt on
//! the next attempt. Engine failures are fatal for the session, as are
//! exhausted retries.
//!
//! ## Attempt Flow:
//! 1. **Pin the language**: the first recognition fixes the session's language, later attempts reuse it
//! 2. **Reserve a slot**: bounded wait on the worker pool, with saturation reported as transient
//! 3. **Bind the recognizer**: take the session's live handle or build one for its current options
//! 4. **Decode off-runtime**: handle and audio move into a blocking job while the task only awaits
//! 5. **Classify the outcome**: transient failures back off and retry, engine failures end the session

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::engine::{Decoding, Recognizer};
use crate::error::{GatewayError, GatewayResult};
use crate::language::LanguageSelector;
use crate::registry::ModelRegistry;
use crate::session::Session;
use crate::workers::{PoolError, RecognitionPool};

/// Bounded backoff for transient worker-pool failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// First retry delay; doubles per further attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

/// One recognition result: the engine's raw JSON and its finality verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionOutcome {
    pub raw: String,
    pub is_final: bool,
}

enum Pass {
    /// Full accumulated buffer, flushed to a terminal result.
    Final,
    /// One delta chunk against the persistent recognizer.
    Chunk(Vec<u8>),
}

enum AttemptError {
    Transient(PoolError),
    Fatal(GatewayError),
}

pub struct RecognitionCoordinator {
    registry: Arc<ModelRegistry>,
    pool: Arc<RecognitionPool>,
    selector: Arc<LanguageSelector>,
    retry: RetryPolicy,
}

impl RecognitionCoordinator {
    pub fn new(
        registry: Arc<ModelRegistry>,
        pool: Arc<RecognitionPool>,
        selector: Arc<LanguageSelector>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            pool,
            selector,
            retry,
        }
    }

    /// Final recognition over the session's full buffer. Always terminal.
    pub async fn recognize_final(&self, session: &mut Session) -> GatewayResult<RecognitionOutcome> {
        session.begin_recognition()?;
        let raw = self.run_with_retry(session, Pass::Final).await?.0;
        session.mark_responded();
        Ok(RecognitionOutcome { raw, is_final: true })
    }

    /// Streaming-mode recognition of one delta chunk; the engine's own
    /// verdict decides finality.
    pub async fn recognize_chunk(
        &self,
        session: &mut Session,
        chunk: Vec<u8>,
    ) -> GatewayResult<RecognitionOutcome> {
        session.begin_recognition()?;
        let (raw, is_final) = self.run_with_retry(session, Pass::Chunk(chunk)).await?;
        session.mark_responded();
        Ok(RecognitionOutcome { raw, is_final })
    }

    async fn run_with_retry(
        &self,
        session: &mut Session,
        pass: Pass,
    ) -> GatewayResult<(String, bool)> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.attempt(session, &pass).await {
                Ok(outcome) => return Ok(outcome),
                Err(AttemptError::Transient(pool_err)) if attempt < self.retry.attempts => {
                    let delay = self.retry.base_delay * 2u32.pow(attempt - 1);
                    warn!(
                        conn = %session.conn_id(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %pool_err,
                        "transient recognition failure, retrying"
                    );
                    sleep(delay).await;
                }
                Err(AttemptError::Transient(pool_err)) => {
                    warn!(
                        conn = %session.conn_id(),
                        attempts = attempt,
                        error = %pool_err,
                        "recognition retries exhausted"
                    );
                    return Err(GatewayError::Pool(pool_err));
                }
                Err(AttemptError::Fatal(err)) => return Err(err),
            }
        }
    }

    /// One pool round-trip. The slot is reserved before the recognizer
    /// handle is touched, so a saturation failure leaves session state
    /// untouched for the retry.
    async fn attempt(&self, session: &mut Session, pass: &Pass) -> Result<(String, bool), AttemptError> {
        if session.active_language().is_none() {
            let tag = self.selector.select(session.audio());
            session.set_active_language(tag);
            info!(conn = %session.conn_id(), language = %tag, "session language pinned");
        }

        let slot = match self.pool.reserve().await {
            Ok(slot) => slot,
            Err(err) if err.is_transient() => return Err(AttemptError::Transient(err)),
            Err(err) => return Err(AttemptError::Fatal(GatewayError::Pool(err))),
        };

        let resumed = session.has_recognizer();
        let recognizer = match session.take_recognizer() {
            Some(handle) => handle,
            None => {
                let tag = match session.active_language() {
                    Some(tag) => tag,
                    None => self.selector.default_tag(),
                };
                let model = self.registry.resolve(tag);
                model
                    .create_recognizer(&session.recognizer_options())
                    .map_err(|err| AttemptError::Fatal(GatewayError::Engine(err)))?
            }
        };

        // a resumed handle has already consumed the buffer chunk by chunk,
        // so a final pass over it only flushes; a fresh handle decodes the
        // whole buffer
        let data = match pass {
            Pass::Final if resumed => Vec::new(),
            Pass::Final => session.audio().to_vec(),
            Pass::Chunk(chunk) => chunk.clone(),
        };
        let flush = matches!(pass, Pass::Final);

        let job = move || {
            let mut recognizer = recognizer;
            let outcome = decode(recognizer.as_mut(), &data, flush);
            (recognizer, outcome)
        };

        match slot.run(job).await {
            Ok((handle, Ok(outcome))) => {
                session.put_recognizer(handle);
                Ok(outcome)
            }
            Ok((_handle, Err(engine_err))) => {
                Err(AttemptError::Fatal(GatewayError::Engine(engine_err)))
            }
            // the handle is inside the abandoned or failed job; nothing to restore
            Err(err) if err.is_transient() => Err(AttemptError::Transient(err)),
            Err(err) => Err(AttemptError::Fatal(GatewayError::Pool(err))),
        }
    }
}

/// Blocking decode step executed on a pool thread.
fn decode(
    recognizer: &mut dyn Recognizer,
    data: &[u8],
    flush: bool,
) -> Result<(String, bool), crate::engine::EngineError> {
    let verdict = recognizer.accept_waveform(data)?;
    if flush {
        let raw = recognizer.final_result()?;
        return Ok((raw, true));
    }
    Ok(match verdict {
        Decoding::Running { partial } => (partial, false),
        Decoding::Finalized { result } => (result, true),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use uuid::Uuid;

    use crate::config::RecognitionConfig;
    use crate::engine::{AcousticModel, EngineError, RecognizerOptions};
    use crate::language::LanguageTag;
    use crate::workers::PoolConfig;

    struct FixedModel {
        language: LanguageTag,
        text: &'static str,
        constructions: Arc<AtomicUsize>,
        bytes_fed: Arc<AtomicUsize>,
        fail_construction: bool,
        fail_decode: bool,
        finalize_on_accept: bool,
    }

    impl FixedModel {
        fn new(language: LanguageTag, text: &'static str) -> Self {
            Self {
                language,
                text,
                constructions: Arc::new(AtomicUsize::new(0)),
                bytes_fed: Arc::new(AtomicUsize::new(0)),
                fail_construction: false,
                fail_decode: false,
                finalize_on_accept: false,
            }
        }
    }

    impl AcousticModel for FixedModel {
        fn language(&self) -> LanguageTag {
            self.language
        }

        fn create_recognizer(
            &self,
            _options: &RecognizerOptions,
        ) -> Result<Box<dyn Recognizer>, EngineError> {
            if self.fail_construction {
                return Err(EngineError::RecognizerConstruction("scripted".to_string()));
            }
            self.constructions.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FixedRecognizer {
                text: self.text,
                bytes_fed: Arc::clone(&self.bytes_fed),
                fail_decode: self.fail_decode,
                finalize_on_accept: self.finalize_on_accept,
            }))
        }
    }

    struct FixedRecognizer {
        text: &'static str,
        bytes_fed: Arc<AtomicUsize>,
        fail_decode: bool,
        finalize_on_accept: bool,
    }

    impl FixedRecognizer {
        fn result_json(&self) -> String {
            format!(r#"{{"text": "{}"}}"#, self.text)
        }
    }

    impl Recognizer for FixedRecognizer {
        fn accept_waveform(&mut self, audio: &[u8]) -> Result<Decoding, EngineError> {
            self.bytes_fed.fetch_add(audio.len(), Ordering::SeqCst);
            if self.fail_decode {
                return Err(EngineError::DecodingFailed("scripted".to_string()));
            }
            if self.finalize_on_accept {
                return Ok(Decoding::Finalized {
                    result: self.result_json(),
                });
            }
            Ok(Decoding::Running {
                partial: r#"{"partial": ""}"#.to_string(),
            })
        }

        fn final_result(&mut self) -> Result<String, EngineError> {
            Ok(self.result_json())
        }
    }

    fn coordinator_with(model: FixedModel, pool: RecognitionPool, retry: RetryPolicy) -> RecognitionCoordinator {
        let mut models: HashMap<LanguageTag, Arc<dyn AcousticModel>> = HashMap::new();
        let tag = model.language;
        models.insert(tag, Arc::new(model));
        let registry = ModelRegistry::new(models, tag).unwrap();
        RecognitionCoordinator::new(
            Arc::new(registry),
            Arc::new(pool),
            Arc::new(LanguageSelector::with_default(tag)),
            retry,
        )
    }

    fn session() -> Session {
        Session::new(Uuid::new_v4(), &RecognitionConfig::default())
    }

    fn quick_retry() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn final_pass_pins_language_and_is_terminal() {
        let coordinator = coordinator_with(
            FixedModel::new(LanguageTag::En, "hello world"),
            RecognitionPool::new(PoolConfig::default()),
            quick_retry(),
        );
        let mut session = session();
        session.append_audio(b"the quick brown fox jumps over the lazy dog again and again");

        let outcome = coordinator.recognize_final(&mut session).await.unwrap();
        assert!(outcome.is_final);
        assert!(outcome.raw.contains("hello world"));
        assert_eq!(session.active_language(), Some(LanguageTag::En));
    }

    #[tokio::test]
    async fn chunk_pass_reuses_one_recognizer() {
        let model = FixedModel::new(LanguageTag::En, "partial flow");
        let constructions = Arc::clone(&model.constructions);
        let coordinator = coordinator_with(
            model,
            RecognitionPool::new(PoolConfig::default()),
            quick_retry(),
        );
        let mut session = session();

        for _ in 0..3 {
            session.append_audio(&[0u8; 320]);
            let outcome = coordinator
                .recognize_chunk(&mut session, vec![0u8; 320])
                .await
                .unwrap();
            assert!(!outcome.is_final);
            session.resume_collecting();
        }
        assert_eq!(constructions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn final_pass_after_chunks_flushes_without_refeeding() {
        let model = FixedModel::new(LanguageTag::En, "streamed");
        let bytes_fed = Arc::clone(&model.bytes_fed);
        let coordinator = coordinator_with(
            model,
            RecognitionPool::new(PoolConfig::default()),
            quick_retry(),
        );
        let mut session = session();

        session.append_audio(&[0u8; 320]);
        coordinator
            .recognize_chunk(&mut session, vec![0u8; 320])
            .await
            .unwrap();
        session.resume_collecting();
        assert_eq!(bytes_fed.load(Ordering::SeqCst), 320);

        let outcome = coordinator.recognize_final(&mut session).await.unwrap();
        assert!(outcome.is_final);
        // the resumed handle is flushed, not fed the buffer a second time
        assert_eq!(bytes_fed.load(Ordering::SeqCst), 320);
    }

    #[tokio::test]
    async fn chunk_pass_honors_engine_finalized_verdict() {
        let mut model = FixedModel::new(LanguageTag::En, "done");
        model.finalize_on_accept = true;
        let coordinator = coordinator_with(
            model,
            RecognitionPool::new(PoolConfig::default()),
            quick_retry(),
        );
        let mut session = session();
        session.append_audio(&[0u8; 64]);

        let outcome = coordinator
            .recognize_chunk(&mut session, vec![0u8; 64])
            .await
            .unwrap();
        assert!(outcome.is_final);
        assert!(outcome.raw.contains("done"));
    }

    #[tokio::test]
    async fn saturation_is_retried_with_pinned_language() {
        let pool = RecognitionPool::new(PoolConfig {
            slots: 1,
            acquire_timeout: Duration::from_millis(40),
            run_timeout: None,
        });
        let coordinator = coordinator_with(
            FixedModel::new(LanguageTag::En, "after retry"),
            pool,
            quick_retry(),
        );

        // hog the only slot for the first attempt
        let held = coordinator.pool.reserve().await.unwrap();
        tokio::spawn(async move {
            sleep(Duration::from_millis(60)).await;
            drop(held);
        });

        let mut session = session();
        session.append_audio(b"the quick brown fox jumps over the lazy dog once more");
        let before = session.audio().to_vec();

        let outcome = coordinator.recognize_final(&mut session).await.unwrap();
        assert!(outcome.raw.contains("after retry"));
        assert_eq!(session.active_language(), Some(LanguageTag::En));
        assert_eq!(session.audio(), &before[..]);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_pool_error() {
        let pool = RecognitionPool::new(PoolConfig {
            slots: 1,
            acquire_timeout: Duration::from_millis(20),
            run_timeout: None,
        });
        let coordinator = coordinator_with(
            FixedModel::new(LanguageTag::En, "never"),
            pool,
            RetryPolicy {
                attempts: 2,
                base_delay: Duration::from_millis(5),
            },
        );
        let _held = coordinator.pool.reserve().await.unwrap();

        let mut session = session();
        session.append_audio(&[0u8; 32]);
        let err = coordinator.recognize_final(&mut session).await.unwrap_err();
        assert!(matches!(err, GatewayError::Pool(_)));
    }

    #[tokio::test]
    async fn construction_failure_is_fatal() {
        let mut model = FixedModel::new(LanguageTag::En, "unused");
        model.fail_construction = true;
        let coordinator = coordinator_with(
            model,
            RecognitionPool::new(PoolConfig::default()),
            quick_retry(),
        );
        let mut session = session();
        session.append_audio(&[0u8; 32]);

        let err = coordinator.recognize_final(&mut session).await.unwrap_err();
        assert!(matches!(err, GatewayError::Engine(_)));
    }

    #[tokio::test]
    async fn decode_failure_is_fatal() {
        let mut model = FixedModel::new(LanguageTag::En, "unused");
        model.fail_decode = true;
        let coordinator = coordinator_with(
            model,
            RecognitionPool::new(PoolConfig::default()),
            quick_retry(),
        );
        let mut session = session();
        session.append_audio(&[0u8; 32]);

        let err = coordinator.recognize_final(&mut session).await.unwrap_err();
        assert!(matches!(err, GatewayError::Engine(_)));
    }

    #[tokio::test]
    async fn second_dispatch_while_in_flight_is_rejected() {
        let coordinator = coordinator_with(
            FixedModel::new(LanguageTag::En, "busy"),
            RecognitionPool::new(PoolConfig::default()),
            quick_retry(),
        );
        let mut session = session();
        session.begin_recognition().unwrap();

        let err = coordinator.recognize_final(&mut session).await.unwrap_err();
        assert!(matches!(err, GatewayError::Protocol(_)));
    }
}
