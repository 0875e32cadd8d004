//! # Session State
//!
//! Per-connection mutable record and its lifecycle phase machine. A session
//! is owned exclusively by its connection task; the worker pool only ever
//! sees owned snapshots of the audio and a recognizer handle moved in and
//! out of a job, so nothing here needs locking.
//!
//! ## Lifecycle:
//! 1. **Collecting**: accumulating audio and control messages
//! 2. **Recognizing**: one recognition call in flight
//! 3. **Responded**: result frame sent, loop about to resume
//! 4. **Draining**: end-of-stream seen, final recognition pending
//! 5. **Closed**: terminal; all resources released

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::RecognitionConfig;
use crate::engine::{Recognizer, RecognizerOptions};
use crate::error::{GatewayError, GatewayResult};
use crate::language::LanguageTag;
use crate::protocol::{ConfigUpdate, SessionUpdate};

/// Lifecycle phase of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Collecting,
    Recognizing,
    Responded,
    Draining,
    Closed,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Collecting => "collecting",
            SessionPhase::Recognizing => "recognizing",
            SessionPhase::Responded => "responded",
            SessionPhase::Draining => "draining",
            SessionPhase::Closed => "closed",
        }
    }
}

/// Per-connection session record.
pub struct Session {
    conn_id: Uuid,
    pub sample_rate: f32,
    pub show_words: bool,
    pub max_alternatives: u32,
    pub session_id: String,
    pub user_id: String,
    audio: Vec<u8>,
    active_language: Option<LanguageTag>,
    recognizer: Option<Box<dyn Recognizer>>,
    phase: SessionPhase,
    created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(conn_id: Uuid, defaults: &RecognitionConfig) -> Self {
        Self {
            conn_id,
            sample_rate: defaults.sample_rate,
            show_words: defaults.show_words,
            max_alternatives: defaults.max_alternatives,
            session_id: String::new(),
            user_id: String::new(),
            audio: Vec::new(),
            active_language: None,
            recognizer: None,
            phase: SessionPhase::Collecting,
            created_at: Utc::now(),
        }
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn audio(&self) -> &[u8] {
        &self.audio
    }

    pub fn active_language(&self) -> Option<LanguageTag> {
        self.active_language
    }

    /// Options the next recognizer handle must be bound to.
    pub fn recognizer_options(&self) -> RecognizerOptions {
        RecognizerOptions {
            sample_rate: self.sample_rate,
            show_words: self.show_words,
            max_alternatives: self.max_alternatives,
        }
    }

    /// Merge a `config` envelope. Changing any recognizer-visible option
    /// invalidates the current handle so the next recognition is bound to
    /// the last applied values.
    pub fn apply_config(&mut self, update: ConfigUpdate) {
        if self.phase != SessionPhase::Collecting {
            warn!(
                conn = %self.conn_id,
                phase = self.phase.as_str(),
                "config message ignored outside collecting phase"
            );
            return;
        }

        let mut changed = false;
        if let Some(rate) = update.sample_rate {
            changed |= rate != self.sample_rate;
            self.sample_rate = rate;
        }
        if let Some(words) = update.words {
            changed |= words != self.show_words;
            self.show_words = words;
        }
        if let Some(alternatives) = update.max_alternatives {
            changed |= alternatives != self.max_alternatives;
            self.max_alternatives = alternatives;
        }
        if changed {
            self.invalidate_recognizer();
        }
        debug!(
            conn = %self.conn_id,
            sample_rate = self.sample_rate,
            words = self.show_words,
            max_alternatives = self.max_alternatives,
            "configuration applied"
        );
    }

    /// Merge a `session` envelope into the identity fields.
    pub fn apply_session(&mut self, update: SessionUpdate) {
        if self.phase != SessionPhase::Collecting {
            warn!(
                conn = %self.conn_id,
                phase = self.phase.as_str(),
                "session message ignored outside collecting phase"
            );
            return;
        }
        if let Some(session_id) = update.session_id {
            self.session_id = session_id;
        }
        if let Some(user_id) = update.user_id {
            self.user_id = user_id;
        }
        debug!(
            conn = %self.conn_id,
            session_id = %self.session_id,
            user_id = %self.user_id,
            "session identity applied"
        );
    }

    /// Append an audio chunk. Accepted only while collecting; audio after
    /// end-of-stream or close is dropped.
    pub fn append_audio(&mut self, chunk: &[u8]) {
        if self.phase != SessionPhase::Collecting {
            warn!(
                conn = %self.conn_id,
                phase = self.phase.as_str(),
                bytes = chunk.len(),
                "audio dropped outside collecting phase"
            );
            return;
        }
        self.audio.extend_from_slice(chunk);
    }

    /// Pin (or re-pin) the session language. A different tag invalidates
    /// the recognizer handle.
    pub fn set_active_language(&mut self, tag: LanguageTag) {
        if self.active_language != Some(tag) {
            self.invalidate_recognizer();
        }
        self.active_language = Some(tag);
    }

    /// Observe end-of-stream: no further audio will be accepted.
    pub fn begin_drain(&mut self) {
        match self.phase {
            SessionPhase::Collecting | SessionPhase::Responded => {
                self.phase = SessionPhase::Draining;
            }
            SessionPhase::Draining => {}
            other => {
                warn!(
                    conn = %self.conn_id,
                    phase = other.as_str(),
                    "end-of-stream ignored in this phase"
                );
            }
        }
    }

    /// Single-flight guard: marks a recognition in flight, rejecting
    /// dispatch while another one is.
    pub fn begin_recognition(&mut self) -> GatewayResult<()> {
        match self.phase {
            SessionPhase::Collecting | SessionPhase::Draining => {
                self.phase = SessionPhase::Recognizing;
                Ok(())
            }
            SessionPhase::Recognizing => Err(GatewayError::Protocol(
                "recognition already in flight for this session".to_string(),
            )),
            other => Err(GatewayError::Protocol(format!(
                "recognition dispatched in {} phase",
                other.as_str()
            ))),
        }
    }

    /// A result was produced and is about to be sent.
    pub fn mark_responded(&mut self) {
        if self.phase == SessionPhase::Recognizing {
            self.phase = SessionPhase::Responded;
        }
    }

    /// Resume collecting after a non-final response.
    pub fn resume_collecting(&mut self) {
        if self.phase == SessionPhase::Responded {
            self.phase = SessionPhase::Collecting;
        }
    }

    pub fn has_recognizer(&self) -> bool {
        self.recognizer.is_some()
    }

    /// Drop the current handle; the next recognition builds a fresh one.
    pub fn invalidate_recognizer(&mut self) {
        if self.recognizer.take().is_some() {
            debug!(conn = %self.conn_id, "recognizer invalidated");
        }
    }

    /// Move the handle out for a worker job.
    pub fn take_recognizer(&mut self) -> Option<Box<dyn Recognizer>> {
        self.recognizer.take()
    }

    /// Return a handle from a finished job. Discarded if the session
    /// already closed.
    pub fn put_recognizer(&mut self, recognizer: Box<dyn Recognizer>) {
        if self.phase == SessionPhase::Closed {
            debug!(conn = %self.conn_id, "recognizer discarded after close");
            return;
        }
        self.recognizer = Some(recognizer);
    }

    /// Terminal transition; releases the recognizer and the audio buffer.
    /// Safe to call more than once.
    pub fn close(&mut self) {
        if self.phase == SessionPhase::Closed {
            return;
        }
        let age_ms = (Utc::now() - self.created_at).num_milliseconds();
        debug!(
            conn = %self.conn_id,
            session_id = %self.session_id,
            from = self.phase.as_str(),
            audio_bytes = self.audio.len(),
            age_ms,
            "session closed"
        );
        self.phase = SessionPhase::Closed;
        self.recognizer = None;
        self.audio = Vec::new();
    }
}
