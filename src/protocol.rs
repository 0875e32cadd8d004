//! # Wire Protocol
//!
//! Inbound text frames carry JSON control envelopes or the end-of-stream
//! marker; binary frames carry raw PCM and never reach this module. Outbound
//! result frames are the engine's own JSON passed through verbatim, so the
//! only outbound shape defined here is the fatal-error frame.
//!
//! Classification follows the deployed wire convention: the end marker is
//! matched as a substring of the text frame and takes priority over JSON
//! parsing, so a control value containing the letters `end` terminates the
//! stream.

use serde::Deserialize;

/// End-of-stream marker.
pub const END_OF_STREAM: &str = "end";

/// Recognized `config` sub-keys; absent fields leave session values
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConfigUpdate {
    pub sample_rate: Option<f32>,
    pub words: Option<bool>,
    pub max_alternatives: Option<u32>,
}

/// Recognized `session` sub-keys; absent fields leave identity unchanged.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SessionUpdate {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ControlEnvelope {
    config: Option<ConfigUpdate>,
    session: Option<SessionUpdate>,
}

/// Classified inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    EndOfStream,
    Config(ConfigUpdate),
    Session(SessionUpdate),
    /// Bad JSON, unknown envelope shape, or type-invalid values; logged and
    /// skipped by the dispatcher.
    Unrecognized,
}

/// Classify one text frame, in priority order: end marker, `config`
/// envelope, `session` envelope. An envelope carrying both keys counts as
/// `config`.
pub fn classify(text: &str) -> ControlMessage {
    if text.contains(END_OF_STREAM) {
        return ControlMessage::EndOfStream;
    }
    match serde_json::from_str::<ControlEnvelope>(text) {
        Ok(ControlEnvelope {
            config: Some(config),
            ..
        }) => ControlMessage::Config(config),
        Ok(ControlEnvelope {
            session: Some(session),
            ..
        }) => ControlMessage::Session(session),
        _ => ControlMessage::Unrecognized,
    }
}

/// Serialized error frame sent to the client before a fatal close.
pub fn error_frame(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}
