//! # Result Forwarder
//!
//! Best-effort notification of final transcripts to the downstream
//! consumer. The result has already been delivered to the WebSocket client
//! by the time this runs, so every failure here is logged and swallowed;
//! nothing is retried and nothing reaches the client or delays teardown.
//!
//! ## Delivery Contract:
//! - **Client first**: the WebSocket result frame is sent before forwarding starts
//! - **Best effort**: connection errors and non-success statuses are logged, never retried
//! - **Isolated**: a dead consumer cannot fail a session or block its teardown
//! - **Finals only**: streamed partial results never leave the gateway

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{GatewayError, GatewayResult};

/// Downstream notification capability. Invoked for final results only.
#[async_trait]
pub trait ConsumerNotifier: Send + Sync {
    async fn final_transcript(&self, session_id: &str, user_id: &str, text: &str);
}

/// Best transcript text of an engine result payload: the top-level `text`
/// field, else the first alternative's text, else empty.
pub fn best_text(raw: &str) -> String {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(_) => return String::new(),
    };
    if let Some(text) = value.get("text").and_then(|t| t.as_str()) {
        return text.to_string();
    }
    value
        .get("alternatives")
        .and_then(|alts| alts.get(0))
        .and_then(|first| first.get("text"))
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .unwrap_or_default()
}

#[derive(Serialize)]
struct TranscriptPayload<'a> {
    prompt: &'a str,
}

fn notify_url(base: &str, session_id: &str, user_id: &str) -> String {
    format!(
        "{}/v1/webrtc/{}/{}",
        base.trim_end_matches('/'),
        session_id,
        user_id
    )
}

/// HTTP notifier POSTing `{"prompt": <text>}` to
/// `{consumer_base}/v1/webrtc/{session_id}/{user_id}`. With no consumer
/// base configured the forwarder is disabled.
pub struct HttpForwarder {
    client: reqwest::Client,
    consumer_base: Option<String>,
}

impl HttpForwarder {
    pub fn new(consumer_base: Option<String>) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| {
                GatewayError::Configuration(format!("forwarder http client: {}", err))
            })?;
        Ok(Self {
            client,
            consumer_base,
        })
    }
}

#[async_trait]
impl ConsumerNotifier for HttpForwarder {
    async fn final_transcript(&self, session_id: &str, user_id: &str, text: &str) {
        let base = match &self.consumer_base {
            Some(base) => base,
            None => {
                debug!("no consumer endpoint configured, final transcript not forwarded");
                return;
            }
        };
        let url = notify_url(base, session_id, user_id);
        let payload = TranscriptPayload { prompt: text };

        match self.client.post(&url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(url = %url, chars = text.len(), "final transcript forwarded");
            }
            Ok(response) => {
                warn!(url = %url, status = %response.status(), "consumer rejected final transcript");
            }
            Err(err) => {
                warn!(url = %url, error = %err, "failed to forward final transcript");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_text_prefers_top_level_text() {
        assert_eq!(best_text(r#"{"text": "hello world"}"#), "hello world");
        assert_eq!(
            best_text(r#"{"text": "with words", "result": [{"word": "with"}]}"#),
            "with words"
        );
    }

    #[test]
    fn best_text_falls_back_to_first_alternative() {
        let raw = r#"{"alternatives": [{"text": "option one", "confidence": 245.1},
                                        {"text": "option two", "confidence": 131.0}]}"#;
        assert_eq!(best_text(raw), "option one");
    }

    #[test]
    fn best_text_is_empty_for_unusable_payloads() {
        assert_eq!(best_text(r#"{"partial": "still going"}"#), "");
        assert_eq!(best_text(r#"{"alternatives": []}"#), "");
        assert_eq!(best_text("not json"), "");
    }

    #[test]
    fn notify_url_shape() {
        assert_eq!(
            notify_url("http://consumer:9000", "s1", "u1"),
            "http://consumer:9000/v1/webrtc/s1/u1"
        );
        assert_eq!(
            notify_url("http://consumer:9000/", "s1", "u1"),
            "http://consumer:9000/v1/webrtc/s1/u1"
        );
    }

    #[tokio::test]
    async fn unconfigured_forwarder_is_a_no_op() {
        let forwarder = HttpForwarder::new(None).unwrap();
        forwarder.final_transcript("s1", "u1", "ignored").await;
    }
}
