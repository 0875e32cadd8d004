// Shared harness for session-flow tests: scripted recognition backends, a
// recording notifier, and an in-memory WebSocket pair driving the real
// dispatcher.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use asr_gateway::config::RecognitionConfig;
use asr_gateway::coordinator::RetryPolicy;
use asr_gateway::dispatcher;
use asr_gateway::engine::{AcousticModel, Decoding, EngineError, Recognizer, RecognizerOptions};
use asr_gateway::forwarder::ConsumerNotifier;
use asr_gateway::language::{LanguageSelector, LanguageTag};
use asr_gateway::registry::ModelRegistry;
use asr_gateway::state::GatewayContext;
use asr_gateway::workers::{PoolConfig, RecognitionPool};

/// Backend stub whose transcript is the UTF-8 text of every byte it was
/// fed, making result attribution checkable end to end.
pub struct EchoModel {
    language: LanguageTag,
}

impl EchoModel {
    pub fn new(language: LanguageTag) -> Self {
        Self { language }
    }
}

impl AcousticModel for EchoModel {
    fn language(&self) -> LanguageTag {
        self.language
    }

    fn create_recognizer(
        &self,
        _options: &RecognizerOptions,
    ) -> Result<Box<dyn Recognizer>, EngineError> {
        Ok(Box::new(EchoRecognizer { heard: Vec::new() }))
    }
}

struct EchoRecognizer {
    heard: Vec<u8>,
}

impl EchoRecognizer {
    fn transcript(&self) -> String {
        String::from_utf8_lossy(&self.heard).into_owned()
    }
}

impl Recognizer for EchoRecognizer {
    fn accept_waveform(&mut self, audio: &[u8]) -> Result<Decoding, EngineError> {
        self.heard.extend_from_slice(audio);
        Ok(Decoding::Running {
            partial: serde_json::json!({ "partial": self.transcript() }).to_string(),
        })
    }

    fn final_result(&mut self) -> Result<String, EngineError> {
        Ok(serde_json::json!({ "text": self.transcript() }).to_string())
    }
}

/// Captures every downstream notification instead of POSTing it.
#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<(String, String, String)>>,
}

impl RecordingNotifier {
    pub fn calls(&self) -> Vec<(String, String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConsumerNotifier for RecordingNotifier {
    async fn final_transcript(&self, session_id: &str, user_id: &str, text: &str) {
        self.calls.lock().unwrap().push((
            session_id.to_string(),
            user_id.to_string(),
            text.to_string(),
        ));
    }
}

pub struct TestGateway {
    pub ctx: Arc<GatewayContext>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn gateway(recognition: RecognitionConfig, pool: PoolConfig) -> TestGateway {
    let model = Arc::new(EchoModel::new(recognition.default_language));
    gateway_with_model(model, recognition, pool)
}

pub fn gateway_with_model(
    model: Arc<dyn AcousticModel>,
    recognition: RecognitionConfig,
    pool: PoolConfig,
) -> TestGateway {
    let notifier = Arc::new(RecordingNotifier::default());
    let ctx = gateway_with_notifier(
        model,
        recognition,
        pool,
        notifier.clone() as Arc<dyn ConsumerNotifier>,
    );
    TestGateway { ctx, notifier }
}

/// Same assembly with a caller-supplied notifier, for tests that need to
/// observe or stall the downstream call.
pub fn gateway_with_notifier(
    model: Arc<dyn AcousticModel>,
    recognition: RecognitionConfig,
    pool: PoolConfig,
    notifier: Arc<dyn ConsumerNotifier>,
) -> Arc<GatewayContext> {
    let tag = model.language();
    let mut models: HashMap<LanguageTag, Arc<dyn AcousticModel>> = HashMap::new();
    models.insert(tag, model);
    let registry = Arc::new(ModelRegistry::new(models, tag).unwrap());

    GatewayContext::new(
        recognition,
        registry,
        Arc::new(RecognitionPool::new(pool)),
        Arc::new(LanguageSelector::with_default(tag)),
        RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(10),
        },
        notifier,
    )
}

pub type ClientSocket = WebSocketStream<DuplexStream>;

/// Open an in-memory connection against a running dispatcher task.
pub async fn connect(ctx: Arc<GatewayContext>) -> (ClientSocket, JoinHandle<()>) {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let server_ws = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
    let handle = tokio::spawn(async move {
        let _ = dispatcher::run_session(server_ws, ctx).await;
    });
    let client_ws = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
    (client_ws, handle)
}

/// Next text frame from the server, skipping control frames.
pub async fn next_text(ws: &mut ClientSocket) -> String {
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(frame) = ws.next().await {
            if let Message::Text(text) = frame.unwrap() {
                return text;
            }
        }
        panic!("connection closed before a text frame arrived");
    })
    .await
    .expect("timed out waiting for a text frame")
}
