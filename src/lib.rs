pub mod audio;
pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod forwarder;
pub mod language;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod state;
pub mod workers;

pub use config::{GatewayConfig, RecognitionConfig, ServerConfig};
pub use coordinator::{RecognitionCoordinator, RecognitionOutcome, RetryPolicy};
pub use engine::{AcousticModel, Decoding, EngineError, Recognizer, RecognizerOptions};
pub use error::{GatewayError, GatewayResult};
pub use forwarder::{ConsumerNotifier, HttpForwarder};
pub use language::{LanguageSelector, LanguageTag};
pub use registry::ModelRegistry;
pub use server::Server;
pub use session::{Session, SessionPhase};
pub use state::GatewayContext;
pub use workers::{PoolConfig, PoolError, PoolStats, RecognitionPool};
