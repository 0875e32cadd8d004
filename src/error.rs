//! # Error Handling
//!
//! Gateway-wide error type and result alias. Component-local errors
//! (`EngineError`, `PoolError`) convert into [`GatewayError`] at the
//! boundaries where a session decides whether a failure is transient,
//! fatal for the session, or fatal for the process.

use std::fmt;

use crate::engine::EngineError;
use crate::workers::PoolError;

/// Top-level error type for the gateway.
///
/// ## Error Categories:
/// - **Configuration**: bad or missing settings at startup
/// - **Protocol**: a client violated the message contract in a way that
///   cannot be absorbed (absorbable violations are logged and skipped)
/// - **Transport**: WebSocket/TCP failures on an established connection
/// - **Engine**: recognizer construction or decoding failures
/// - **Pool**: worker-pool acquisition or execution failures
/// - **Io**: listener/socket errors outside an established session
#[derive(Debug)]
pub enum GatewayError {
    Configuration(String),
    Protocol(String),
    Transport(tokio_tungstenite::tungstenite::Error),
    Engine(EngineError),
    Pool(PoolError),
    Io(std::io::Error),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            GatewayError::Protocol(msg) => write!(f, "protocol error: {}", msg),
            GatewayError::Transport(err) => write!(f, "transport error: {}", err),
            GatewayError::Engine(err) => write!(f, "engine error: {}", err),
            GatewayError::Pool(err) => write!(f, "worker pool error: {}", err),
            GatewayError::Io(err) => write!(f, "i/o error: {}", err),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<config::ConfigError> for GatewayError {
    fn from(err: config::ConfigError) -> Self {
        GatewayError::Configuration(err.to_string())
    }
}

impl From<anyhow::Error> for GatewayError {
    fn from(err: anyhow::Error) -> Self {
        GatewayError::Configuration(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        GatewayError::Transport(err)
    }
}

impl From<EngineError> for GatewayError {
    fn from(err: EngineError) -> Self {
        GatewayError::Engine(err)
    }
}

impl From<PoolError> for GatewayError {
    fn from(err: PoolError) -> Self {
        GatewayError::Pool(err)
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::Io(err)
    }
}

/// Shorthand for results carrying a [`GatewayError`].
pub type GatewayResult<T> = Result<T, GatewayError>;
