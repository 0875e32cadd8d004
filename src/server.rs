//! WebSocket listener. Binds the configured interface, accepts TCP
//! connections, performs the WebSocket handshake, and hands each connection
//! to its own dispatcher task. A failed handshake or session only ever
//! affects its own connection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::dispatcher;
use crate::error::GatewayResult;
use crate::state::GatewayContext;

pub struct Server {
    listener: TcpListener,
}

impl Server {
    pub async fn bind(config: &ServerConfig) -> GatewayResult<Self> {
        let address = format!("{}:{}", config.interface, config.port);
        let listener = TcpListener::bind(&address).await?;
        info!(%address, "listening for WebSocket connections");
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> GatewayResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop. Runs until the process shuts down.
    pub async fn serve(self, ctx: Arc<GatewayContext>) -> GatewayResult<()> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(error = %err, "failed to accept connection");
                    continue;
                }
            };

            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                debug!(%peer, "tcp connection accepted");
                let ws = match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws) => ws,
                    Err(err) => {
                        warn!(%peer, error = %err, "websocket handshake failed");
                        return;
                    }
                };
                if let Err(err) = dispatcher::run_session(ws, ctx).await {
                    debug!(%peer, error = %err, "session ended with error");
                }
            });
        }
    }
}
