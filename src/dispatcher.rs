//! # Message Dispatcher
//!
//! Per-connection read loop. Classifies each inbound frame against
//! {end, config, session, audio, unrecognized} and applies the matching
//! session transition. The loop is strictly sequential: it suspends while
//! the coordinator awaits a worker result, so a session can never have two
//! recognitions in flight, and messages for other connections proceed
//! independently on their own tasks.
//!
//! ## Frame handling:
//! - result frames are the engine's raw JSON, passed through verbatim
//! - the final result is sent to the client before the forwarder runs
//! - fatal engine failures produce an `{"error": ...}` frame, then close
//! - malformed control messages are logged and skipped

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audio;
use crate::error::{GatewayError, GatewayResult};
use crate::forwarder;
use crate::protocol::{self, ControlMessage};
use crate::session::Session;
use crate::state::GatewayContext;

/// Drive one WebSocket connection from accept to close.
pub async fn run_session<S>(
    mut ws: WebSocketStream<S>,
    ctx: Arc<GatewayContext>,
) -> GatewayResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let conn_id = Uuid::new_v4();
    let mut session = Session::new(conn_id, &ctx.recognition);
    info!(conn = %conn_id, "connection established");

    while let Some(frame) = ws.next().await {
        let message = match frame {
            Ok(message) => message,
            Err(err) => {
                warn!(conn = %conn_id, error = %err, "transport error, closing session");
                session.close();
                return Err(err.into());
            }
        };

        match message {
            Message::Text(text) => match protocol::classify(&text) {
                ControlMessage::EndOfStream => {
                    return finish_session(&mut ws, &ctx, &mut session).await;
                }
                ControlMessage::Config(update) => session.apply_config(update),
                ControlMessage::Session(update) => session.apply_session(update),
                ControlMessage::Unrecognized => {
                    debug!(conn = %conn_id, bytes = text.len(), "unrecognized text message ignored");
                }
            },
            Message::Binary(chunk) => {
                session.append_audio(&chunk);
                if ctx.recognition.streaming_partials {
                    match ctx.coordinator.recognize_chunk(&mut session, chunk).await {
                        Ok(outcome) => {
                            let is_final = outcome.is_final;
                            let text = forwarder::best_text(&outcome.raw);
                            ws.send(Message::Text(outcome.raw)).await?;
                            if is_final {
                                ctx.notifier
                                    .final_transcript(&session.session_id, &session.user_id, &text)
                                    .await;
                                session.close();
                                close_socket(&mut ws, conn_id).await;
                                return Ok(());
                            }
                            session.resume_collecting();
                        }
                        Err(err) => return fail_session(&mut ws, &mut session, err).await,
                    }
                }
            }
            // the protocol layer answers pings on its own
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(frame) => {
                debug!(conn = %conn_id, ?frame, "client closed the connection");
                session.close();
                close_socket(&mut ws, conn_id).await;
                return Ok(());
            }
            _ => {}
        }
    }

    // stream ended without an end marker: client went away, nothing to
    // recognize or forward
    debug!(
        conn = %conn_id,
        phase = session.phase().as_str(),
        "client disconnected before end of stream"
    );
    session.close();
    Ok(())
}

/// End-of-stream: final recognition over the accumulated buffer, result to
/// the client, forwarder notification, server-side close.
async fn finish_session<S>(
    ws: &mut WebSocketStream<S>,
    ctx: &Arc<GatewayContext>,
    session: &mut Session,
) -> GatewayResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    session.begin_drain();
    debug!(
        conn = %session.conn_id(),
        audio_bytes = session.audio().len(),
        audio_secs = audio::duration_seconds(session.audio().len(), session.sample_rate),
        "end of stream, running final recognition"
    );

    match ctx.coordinator.recognize_final(session).await {
        Ok(outcome) => {
            let text = forwarder::best_text(&outcome.raw);
            ws.send(Message::Text(outcome.raw)).await?;
            ctx.notifier
                .final_transcript(&session.session_id, &session.user_id, &text)
                .await;
            info!(
                conn = %session.conn_id(),
                session_id = %session.session_id,
                chars = text.len(),
                "final result delivered"
            );
            session.close();
            close_socket(ws, session.conn_id()).await;
            Ok(())
        }
        Err(err) => fail_session(ws, session, err).await,
    }
}

/// Fatal session failure: best-effort error frame, then close. The process
/// and the shared pool/registry are unaffected.
async fn fail_session<S>(
    ws: &mut WebSocketStream<S>,
    session: &mut Session,
    err: GatewayError,
) -> GatewayResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    error!(conn = %session.conn_id(), error = %err, "session failed");
    let frame = protocol::error_frame(&err.to_string());
    if let Err(send_err) = ws.send(Message::Text(frame)).await {
        debug!(conn = %session.conn_id(), error = %send_err, "error frame not delivered");
    }
    session.close();
    close_socket(ws, session.conn_id()).await;
    Err(err)
}

async fn close_socket<S>(ws: &mut WebSocketStream<S>, conn_id: Uuid)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(err) = ws.close(None).await {
        debug!(conn = %conn_id, error = %err, "close handshake failed");
    }
}
