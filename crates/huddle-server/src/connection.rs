//! One client connection: authenticated upgrade, read pump, write pump.
//!
//! The pumps share nothing but the outbound queue and the close token.
//! The read pump owns deregistration: whatever ends the connection, the
//! hub sees exactly one unregister.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use huddle_core::{ClientCommand, ConnectionId, Frame, ServerFrame};
use huddle_hub::{ClientInfo, HubHandle};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_hdr_async_with_config};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::auth::{AuthError, AuthedUser, TokenVerifier};
use crate::config::ServerConfig;
use crate::dispatcher::{ClientCtx, Dispatcher};

/// Upgrade path clients connect to.
const UPGRADE_PATH: &str = "/ws";

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

/// Everything a connection task needs.
#[derive(Clone)]
pub(crate) struct ConnectionDeps {
    pub(crate) hub: HubHandle,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) verifier: Arc<dyn TokenVerifier>,
    pub(crate) config: Arc<ServerConfig>,
}

/// Serve one accepted TCP connection to completion.
pub(crate) async fn serve(stream: TcpStream, peer: SocketAddr, deps: ConnectionDeps) {
    let mut authed: Option<AuthedUser> = None;
    let verifier = deps.verifier.clone();
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if request.uri().path() != UPGRADE_PATH {
            return Err(reject(StatusCode::NOT_FOUND, "unknown path"));
        }
        let token = request.uri().query().and_then(token_from_query);
        let Some(token) = token else {
            return Err(reject(StatusCode::UNAUTHORIZED, "missing access token"));
        };
        match verifier.verify(token) {
            Ok(user) => {
                authed = Some(user);
                Ok(response)
            },
            Err(AuthError::Missing) => Err(reject(StatusCode::UNAUTHORIZED, "missing access token")),
            Err(AuthError::Invalid) => Err(reject(StatusCode::FORBIDDEN, "invalid access token")),
        }
    };

    let ws_config = WebSocketConfig {
        max_message_size: Some(deps.config.max_frame_bytes),
        max_frame_size: Some(deps.config.max_frame_bytes),
        ..WebSocketConfig::default()
    };
    let ws = match accept_hdr_async_with_config(stream, callback, Some(ws_config)).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(%peer, error = %e, "Upgrade failed");
            return;
        },
    };
    let Some(user) = authed else {
        // The callback always sets this on success.
        warn!(%peer, "Upgrade accepted without identity");
        return;
    };

    let conn_id = ConnectionId::new();
    let closed = CancellationToken::new();
    let (frame_tx, frame_rx) = mpsc::channel(deps.config.outbound_queue_capacity);
    let client = ClientInfo {
        conn_id,
        user_id: user.user_id,
        user_name: user.user_name.clone(),
        sender: frame_tx,
        closed: closed.clone(),
    };
    if deps.hub.register(client).await.is_err() {
        return;
    }
    info!(%peer, conn_id = %conn_id, user_id = %user.user_id, "Connection established");

    let (ws_tx, ws_rx) = ws.split();
    let write_task = tokio::spawn(write_pump(
        ws_tx,
        frame_rx,
        closed.clone(),
        deps.config.write_timeout(),
    ));

    let mut ctx = ClientCtx {
        conn_id,
        user_id: user.user_id,
        user_name: user.user_name,
        room: None,
    };
    read_pump(ws_rx, &mut ctx, &deps, &closed).await;

    closed.cancel();
    let _ = deps.hub.unregister(conn_id).await;
    let _ = write_task.await;
    info!(conn_id = %conn_id, "Connection closed");
}

/// Drain inbound frames until the transport ends, the idle deadline
/// passes, or the connection is closed from elsewhere.
async fn read_pump(
    mut ws_rx: WsSource,
    ctx: &mut ClientCtx,
    deps: &ConnectionDeps,
    closed: &CancellationToken,
) {
    let deadline = deps.config.read_deadline();
    loop {
        let message = tokio::select! {
            biased;
            () = closed.cancelled() => return,
            message = tokio::time::timeout(deadline, ws_rx.next()) => message,
        };
        match message {
            Err(_) => {
                info!(conn_id = %ctx.conn_id, "Idle past read deadline, closing");
                return;
            },
            Ok(None) => return,
            Ok(Some(Err(e))) => {
                debug!(conn_id = %ctx.conn_id, error = %e, "Transport error on read");
                return;
            },
            Ok(Some(Ok(Message::Text(text)))) => {
                handle_text(ctx, deps, &text).await;
            },
            Ok(Some(Ok(Message::Close(_)))) => return,
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_)))) => {
                // Ping/pong answered by tungstenite; binary is not part of
                // the protocol.
            },
        }
    }
}

async fn handle_text(ctx: &mut ClientCtx, deps: &ConnectionDeps, text: &str) {
    // Malformed JSON: log and drop the frame, keep the connection.
    let frame = match Frame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(conn_id = %ctx.conn_id, error = %e, "Unparseable frame dropped");
            return;
        },
    };
    match ClientCommand::from_frame(&frame) {
        Ok(Some(cmd)) => {
            trace!(conn_id = %ctx.conn_id, kind = %frame.kind, "Command received");
            deps.dispatcher.dispatch(ctx, cmd).await;
        },
        Ok(None) => {
            // Unknown types are ignored, never fatal.
            warn!(conn_id = %ctx.conn_id, kind = %frame.kind, "Unknown message type ignored");
        },
        Err(e) => {
            debug!(conn_id = %ctx.conn_id, kind = %frame.kind, error = %e, "Malformed payload");
            let error = ServerFrame::error(
                huddle_core::ErrorCode::InvalidPayload,
                "malformed payload",
            );
            let _ = deps.hub.send_to(ctx.conn_id, error).await;
        },
    }
}

/// Drain the outbound queue onto the socket; on close, flush what is
/// pending within one write-timeout budget, then send a close frame.
async fn write_pump(
    mut ws_tx: WsSink,
    mut frame_rx: mpsc::Receiver<ServerFrame>,
    closed: CancellationToken,
    write_timeout: Duration,
) {
    loop {
        let frame = tokio::select! {
            biased;
            () = closed.cancelled() => break,
            frame = frame_rx.recv() => frame,
        };
        let Some(frame) = frame else { break };
        if !send_frame(&mut ws_tx, &frame, write_timeout).await {
            closed.cancel();
            return;
        }
    }

    // Graceful close: bounded flush of anything still queued.
    let flush_deadline = tokio::time::Instant::now() + write_timeout;
    while let Ok(frame) = frame_rx.try_recv() {
        if tokio::time::Instant::now() >= flush_deadline {
            break;
        }
        if !send_frame(&mut ws_tx, &frame, write_timeout).await {
            return;
        }
    }
    let _ = ws_tx.close().await;
}

async fn send_frame(ws_tx: &mut WsSink, frame: &ServerFrame, write_timeout: Duration) -> bool {
    let text = match serde_json::to_string(frame) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, kind = frame.kind(), "Unserializable outbound frame skipped");
            return true;
        },
    };
    match tokio::time::timeout(write_timeout, ws_tx.send(Message::Text(text))).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(error = %e, "Transport error on write");
            false
        },
        Err(_) => {
            debug!("Write timed out");
            false
        },
    }
}

fn token_from_query(query: &str) -> Option<&str> {
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .filter(|token| !token.is_empty())
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_extraction_from_query() {
        assert_eq!(token_from_query("token=abc"), Some("abc"));
        assert_eq!(token_from_query("a=1&token=abc&b=2"), Some("abc"));
        assert_eq!(token_from_query("token="), None);
        assert_eq!(token_from_query("other=1"), None);
    }
}
