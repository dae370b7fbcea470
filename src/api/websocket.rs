//! WebSocket handler for real-time sensor streaming
//!
//! Each connection gets its own bounded outbound queue. The registry
//! holds the only sender once the connection is set up, so unregistering
//! a client closes the queue, which ends the writer task and tears the
//! socket down. That is the eviction path the heartbeat supervisor and
//! the broadcast engine rely on.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, stream::StreamExt};
use tracing::{debug, error, info};

use crate::actors::messages::ServerMessage;
use crate::api::state::ApiState;
use crate::registry::OUTBOUND_BUFFER;
use crate::router::{self, RouterContext};

/// WebSocket upgrade handler
///
/// GET /api/v1/stream
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

/// Handle one WebSocket connection from registration to teardown
async fn handle_websocket(socket: WebSocket, state: ApiState) {
    let (mut sink, mut stream) = socket.split();

    let (out_tx, mut out_rx) = tokio::sync::mpsc::channel::<ServerMessage>(OUTBOUND_BUFFER);
    let client_id = state.registry.register(out_tx.clone()).await;
    info!(%client_id, "websocket client connected");

    if out_tx
        .send(ServerMessage::ConnectionEstablished { client_id })
        .await
        .is_err()
    {
        error!(%client_id, "outbound queue closed before greeting");
        state.registry.unregister(client_id).await;
        return;
    }
    // from here the registry owns the only sender half
    drop(out_tx);

    // Writer: drain the outbound queue onto the socket. A probe becomes
    // a protocol-level ping, everything else is JSON text.
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let frame = match message {
                ServerMessage::Probe => Message::Ping(Vec::new()),
                other => match serde_json::to_string(&other) {
                    Ok(text) => Message::Text(text),
                    Err(e) => {
                        error!("failed to encode outbound message: {e}");
                        continue;
                    }
                },
            };

            if sink.send(frame).await.is_err() {
                debug!("websocket send failed, client disconnected");
                break;
            }
        }
    });

    let ctx = RouterContext {
        registry: state.registry.clone(),
        broadcast: state.broadcast.clone(),
        analytics: state.analytics.clone(),
    };
    let reader_registry = state.registry.clone();

    // Reader: route text frames, treat pongs as heartbeats.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = stream.next().await {
            match msg {
                Message::Text(text) => {
                    if let Some(reply) = router::handle_message(&ctx, client_id, &text).await
                        && !reader_registry.send_to(client_id, reply).await
                    {
                        break;
                    }
                }
                Message::Pong(_) => {
                    reader_registry.touch(client_id).await;
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Either side finishing tears down the other.
    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    state.registry.unregister(client_id).await;
    if !state.registry.has_any_subscriber().await
        && let Err(e) = state.broadcast.stop().await
    {
        error!("failed to stop broadcaster: {e}");
    }

    info!(%client_id, "websocket client disconnected");
}
