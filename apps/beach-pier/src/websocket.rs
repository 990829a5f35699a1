use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::handlers::AppState;
use crate::launcher::{LaunchError, RendererLease};
use crate::registry::{SessionHandle, SessionId};
use crate::relay::Outcome;
use crate::signaling::{ClientMessage, ServerMessage};

/// WebSocket upgrade handler
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one WebSocket until it closes.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let session = SessionId::new();
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Failed to encode message for {}: {}", session, e),
            }
        }
        debug!("Message sender task ended for session {}", session);
    });

    let handle = SessionHandle::new(session, tx);
    state.relay.add_session(handle.clone());
    debug!("WebSocket connected: session={}", session);

    let mut lease: Option<RendererLease> = None;

    while let Some(msg_result) = receiver.next().await {
        let msg = match msg_result {
            Ok(m) => m,
            Err(e) => {
                warn!("WebSocket error from session {}: {}", session, e);
                break;
            }
        };

        let text = match msg {
            Message::Text(text) => text,
            // Some clients ship JSON in binary frames
            Message::Binary(data) => match String::from_utf8(data) {
                Ok(text) => text,
                Err(_) => {
                    debug!("Ignoring non-UTF8 binary frame from session {}", session);
                    continue;
                }
            },
            Message::Close(_) => {
                debug!("Received Close frame from session {}", session);
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        let message = match serde_json::from_str::<ClientMessage>(&text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Failed to parse message from session {}: {}", session, e);
                handle.send(ServerMessage::Error {
                    message: format!("Invalid message format: {}", e),
                });
                continue;
            }
        };

        let outcome = state.relay.handle(session, message);
        if let Outcome::Connected { opened: true, .. } = outcome {
            launch_renderer_if_idle(&state, session, &mut lease);
        }
    }

    state.relay.remove_session(session);
    if let (Some(launcher), Some(lease)) = (&state.launcher, lease.take()) {
        launcher.release(lease);
    }

    debug!("WebSocket disconnected: session={}", session);
}

/// Start a renderer for a browser that just opened a pair nobody can serve.
fn launch_renderer_if_idle(
    state: &AppState,
    session: SessionId,
    lease: &mut Option<RendererLease>,
) {
    let Some(launcher) = &state.launcher else {
        return;
    };
    if lease.is_some() || state.relay.free_worker_count() > 0 {
        return;
    }

    match launcher.acquire() {
        Ok(acquired) => {
            info!(%session, "renderer launched for browser");
            *lease = Some(acquired);
        }
        Err(LaunchError::Busy) => debug!(%session, "renderer launch already in flight"),
        Err(err) => warn!(%session, error = %err, "renderer launch failed"),
    }
}
