//! WebSocket endpoint: register with the hub, forward its queue to the
//! socket, and drop the registration when either side closes.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;

use super::app::AppState;

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (client_id, mut rx) = state.hub.connect().await;
    let (mut sink, mut stream) = socket.split();

    // Forwarder: hub queue to socket. Ends when the hub evicts the client
    // or the socket refuses a send.
    let forward = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = sink.send(Message::Text(frame)).await {
                tracing::warn!("ws send failed: {e}");
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Reader: client-initiated frames (pong replies and the like) carry no
    // requests; the REST surface does. We only watch for close/errors.
    while let Some(incoming) = stream.next().await {
        match incoming {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(client_id, "ws read error (client closed?): {e}");
                break;
            }
        }
    }

    state.hub.disconnect(client_id).await;
    forward.abort();
}
