use crate::models::ProtocolEvent;
use crate::services::memory::SummaryMemory;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// WebSocket endpoint. One connection is one implicit session; the client id
/// assigned here is the sole basis of session affinity (no auth, no resume).
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();
    info!("Client {} connected", client_id);

    let (mut sink, mut inbound) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ProtocolEvent>(64);

    // Single writer task owns the send half: wire order equals emission
    // order, and once the peer is gone the queue just drains into the void.
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if sink
                .send(Message::Text(event.to_json().into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    // Exchanges on one connection are strictly sequential: the next frame is
    // not read until the current exchange reaches its terminal event.
    while let Some(Ok(message)) = inbound.next().await {
        match message {
            Message::Text(text) => {
                state
                    .orchestrator
                    .handle_message(client_id, text.as_str(), &tx)
                    .await;
            }
            Message::Close(_) => break,
            other => debug!("Ignoring non-text frame from {}: {:?}", client_id, other),
        }
    }

    // Disconnect: drop the session handle, let the writer wind down. No
    // flush, no resumption.
    state.memory.release(client_id);
    drop(tx);
    let _ = writer.await;
    info!("Client {} disconnected", client_id);
}
