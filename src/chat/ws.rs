//! Persistent chat channel: one task per connection plus a forwarder
//! draining the outbound queue into the socket.

use axum::{
    debug_handler,
    extract::{ws::{Message, WebSocket}, Path, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use sqlx::SqlitePool;
use tokio::sync::mpsc;

use crate::{
    chat::msg::{self, ChatFrame},
    config::ServerConfig,
    registry::{Peer, RoomRegistry},
    store, ChatRooms,
};

#[debug_handler(state = crate::AppState)]
pub async fn chat_ws(
    Path((conversation_id, client_id)): Path<(String, String)>,
    State(db_pool): State<SqlitePool>,
    State(ChatRooms(rooms)): State<ChatRooms>,
    State(config): State<ServerConfig>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run(socket, db_pool, rooms, config, conversation_id, client_id))
}

async fn run(
    socket: WebSocket,
    db_pool: SqlitePool,
    rooms: RoomRegistry,
    config: ServerConfig,
    conversation_id: String,
    client_id: String,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(config.outbound_queue);

    let peer = Peer::new(&client_id, tx);
    let conn_id = peer.client_id.clone();
    rooms.join(&conversation_id, peer);
    tracing::info!(room = %conversation_id, user = %client_id, "chat connection open");

    let forward_task = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if ws_sender.send(payload.into()).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = ws_receiver.next().await {
        match frame {
            Message::Text(text) => {
                handle_frame(&db_pool, &rooms, &conversation_id, &client_id, text.as_bytes()).await;
            }
            Message::Binary(data) => {
                handle_frame(&db_pool, &rooms, &conversation_id, &client_id, &data).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    rooms.leave(&conversation_id, &conn_id);
    let departure = serde_json::json!({
        "type": "system",
        "action": "leave",
        "user_id": client_id,
    })
    .to_string();
    rooms.broadcast(&conversation_id, &departure, None);
    forward_task.abort();
    tracing::info!(room = %conversation_id, user = %client_id, "chat connection closed");
}

/// One inbound frame. Malformed input and store failures both end here:
/// the frame is dropped, the loop lives on, and nothing is broadcast that
/// was not persisted first.
pub(crate) async fn handle_frame(
    pool: &SqlitePool,
    rooms: &RoomRegistry,
    conversation_id: &str,
    client_id: &str,
    data: &[u8],
) {
    let Ok(frame) = serde_json::from_slice::<ChatFrame>(data) else {
        tracing::debug!(room = conversation_id, "dropping malformed chat frame");
        return;
    };

    if frame.kind != "message" {
        return;
    }

    let sender_id = frame.sender_id.as_deref().unwrap_or(client_id);
    let stored = match store::insert_message(
        pool,
        conversation_id,
        sender_id,
        frame.content.as_deref().unwrap_or(""),
        frame.attachments,
        frame.reply_to,
    )
    .await
    {
        Ok(stored) => stored,
        Err(err) => {
            tracing::warn!(room = conversation_id, error = %err, "store unavailable, frame not broadcast");
            return;
        }
    };

    match msg::message_event(&stored) {
        Ok(payload) => {
            rooms.broadcast(conversation_id, &payload, None);
        }
        Err(err) => tracing::error!(error = %err, "failed to encode message event"),
    }
}
