//! Call-signaling relay: ephemeral identities, roster handshake, and
//! targeted or broadcast forwarding of opaque control frames. Nothing on
//! this channel is persisted.

use axum::{
    debug_handler,
    extract::{ws::{Message, WebSocket}, Path, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::{
    config::ServerConfig,
    registry::{Peer, RoomRegistry},
    CallRooms,
};

#[debug_handler(state = crate::AppState)]
pub async fn signal_ws(
    Path((room_id, user_id)): Path<(String, String)>,
    State(CallRooms(rooms)): State<CallRooms>,
    State(config): State<ServerConfig>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run(socket, rooms, config, room_id, user_id))
}

async fn run(
    socket: WebSocket,
    rooms: RoomRegistry,
    config: ServerConfig,
    room_id: String,
    user_id: String,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(config.outbound_queue);

    let peer = Peer::new(&user_id, tx);
    let client_id = peer.client_id.clone();

    // join() returns the roster as of the insert, under the registry lock:
    // exactly the members that get the join event, and exactly the roster
    // the newcomer is handed. Self is in neither.
    let prior = rooms.join(&room_id, peer);
    announce_join(&rooms, &room_id, &client_id, &user_id, &prior);
    tracing::info!(room = %room_id, user = %user_id, client = %client_id, "signaling connection open");

    let forward_task = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if ws_sender.send(payload.into()).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = ws_receiver.next().await {
        match frame {
            Message::Text(text) => relay_frame(&rooms, &room_id, &client_id, &user_id, text.as_bytes()),
            Message::Binary(data) => relay_frame(&rooms, &room_id, &client_id, &user_id, &data),
            Message::Close(_) => break,
            _ => {}
        }
    }

    rooms.leave(&room_id, &client_id);
    let leave = json!({ "type": "leave", "from": client_id, "user_id": user_id }).to_string();
    rooms.broadcast(&room_id, &leave, None);
    forward_task.abort();
    tracing::info!(room = %room_id, user = %user_id, client = %client_id, "signaling connection closed");
}

/// Connect handshake: the newcomer learns its ephemeral id, the prior
/// members learn about the newcomer, the newcomer gets the prior roster.
fn announce_join(
    rooms: &RoomRegistry,
    room_id: &str,
    client_id: &str,
    user_id: &str,
    prior: &[Peer],
) {
    let hello = json!({ "type": "client_id", "client_id": client_id, "user_id": user_id });
    rooms.send_to(room_id, client_id, &hello.to_string());

    let join = json!({ "type": "join", "from": client_id, "user_id": user_id }).to_string();
    for peer in prior {
        rooms.send_to(room_id, &peer.client_id, &join);
    }

    let peers: Vec<Value> = prior
        .iter()
        .map(|p| json!({ "client_id": p.client_id, "user_id": p.user_id }))
        .collect();
    let roster = json!({ "type": "peers_list", "peers": peers });
    rooms.send_to(room_id, client_id, &roster.to_string());
}

/// One inbound control frame. `chat` frames and untargeted frames go to
/// everyone but the sender; a frame with a `to` goes only to that ephemeral
/// id and is dropped (never broadcast) when the target is unknown. The
/// server stamps `user_id` if the sender left it out.
pub(crate) fn relay_frame(
    rooms: &RoomRegistry,
    room_id: &str,
    client_id: &str,
    user_id: &str,
    data: &[u8],
) {
    let Ok(mut frame) = serde_json::from_slice::<Value>(data) else {
        tracing::debug!(room = room_id, "dropping unparseable signaling frame");
        return;
    };
    let Some(obj) = frame.as_object_mut() else {
        tracing::debug!(room = room_id, "dropping non-object signaling frame");
        return;
    };

    obj.entry("user_id")
        .or_insert_with(|| Value::String(user_id.to_owned()));

    let kind = obj.get("type").and_then(Value::as_str).unwrap_or_default().to_owned();
    let target = obj.get("to").and_then(Value::as_str).map(str::to_owned);
    let payload = frame.to_string();

    if kind == "chat" {
        rooms.broadcast(room_id, &payload, Some(client_id));
    } else if let Some(target) = target {
        if !rooms.send_to(room_id, &target, &payload) {
            tracing::debug!(room = room_id, %target, "dropping frame for unknown target");
        }
    } else {
        rooms.broadcast(room_id, &payload, Some(client_id));
    }
}
