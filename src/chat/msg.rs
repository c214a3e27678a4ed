//! Chat wire models and the HTTP post path.

use axum::{debug_handler, extract::{Path, State}, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    appresult::AppResult,
    store::{self, Attachment, StoredMessage},
    ChatRooms,
};

/// Inbound frame on the persistent chat channel. Anything that fails to
/// parse as this is dropped; anything with an unknown `type` is ignored.
#[derive(Debug, Deserialize)]
pub struct ChatFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub sender_id: Option<String>,
    pub content: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub reply_to: Option<Uuid>,
}

#[derive(Serialize)]
struct MessageEvent<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    message: &'a StoredMessage,
}

/// The `{type:"message", message:{...}}` payload fanned out to the room.
pub fn message_event(msg: &StoredMessage) -> serde_json::Result<String> {
    serde_json::to_string(&MessageEvent { kind: "message", message: msg })
}

#[derive(Debug, Deserialize)]
pub struct PostMessageBody {
    pub sender_id: String,
    pub content: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub reply_to: Option<Uuid>,
}

/// HTTP post: persist first, then fan out to live connections. A store
/// failure fails the request before anyone hears about the message.
#[debug_handler(state = crate::AppState)]
pub async fn post_message(
    Path(conversation_id): Path<String>,
    State(db_pool): State<SqlitePool>,
    State(ChatRooms(rooms)): State<ChatRooms>,
    Json(body): Json<PostMessageBody>,
) -> AppResult<Json<serde_json::Value>> {
    let msg = store::insert_message(
        &db_pool,
        &conversation_id,
        &body.sender_id,
        body.content.as_deref().unwrap_or(""),
        body.attachments,
        body.reply_to,
    )
    .await?;

    rooms.broadcast(&conversation_id, &message_event(&msg)?, None);

    Ok(Json(serde_json::json!({ "ok": true, "message": msg })))
}
