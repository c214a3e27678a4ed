pub mod files;
pub mod history;
pub mod msg;
mod ws;

use axum::{routing::{get, post}, Router};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/{conversation_id}/messages",
            get(history::get_messages).post(msg::post_message),
        )
        .route("/{conversation_id}/ws/{client_id}", get(ws::chat_ws))
        .route("/{conversation_id}/upload", post(files::upload))
}
