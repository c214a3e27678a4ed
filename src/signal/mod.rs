mod ws;

use axum::{routing::get, Router};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws/{room_id}/{user_id}", get(ws::signal_ws))
}
