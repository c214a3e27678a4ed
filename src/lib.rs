pub mod appresult;
pub mod chat;
pub mod config;
pub mod registry;
pub mod signal;
pub mod store;

pub use appresult::{AppError, AppResult};

use axum::extract::FromRef;
use sqlx::SqlitePool;

use crate::{config::ServerConfig, registry::RoomRegistry};

/// Registry for the persisted chat channels.
#[derive(Clone, Default)]
pub struct ChatRooms(pub RoomRegistry);

/// Registry for the call-signaling channels. Same machinery, separate
/// namespace: a chat connection and a call connection to "r1" are members of
/// different rooms.
#[derive(Clone, Default)]
pub struct CallRooms(pub RoomRegistry);

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub chat_rooms: ChatRooms,
    pub call_rooms: CallRooms,
    pub config: ServerConfig,
}
