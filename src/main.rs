use axum::{extract::State, routing::get, Json, Router};
use huddle::{
    chat, config::ServerConfig, registry::RoomRegistry, signal, store, AppState, CallRooms,
    ChatRooms,
};
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;

    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(&config.database_url)
        .await?;
    store::init_schema(&db_pool).await?;

    let state = AppState {
        db_pool,
        chat_rooms: ChatRooms(RoomRegistry::new()),
        call_rooms: CallRooms(RoomRegistry::new()),
        config: config.clone(),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/info", get(info))
        .route("/files/{file_id}", get(chat::files::get_file))
        .nest("/chats", chat::router())
        .nest("/call", signal::router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!(addr = %config.bind_addr, "huddle listening");
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> &'static str {
    "OK"
}

async fn info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "huddle",
        "chat_rooms": state.chat_rooms.0.room_count(),
        "call_rooms": state.call_rooms.0.room_count(),
    }))
}
