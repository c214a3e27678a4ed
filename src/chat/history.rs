//! Cursor pagination over a conversation's message log.

use axum::{debug_handler, extract::{Path, Query, State}, Json};
use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    appresult::{AppError, AppResult},
    store::{self, StoredMessage},
};

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 200;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
    pub before: Option<String>,
}

#[debug_handler(state = crate::AppState)]
pub async fn get_messages(
    Path(conversation_id): Path<String>,
    State(db_pool): State<SqlitePool>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<StoredMessage>>> {
    let page = load(&db_pool, &conversation_id, query.limit, query.before.as_deref()).await?;
    Ok(Json(page))
}

/// Resolves the cursor (or its absence) into a store query and returns the
/// page oldest-first. Pagination walks backward in time; results come back
/// forward in time.
///
/// A `before` value that is not a message id of this conversation is a
/// client error, never a silently shifted page. Out-of-range limits are
/// clamped to `1..=MAX_LIMIT`.
pub async fn load(
    pool: &SqlitePool,
    conversation_id: &str,
    limit: Option<usize>,
    before: Option<&str>,
) -> AppResult<Vec<StoredMessage>> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let anchor = match before {
        Some(cursor) => {
            let id = Uuid::parse_str(cursor)
                .map_err(|_| AppError::bad_request(format!("invalid before cursor: {cursor}")))?;
            let Some(anchor) = store::find_message(pool, conversation_id, id).await? else {
                return Err(AppError::bad_request(format!("unknown before cursor: {cursor}")));
            };
            Some(anchor)
        }
        None => None,
    };

    let mut page = store::page_before(pool, conversation_id, limit, anchor.as_ref()).await?;
    page.reverse();
    Ok(page)
}
