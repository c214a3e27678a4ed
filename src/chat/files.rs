//! Blob store/retrieve surface for message attachments.

use axum::{
    debug_handler,
    extract::{Multipart, Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    appresult::{AppError, AppResult},
    store,
};

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub sender_id: Option<String>,
}

#[debug_handler(state = crate::AppState)]
pub async fn upload(
    Path(conversation_id): Path<String>,
    State(db_pool): State<SqlitePool>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> AppResult<Json<serde_json::Value>> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload").to_owned();
        let mime = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_owned();
        let data = field.bytes().await?;

        let file_id = store::store_file(
            &db_pool,
            Some(&conversation_id),
            query.sender_id.as_deref(),
            &filename,
            &mime,
            &data,
        )
        .await?;

        return Ok(Json(serde_json::json!({
            "ok": true,
            "file_id": file_id,
            "filename": filename,
            "mime": mime,
            "url": format!("/files/{file_id}"),
        })));
    }

    Err(AppError::bad_request("expected a 'file' multipart field"))
}

#[debug_handler(state = crate::AppState)]
pub async fn get_file(
    Path(file_id): Path<String>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Response> {
    let Some(file) = store::load_file(&db_pool, &file_id).await? else {
        return Err(AppError::not_found("file not found"));
    };

    Ok((
        [
            (header::CONTENT_TYPE, file.mime),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.filename),
            ),
        ],
        file.data,
    )
        .into_response())
}
