//! Pagination and store-adapter behavior against in-memory SQLite.

use axum::http::StatusCode;
use huddle::chat::history::{self, DEFAULT_LIMIT};
use huddle::store::{self, Attachment, StoredMessage};
use sqlx::SqlitePool;
use uuid::Uuid;

async fn setup() -> SqlitePool {
    // one connection, or each pooled connection sees its own :memory: db
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    store::init_schema(&pool).await.expect("schema");
    pool
}

async fn seed(pool: &SqlitePool, conversation: &str, n: usize) -> Vec<StoredMessage> {
    let mut out = Vec::with_capacity(n);
    for i in 1..=n {
        let msg = store::insert_message(
            pool,
            conversation,
            "alice",
            &format!("m{i}"),
            Vec::new(),
            None,
        )
        .await
        .expect("insert");
        out.push(msg);
    }
    out
}

#[tokio::test]
async fn history_is_chronological_oldest_first() {
    let pool = setup().await;
    seed(&pool, "c1", 5).await;

    let page = history::load(&pool, "c1", None, None).await.unwrap();
    let contents: Vec<_> = page.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["m1", "m2", "m3", "m4", "m5"]);

    for pair in page.windows(2) {
        assert!(pair[0].created_at <= pair[1].created_at);
    }
}

#[tokio::test]
async fn limit_returns_the_most_recent_slice() {
    let pool = setup().await;
    seed(&pool, "c1", 5).await;

    let page = history::load(&pool, "c1", Some(2), None).await.unwrap();
    let contents: Vec<_> = page.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["m4", "m5"]);
}

#[tokio::test]
async fn cursor_pages_are_disjoint_and_contiguous() {
    let pool = setup().await;
    let all = seed(&pool, "c1", 5).await;

    let page1 = history::load(&pool, "c1", Some(2), None).await.unwrap();
    let oldest_of_page1 = page1[0].id.to_string();

    let page2 = history::load(&pool, "c1", Some(2), Some(&oldest_of_page1)).await.unwrap();
    let contents: Vec<_> = page2.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["m2", "m3"]);

    // page2 + page1 is the chronological suffix, no overlap, no gap
    let walked: Vec<Uuid> = page2.iter().chain(page1.iter()).map(|m| m.id).collect();
    let expected: Vec<Uuid> = all[1..].iter().map(|m| m.id).collect();
    assert_eq!(walked, expected);

    // and the walk terminates with a short final page
    let oldest_of_page2 = page2[0].id.to_string();
    let page3 = history::load(&pool, "c1", Some(2), Some(&oldest_of_page2)).await.unwrap();
    assert_eq!(page3.len(), 1);
    assert_eq!(page3[0].content, "m1");
}

#[tokio::test]
async fn malformed_cursor_is_a_bad_request() {
    let pool = setup().await;
    seed(&pool, "c1", 1).await;

    let err = history::load(&pool, "c1", None, Some("not-a-uuid")).await.unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_cursor_is_a_bad_request_not_an_empty_page() {
    let pool = setup().await;
    seed(&pool, "c1", 3).await;

    let ghost = Uuid::now_v7().to_string();
    let err = history::load(&pool, "c1", None, Some(&ghost)).await.unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_REQUEST);

    // a cursor from another conversation does not resolve either
    let other = seed(&pool, "c2", 1).await;
    let err = history::load(&pool, "c1", None, Some(&other[0].id.to_string()))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn limits_are_clamped_not_rejected() {
    let pool = setup().await;
    seed(&pool, "c1", 5).await;

    let page = history::load(&pool, "c1", Some(0), None).await.unwrap();
    assert_eq!(page.len(), 1);

    let page = history::load(&pool, "c1", Some(100_000), None).await.unwrap();
    assert_eq!(page.len(), 5);

    assert!(DEFAULT_LIMIT >= 20 && DEFAULT_LIMIT <= 50);
}

#[tokio::test]
async fn conversations_are_isolated() {
    let pool = setup().await;
    seed(&pool, "c1", 3).await;
    seed(&pool, "c2", 2).await;

    assert_eq!(history::load(&pool, "c1", None, None).await.unwrap().len(), 3);
    assert_eq!(history::load(&pool, "c2", None, None).await.unwrap().len(), 2);
    assert!(history::load(&pool, "empty", None, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn created_at_serializes_as_utc_with_trailing_z() {
    let pool = setup().await;
    let msg = store::insert_message(&pool, "c1", "alice", "hi", Vec::new(), None)
        .await
        .unwrap();

    let value = serde_json::to_value(&msg).unwrap();
    let created_at = value["created_at"].as_str().unwrap();
    assert!(created_at.ends_with('Z'), "got {created_at}");
    assert!(value.get("reply_to").is_none());
}

#[tokio::test]
async fn attachments_and_reply_targets_round_trip_through_the_store() {
    let pool = setup().await;
    let parent = store::insert_message(&pool, "c1", "alice", "parent", Vec::new(), None)
        .await
        .unwrap();

    let attachment = Attachment {
        file_id: Some("f1".to_owned()),
        filename: Some("cat.png".to_owned()),
        mime: Some("image/png".to_owned()),
        url: Some("/files/f1".to_owned()),
    };
    let reply = store::insert_message(
        &pool,
        "c1",
        "bob",
        "reply",
        vec![attachment],
        Some(parent.id),
    )
    .await
    .unwrap();

    let fetched = store::find_message(&pool, "c1", reply.id).await.unwrap().unwrap();
    assert_eq!(fetched.reply_to, Some(parent.id));
    assert_eq!(fetched.attachments.len(), 1);
    assert_eq!(fetched.attachments[0].filename.as_deref(), Some("cat.png"));
    assert_eq!(fetched.sender_id, "bob");
}

#[tokio::test]
async fn files_store_and_load() {
    let pool = setup().await;

    let file_id = store::store_file(&pool, Some("c1"), Some("alice"), "a.txt", "text/plain", b"hello")
        .await
        .unwrap();

    let file = store::load_file(&pool, &file_id).await.unwrap().unwrap();
    assert_eq!(file.filename, "a.txt");
    assert_eq!(file.mime, "text/plain");
    assert_eq!(file.data, b"hello");

    assert!(store::load_file(&pool, "missing").await.unwrap().is_none());
}
