//! Unit tests for the binding repository over in-memory `SQLite`.

use std::path::Path;
use std::sync::Arc;

use agent_switchboard::store::{db, BindingStore};

async fn store() -> BindingStore {
    let pool = db::connect_memory().await.expect("memory db");
    BindingStore::new(Arc::new(pool))
}

#[tokio::test]
async fn get_on_empty_store_is_none() {
    let store = store().await;
    assert!(store.get(1, 10).await.expect("query ok").is_none());
}

#[tokio::test]
async fn upsert_then_get_round_trips() {
    let store = store().await;
    store
        .upsert(1, 10, "sess-abc", Path::new("/ws/1/10"))
        .await
        .expect("upsert ok");

    let binding = store.get(1, 10).await.expect("query ok").expect("present");
    assert_eq!(binding.session_id, "sess-abc");
    assert_eq!(binding.workspace_path, Path::new("/ws/1/10"));
    assert_eq!(binding.model, "auto");
}

#[tokio::test]
async fn upsert_replaces_the_session() {
    let store = store().await;
    store
        .upsert(1, 10, "sess-old", Path::new("/ws"))
        .await
        .expect("first upsert");
    store
        .upsert(1, 10, "sess-new", Path::new("/ws"))
        .await
        .expect("second upsert");

    let binding = store.get(1, 10).await.expect("query ok").expect("present");
    assert_eq!(binding.session_id, "sess-new");
}

#[tokio::test]
async fn composite_key_separates_users_and_threads() {
    let store = store().await;
    store
        .upsert(1, 10, "a", Path::new("/a"))
        .await
        .expect("upsert");
    store
        .upsert(2, 10, "b", Path::new("/b"))
        .await
        .expect("upsert");

    assert_eq!(
        store.get(1, 10).await.expect("ok").expect("present").session_id,
        "a"
    );
    assert_eq!(
        store.get(2, 10).await.expect("ok").expect("present").session_id,
        "b"
    );
    assert!(store.get(1, 11).await.expect("ok").is_none());
}

#[tokio::test]
async fn delete_removes_the_binding() {
    let store = store().await;
    store
        .upsert(1, 10, "sess", Path::new("/ws"))
        .await
        .expect("upsert");
    store.delete(1, 10).await.expect("delete ok");
    assert!(store.get(1, 10).await.expect("ok").is_none());
}

#[tokio::test]
async fn delete_is_idempotent() {
    let store = store().await;
    store.delete(1, 10).await.expect("deleting nothing is fine");
}

#[tokio::test]
async fn model_defaults_to_auto() {
    let store = store().await;
    assert_eq!(store.get_model(1, 10).await.expect("ok"), "auto");
}

#[tokio::test]
async fn set_model_before_any_session_is_preserved() {
    let store = store().await;
    store.set_model(1, 10, "fast-v2").await.expect("set ok");

    // No session yet, so get() yields nothing…
    assert!(store.get(1, 10).await.expect("ok").is_none());
    // …but the preference is already there.
    assert_eq!(store.get_model(1, 10).await.expect("ok"), "fast-v2");

    // And it survives the first session upsert.
    store
        .upsert(1, 10, "sess", Path::new("/ws"))
        .await
        .expect("upsert");
    let binding = store.get(1, 10).await.expect("ok").expect("present");
    assert_eq!(binding.model, "fast-v2");
}

#[tokio::test]
async fn set_model_overwrites() {
    let store = store().await;
    store
        .upsert(1, 10, "sess", Path::new("/ws"))
        .await
        .expect("upsert");
    store.set_model(1, 10, "big-v3").await.expect("set ok");
    assert_eq!(store.get_model(1, 10).await.expect("ok"), "big-v3");
}
