//! Behavior every [`ItemStore`] implementation must share.

use std::time::Duration;

use docflow_core::{Content, ItemMeta, Stage};
use serde_json::json;

use crate::error::StoreError;
use crate::store::{InsertOutcome, ItemStore};

async fn insert(store: &dyn ItemStore, path: &str) -> i64 {
    match store.insert_if_absent(path, ItemMeta::default()).await.unwrap() {
        InsertOutcome::Inserted(item) => item.id,
        InsertOutcome::AlreadyExists(id) => id,
    }
}

async fn mark(store: &dyn ItemStore, id: i64, patch: ItemMeta) {
    store.merge_metadata(id, patch).await.unwrap();
}

pub async fn insert_is_idempotent_per_path(store: &dyn ItemStore) {
    let meta = ItemMeta {
        size: Some(10),
        ..Default::default()
    };
    let first = store.insert_if_absent("/a.pdf", meta.clone()).await.unwrap();
    let InsertOutcome::Inserted(item) = first else {
        panic!("first insert should create the item");
    };
    assert_eq!(item.path, "/a.pdf");
    assert_eq!(item.meta.size, Some(10));
    assert!(item.content.is_none());

    for _ in 0..3 {
        let again = store.insert_if_absent("/a.pdf", ItemMeta::default()).await.unwrap();
        assert_eq!(again, InsertOutcome::AlreadyExists(item.id));
    }
    store.insert_if_absent("/b.pdf", ItemMeta::default()).await.unwrap();

    let all = store.list().await.unwrap();
    assert_eq!(all.len(), 2);
    // metadata of the first insert is untouched by the duplicates
    assert_eq!(all[0].meta.size, Some(10));
}

pub async fn eligibility_follows_markers(store: &dyn ItemStore) {
    let fresh = insert(store, "/fresh.pdf").await;
    let rendered = insert(store, "/rendered.pdf").await;
    let extracted = insert(store, "/extracted.pdf").await;
    let analyzed = insert(store, "/analyzed.pdf").await;

    mark(store, rendered, ItemMeta { rendered: Some(true), ..Default::default() }).await;
    mark(
        store,
        extracted,
        ItemMeta { rendered: Some(true), extracted: Some(true), ..Default::default() },
    )
    .await;
    mark(
        store,
        analyzed,
        ItemMeta {
            rendered: Some(true),
            extracted: Some(true),
            analyzed: Some(true),
            ..Default::default()
        },
    )
    .await;

    let ids = |items: Vec<docflow_core::Item>| items.into_iter().map(|i| i.id).collect::<Vec<_>>();
    assert_eq!(ids(store.query_eligible(Stage::Render, 10).await.unwrap()), vec![fresh]);
    assert_eq!(ids(store.query_eligible(Stage::Extract, 10).await.unwrap()), vec![rendered]);
    assert_eq!(ids(store.query_eligible(Stage::Analyze, 10).await.unwrap()), vec![extracted]);
}

pub async fn eligibility_respects_limit_and_order(store: &dyn ItemStore) {
    let mut ids = Vec::new();
    for i in 0..15 {
        ids.push(insert(store, &format!("/doc-{i:02}.pdf")).await);
    }
    let batch = store.query_eligible(Stage::Render, 10).await.unwrap();
    assert_eq!(batch.len(), 10);
    let got: Vec<_> = batch.iter().map(|i| i.id).collect();
    assert_eq!(got, ids[..10].to_vec());
}

pub async fn recently_failed_items_rotate_to_the_back(store: &dyn ItemStore) {
    let mut ids = Vec::new();
    for i in 0..4 {
        ids.push(insert(store, &format!("/queue-{i}.pdf")).await);
    }
    tokio::time::sleep(Duration::from_millis(5)).await;

    // the first two items fail and get an error recorded
    for id in &ids[..2] {
        mark(
            store,
            *id,
            ItemMeta { processing_error: Some("corrupt".into()), ..Default::default() },
        )
        .await;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let batch = store.query_eligible(Stage::Render, 2).await.unwrap();
    let got: Vec<_> = batch.iter().map(|i| i.id).collect();
    assert_eq!(got, ids[2..].to_vec());

    let all = store.query_eligible(Stage::Render, 10).await.unwrap();
    let got: Vec<_> = all.iter().map(|i| i.id).collect();
    assert_eq!(got, vec![ids[2], ids[3], ids[0], ids[1]]);
}

pub async fn merge_preserves_other_keys(store: &dyn ItemStore) {
    let id = insert(store, "/merge.pdf").await;
    let mut first = ItemMeta {
        size: Some(99),
        ..Default::default()
    };
    first.extra.insert("custom".into(), json!({"k": 1}));
    mark(store, id, first).await;
    mark(
        store,
        id,
        ItemMeta {
            rendered: Some(true),
            page_count: Some(4),
            ..Default::default()
        },
    )
    .await;

    let item = store.get(id).await.unwrap().unwrap();
    assert_eq!(item.meta.size, Some(99));
    assert_eq!(item.meta.page_count, Some(4));
    assert!(item.meta.is_rendered());
    assert_eq!(item.meta.extra["custom"], json!({"k": 1}));
    assert!(item.updated_at >= item.created_at);
}

pub async fn reset_clears_content_and_markers(store: &dyn ItemStore) {
    let id = insert(store, "/reset.pdf").await;
    mark(
        store,
        id,
        ItemMeta {
            rendered: Some(true),
            page_count: Some(1),
            extracted: Some(true),
            analyzed: Some(true),
            llm_tags: Some(vec!["Invoice".into()]),
            ..Default::default()
        },
    )
    .await;
    let mut content = Content::new();
    content.insert(1, "hello".into());
    store.set_content(id, content.clone()).await.unwrap();
    assert_eq!(store.get(id).await.unwrap().unwrap().content, Some(content));

    store.reset_for_reprocessing(id).await.unwrap();

    let item = store.get(id).await.unwrap().unwrap();
    assert!(item.content.is_none());
    assert!(!item.meta.is_analyzed());
    assert!(!item.meta.is_extracted());
    assert!(item.meta.is_rendered());
    assert_eq!(item.meta.page_count, Some(1));
    // previous analysis stays visible until it is replaced
    assert_eq!(item.meta.llm_tags, Some(vec!["Invoice".to_string()]));

    let extract = store.query_eligible(Stage::Extract, 10).await.unwrap();
    assert_eq!(extract.len(), 1);
    assert!(store.query_eligible(Stage::Analyze, 10).await.unwrap().is_empty());
}

pub async fn unknown_item_is_not_found(store: &dyn ItemStore) {
    assert!(store.get(404).await.unwrap().is_none());
    assert!(matches!(
        store.merge_metadata(404, ItemMeta::default()).await,
        Err(StoreError::NotFound(404))
    ));
    assert!(matches!(
        store.set_content(404, Content::new()).await,
        Err(StoreError::NotFound(404))
    ));
    assert!(matches!(
        store.reset_for_reprocessing(404).await,
        Err(StoreError::NotFound(404))
    ));
}
