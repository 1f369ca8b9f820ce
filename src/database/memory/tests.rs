use super::*;
use crate::test_support::record;

#[tokio::test]
async fn query_before_first_upsert_is_unavailable() {
    let store = MemoryVectorStore::new(2);
    assert!(matches!(
        store.query(&[0.0, 0.0], 3).await,
        Err(RagError::StoreUnavailable(_))
    ));
    assert_eq!(store.count().await.expect("count"), 0);
}

#[tokio::test]
async fn results_are_ordered_by_distance() {
    let store = MemoryVectorStore::new(2);
    // squared distances from the origin: 0.81, 0.01, 0.25
    store
        .upsert(vec![
            record("far.rs", 0, vec![0.9, 0.0]),
            record("near.rs", 0, vec![0.1, 0.0]),
            record("mid.rs", 0, vec![0.0, 0.5]),
        ])
        .await
        .expect("upsert");

    let hits = store.query(&[0.0, 0.0], 5).await.expect("query");

    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["near.rs_0", "mid.rs_0", "far.rs_0"]);
    assert!((hits[0].distance - 0.01).abs() < 1e-6);
    assert!((hits[2].distance - 0.81).abs() < 1e-6);
}

#[tokio::test]
async fn query_returns_at_most_k() {
    let store = MemoryVectorStore::new(2);
    store
        .upsert((0..10).map(|i| record("a.rs", i, vec![i as f32, 0.0])).collect())
        .await
        .expect("upsert");

    assert_eq!(store.query(&[0.0, 0.0], 3).await.expect("query").len(), 3);
    assert!(store.query(&[0.0, 0.0], 0).await.expect("query").is_empty());
}

#[tokio::test]
async fn upsert_overwrites_existing_ids() {
    let store = MemoryVectorStore::new(2);
    store
        .upsert(vec![record("a.rs", 0, vec![1.0, 1.0])])
        .await
        .expect("upsert");

    let mut replacement = record("a.rs", 0, vec![0.0, 0.0]);
    replacement.document = "rewritten".to_string();
    store.upsert(vec![replacement]).await.expect("upsert");

    assert_eq!(store.count().await.expect("count"), 1);
    let hits = store.query(&[0.0, 0.0], 1).await.expect("query");
    assert_eq!(hits[0].document, "rewritten");
    assert_eq!(hits[0].distance, 0.0);
}

#[tokio::test]
async fn dimension_mismatch_is_rejected() {
    let store = MemoryVectorStore::new(3);
    assert!(matches!(
        store.upsert(vec![record("a.rs", 0, vec![1.0, 1.0])]).await,
        Err(RagError::Database(_))
    ));

    store
        .upsert(vec![record("a.rs", 0, vec![1.0, 1.0, 1.0])])
        .await
        .expect("upsert");
    assert!(matches!(
        store.query(&[1.0], 1).await,
        Err(RagError::Database(_))
    ));
}

#[tokio::test]
async fn delete_list_and_clear() {
    let store = MemoryVectorStore::new(2);
    store
        .upsert((0..3).map(|i| record("lib.rs", i, vec![0.0, i as f32])).collect())
        .await
        .expect("upsert");

    store
        .delete_ids(&["lib.rs_1".to_string(), "missing_9".to_string()])
        .await
        .expect("delete");
    assert_eq!(
        store.list_ids().await.expect("list"),
        vec!["lib.rs_0", "lib.rs_2"]
    );

    store.clear().await.expect("clear");
    assert_eq!(store.count().await.expect("count"), 0);
    assert!(store.list_ids().await.expect("list").is_empty());
    assert!(matches!(
        store.query(&[0.0, 0.0], 1).await,
        Err(RagError::StoreUnavailable(_))
    ));
}
