#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

/// Integration tests for the LanceDB vector store on a scratch directory
use code_doc_helper::RagError;
use code_doc_helper::config::Config;
use code_doc_helper::database::{ChunkMetadata, IndexedRecord, VectorIndex, VectorStore};
use tempfile::TempDir;

const DIM: usize = 8;

fn create_test_config() -> (Config, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    config.ollama.embedding_dimension = DIM as u32;
    (config, temp_dir)
}

/// A record whose vector lies on the first axis at `offset` from the origin
fn create_record(filename: &str, index: usize, offset: f32) -> IndexedRecord {
    let mut embedding = vec![0.0_f32; DIM];
    embedding[0] = offset;

    IndexedRecord {
        id: IndexedRecord::record_id(filename, index),
        embedding,
        document: format!("// {filename} chunk {index}\nfn item_{index}() {{}}"),
        metadata: ChunkMetadata {
            filename: filename.to_string(),
            filepath: format!("/project/src/{filename}"),
            chunk_index: index as u64,
            language: "rs".to_string(),
            start_line: index as u64 * 500,
            end_line: index as u64 * 500 + 499,
        },
    }
}

#[tokio::test]
async fn query_before_first_upsert_is_unavailable() {
    let (config, _temp_dir) = create_test_config();
    let store = VectorStore::new(&config).await.expect("should open store");

    assert_eq!(store.count().await.expect("should count"), 0);
    let result = store.query(&[0.0; DIM], 3).await;
    assert!(matches!(result, Err(RagError::StoreUnavailable(_))));
    assert!(!store.validate_integrity().await.expect("should check"));
}

#[tokio::test]
async fn upsert_query_and_reopen() {
    let (config, _temp_dir) = create_test_config();
    let store = VectorStore::new(&config).await.expect("should open store");

    store
        .upsert(vec![
            create_record("far.rs", 0, 0.9_f32.sqrt()),
            create_record("near.rs", 0, 0.1_f32.sqrt()),
            create_record("mid.rs", 0, 0.5_f32.sqrt()),
        ])
        .await
        .expect("should upsert");

    let hits = store.query(&[0.0; DIM], 3).await.expect("should query");
    let names: Vec<&str> = hits.iter().map(|h| h.metadata.filename.as_str()).collect();
    assert_eq!(names, vec!["near.rs", "mid.rs", "far.rs"]);
    assert!((hits[0].distance - 0.1).abs() < 1e-4);
    assert_eq!(hits[0].metadata.filepath, "/project/src/near.rs");
    assert_eq!(hits[0].metadata.end_line, 499);
    assert!(hits[0].document.contains("near.rs chunk 0"));

    drop(store);
    let reopened = VectorStore::new(&config).await.expect("should reopen store");
    assert_eq!(reopened.count().await.expect("should count"), 3);
    assert!(reopened.validate_integrity().await.expect("should check"));
}

#[tokio::test]
async fn upsert_overwrites_existing_ids() {
    let (config, _temp_dir) = create_test_config();
    let store = VectorStore::new(&config).await.expect("should open store");

    store
        .upsert(vec![create_record("lib.rs", 0, 1.0), create_record("lib.rs", 1, 2.0)])
        .await
        .expect("should upsert");

    let mut replacement = create_record("lib.rs", 0, 0.0);
    replacement.document = "fn replaced() {}".to_string();
    store
        .upsert(vec![replacement])
        .await
        .expect("should upsert again");

    assert_eq!(store.count().await.expect("should count"), 2);
    let hits = store.query(&[0.0; DIM], 1).await.expect("should query");
    assert_eq!(hits[0].id, "lib.rs_0");
    assert_eq!(hits[0].document, "fn replaced() {}");
}

#[tokio::test]
async fn delete_list_and_clear() {
    let (config, _temp_dir) = create_test_config();
    let store = VectorStore::new(&config).await.expect("should open store");

    let records = (0..4)
        .map(|i| create_record("o'brien.rs", i, i as f32))
        .collect();
    store.upsert(records).await.expect("should upsert");

    store
        .delete_ids(&["o'brien.rs_2".to_string(), "o'brien.rs_3".to_string()])
        .await
        .expect("should delete");
    assert_eq!(
        store.list_ids().await.expect("should list"),
        vec!["o'brien.rs_0", "o'brien.rs_1"]
    );

    store.clear().await.expect("should clear");
    assert_eq!(store.count().await.expect("should count"), 0);
    assert!(matches!(
        store.query(&[0.0; DIM], 1).await,
        Err(RagError::StoreUnavailable(_))
    ));
}

#[tokio::test]
async fn wrong_dimension_is_rejected() {
    let (config, _temp_dir) = create_test_config();
    let store = VectorStore::new(&config).await.expect("should open store");
    store
        .upsert(vec![create_record("a.rs", 0, 1.0)])
        .await
        .expect("should upsert");

    let mut bad = create_record("b.rs", 0, 1.0);
    bad.embedding.push(0.0);
    assert!(matches!(
        store.upsert(vec![bad]).await,
        Err(RagError::Database(_))
    ));
    assert!(matches!(
        store.query(&[0.0; DIM + 1], 1).await,
        Err(RagError::Database(_))
    ));
}

#[tokio::test]
async fn rejected_upsert_keeps_existing_records() {
    let (config, _temp_dir) = create_test_config();
    let store = VectorStore::new(&config).await.expect("should open store");
    store
        .upsert(vec![create_record("lib.rs", 0, 1.0), create_record("lib.rs", 1, 2.0)])
        .await
        .expect("should upsert");

    let mut replacement = create_record("lib.rs", 0, 0.0);
    replacement.document = "fn replaced() {}".to_string();
    let mut bad = create_record("lib.rs", 1, 0.0);
    bad.embedding.truncate(DIM - 1);
    let result = store
        .upsert(vec![replacement, bad, create_record("new.rs", 0, 3.0)])
        .await;
    assert!(matches!(result, Err(RagError::Database(_))));

    assert_eq!(store.count().await.expect("should count"), 2);
    assert_eq!(
        store.list_ids().await.expect("should list"),
        vec!["lib.rs_0", "lib.rs_1"]
    );
    let hits = store.query(&[0.0; DIM], 2).await.expect("should query");
    assert_eq!(hits[0].id, "lib.rs_0");
    assert!(hits[0].document.contains("lib.rs chunk 0"));
    assert!((hits[0].distance - 1.0).abs() < 1e-4);
}

#[tokio::test]
async fn upsert_mixes_replacements_and_inserts() {
    let (config, _temp_dir) = create_test_config();
    let store = VectorStore::new(&config).await.expect("should open store");
    store
        .upsert(vec![create_record("lib.rs", 0, 1.0), create_record("lib.rs", 1, 2.0)])
        .await
        .expect("should upsert");

    let mut replacement = create_record("lib.rs", 1, 0.5);
    replacement.document = "fn moved() {}".to_string();
    store
        .upsert(vec![replacement, create_record("main.rs", 0, 3.0)])
        .await
        .expect("should upsert again");

    assert_eq!(
        store.list_ids().await.expect("should list"),
        vec!["lib.rs_0", "lib.rs_1", "main.rs_0"]
    );
    let hits = store.query(&[0.0; DIM], 1).await.expect("should query");
    assert_eq!(hits[0].id, "lib.rs_1");
    assert_eq!(hits[0].document, "fn moved() {}");
}

#[tokio::test]
async fn zero_k_returns_nothing() {
    let (config, _temp_dir) = create_test_config();
    let store = VectorStore::new(&config).await.expect("should open store");
    store
        .upsert(vec![create_record("a.rs", 0, 1.0)])
        .await
        .expect("should upsert");

    assert!(store.query(&[0.0; DIM], 0).await.expect("should query").is_empty());
}
