use super::*;

fn schema() -> CollectionSchema {
    CollectionSchema::default().with_dimension(2)
}

fn record(content: &str, embedding: Vec<f32>, num_tokens: &str) -> Record {
    Record {
        content: content.to_string(),
        embedding,
        num_tokens: num_tokens.to_string(),
    }
}

#[tokio::test]
async fn create_and_check_collection() {
    let store = MemoryStore::new();
    assert!(!store.has_collection("docs").await.expect("has succeeds"));

    store
        .create_collection("docs", &schema())
        .await
        .expect("should create collection");
    assert!(store.has_collection("docs").await.expect("has succeeds"));
    assert_eq!(store.collection_names(), vec!["docs".to_string()]);
}

#[tokio::test]
async fn duplicate_create_is_rejected() {
    let store = MemoryStore::new().with_collection("docs", &schema());
    let result = store.create_collection("docs", &schema()).await;
    assert!(matches!(result, Err(StoreError::CollectionExists(name)) if name == "docs"));
}

#[tokio::test]
async fn identical_index_is_a_no_op() {
    let store = MemoryStore::new().with_collection("docs", &schema());
    store
        .create_index("docs", &schema())
        .await
        .expect("first index call succeeds");
    store
        .create_index("docs", &schema())
        .await
        .expect("second identical index call succeeds");
    assert_eq!(store.index("docs"), Some(schema().index));
}

#[tokio::test]
async fn conflicting_index_is_rejected() {
    let store = MemoryStore::new().with_collection("docs", &schema());
    store
        .create_index("docs", &schema())
        .await
        .expect("first index call succeeds");

    let mut other = schema();
    other.index.m = 16;
    let result = store.create_index("docs", &other).await;
    assert!(matches!(result, Err(StoreError::IndexConflict { .. })));
}

#[tokio::test]
async fn load_requires_index() {
    let store = MemoryStore::new().with_collection("docs", &schema());
    let result = store.load_collection("docs").await;
    assert!(matches!(result, Err(StoreError::IndexNotFound(_))));
    assert!(!store.is_loaded("docs"));

    store
        .create_index("docs", &schema())
        .await
        .expect("index call succeeds");
    store
        .load_collection("docs")
        .await
        .expect("load succeeds once indexed");
    assert!(store.is_loaded("docs"));
}

#[tokio::test]
async fn operations_on_missing_collection_fail() {
    let store = MemoryStore::new();
    assert!(matches!(
        store.create_index("missing", &schema()).await,
        Err(StoreError::CollectionNotFound(_))
    ));
    assert!(matches!(
        store.load_collection("missing").await,
        Err(StoreError::CollectionNotFound(_))
    ));
    assert!(matches!(
        store.insert("missing", &schema(), &[], 1).await,
        Err(StoreError::CollectionNotFound(_))
    ));
}

#[tokio::test]
async fn insert_assigns_sequential_ids() {
    let store = MemoryStore::new().with_collection("docs", &schema());
    let records = vec![
        record("hello", vec![0.1, 0.2], "2"),
        record("world", vec![0.3, 0.4], "1"),
    ];

    let inserted = store
        .insert("docs", &schema(), &records, 1)
        .await
        .expect("insert succeeds");
    assert_eq!(inserted, 2);
    assert_eq!(store.row_count("docs"), Some(2));
    assert_eq!(store.ids("docs"), Some(vec![1, 2]));
    assert_eq!(store.records("docs"), Some(records));
}

#[tokio::test]
async fn insert_rejects_dimension_mismatch() {
    let store = MemoryStore::new().with_collection("docs", &schema());
    let records = vec![
        record("ok", vec![0.1, 0.2], "1"),
        record("short", vec![0.1], "1"),
    ];

    match store.insert("docs", &schema(), &records, 1).await {
        Err(StoreError::DimensionMismatch {
            row,
            expected,
            actual,
        }) => {
            assert_eq!(row, 2);
            assert_eq!(expected, 2);
            assert_eq!(actual, 1);
        }
        other => panic!("expected DimensionMismatch, got {:?}", other),
    }
    assert_eq!(store.row_count("docs"), Some(0));
}

#[tokio::test]
async fn insert_rejects_non_integer_num_tokens() {
    let store = MemoryStore::new().with_collection("docs", &schema());
    let result = store
        .insert("docs", &schema(), &[record("x", vec![0.0, 0.0], "1.5")], 1)
        .await;
    assert!(matches!(result, Err(StoreError::InvalidNumTokens { row: 1, .. })));
}

#[tokio::test]
async fn insert_rejects_long_content() {
    let mut small = schema();
    small.max_content_length = 3;
    let store = MemoryStore::new().with_collection("docs", &small);

    let result = store
        .insert("docs", &small, &[record("toolong", vec![0.0, 0.0], "1")], 1)
        .await;
    assert!(matches!(
        result,
        Err(StoreError::ContentTooLong {
            bytes: 7,
            limit: 3,
            ..
        })
    ));
}

#[tokio::test]
async fn content_limit_counts_utf8_bytes() {
    let store = MemoryStore::new().with_collection("docs", &schema());
    let cjk = "中".repeat(20_000);

    let result = store
        .insert("docs", &schema(), &[record(&cjk, vec![0.0, 0.0], "1")], 1)
        .await;
    assert!(matches!(
        result,
        Err(StoreError::ContentTooLong {
            row: 1,
            bytes: 60_000,
            limit: 30_000,
        })
    ));
    assert_eq!(store.row_count("docs"), Some(0));

    let fits = "中".repeat(10_000);
    store
        .insert("docs", &schema(), &[record(&fits, vec![0.0, 0.0], "1")], 1)
        .await
        .expect("30000 bytes fits the limit");
}

#[tokio::test]
async fn insert_errors_use_input_row_numbers() {
    let store = MemoryStore::new().with_collection("docs", &schema());
    let records = vec![
        record("ok", vec![0.1, 0.2], "1"),
        record("short", vec![0.1], "1"),
    ];

    assert!(matches!(
        store.insert("docs", &schema(), &records, 501).await,
        Err(StoreError::DimensionMismatch { row: 502, .. })
    ));
}

#[tokio::test]
async fn calls_are_recorded_in_order() {
    let store = MemoryStore::new();
    store.has_collection("a").await.expect("has succeeds");
    store
        .create_collection("a", &schema())
        .await
        .expect("create succeeds");
    store
        .insert("a", &schema(), &[record("x", vec![1.0, 2.0], "3")], 1)
        .await
        .expect("insert succeeds");

    assert_eq!(
        store.calls(),
        vec![
            StoreCall::HasCollection("a".to_string()),
            StoreCall::CreateCollection("a".to_string()),
            StoreCall::Insert {
                collection: "a".to_string(),
                rows: 1
            },
        ]
    );
}
