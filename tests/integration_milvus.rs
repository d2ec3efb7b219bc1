#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end runs of the loader against a mocked Milvus RESTful API

use std::io::Write;
use std::time::Duration;

use milvus_ingest::loader::{Loader, LoaderOptions};
use milvus_ingest::schema::CollectionSchema;
use milvus_ingest::store::MilvusClient;
use milvus_ingest::{IngestError, store::StoreError};
use serde_json::json;
use tempfile::NamedTempFile;
use url::Url;
use wiremock::matchers::{body_json, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ok(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "code": 0, "data": data }))
}

fn client_for(server: &MockServer) -> MilvusClient {
    MilvusClient::from_url(Url::parse(&server.uri()).expect("mock server uri is a valid url"))
        .with_backoff(Duration::from_millis(10))
        .with_load_wait(Duration::from_secs(5), Duration::from_millis(10))
}

fn two_row_csv() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("should create temp file");
    file.write_all(
        b"chunks,embedding,num_tokens\n\
          hello,\"[0.1,0.2]\",2\n\
          world,\"[0.3,0.4]\",1\n",
    )
    .expect("should write csv");
    file
}

async fn mount_provisioning(server: &MockServer, exists: bool, index_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/v2/vectordb/collections/has"))
        .and(body_json(json!({ "collectionName": "MyOrg" })))
        .respond_with(ok(json!({ "has": exists })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v2/vectordb/collections/create"))
        .and(body_partial_json(json!({
            "collectionName": "MyOrg",
            "schema": { "autoId": true, "enableDynamicField": true }
        })))
        .respond_with(ok(json!({})))
        .expect(u64::from(!exists))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v2/vectordb/indexes/create"))
        .and(body_partial_json(json!({ "collectionName": "MyOrg" })))
        .respond_with(ok(json!({})))
        .expect(index_calls)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v2/vectordb/collections/load"))
        .respond_with(ok(json!({})))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v2/vectordb/collections/get_load_state"))
        .respond_with(ok(json!({ "loadState": "LoadStateLoaded", "loadProgress": 100 })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn two_row_csv_end_to_end() {
    let server = MockServer::start().await;
    mount_provisioning(&server, false, 2).await;

    Mock::given(method("POST"))
        .and(path("/v2/vectordb/entities/insert"))
        .and(body_json(json!({
            "collectionName": "MyOrg",
            "data": [
                { "embedding": [0.1, 0.2], "content": "hello", "numToken": 2 },
                { "embedding": [0.3, 0.4], "content": "world", "numToken": 1 }
            ]
        })))
        .respond_with(ok(json!({ "insertCount": 2, "insertIds": [101, 102] })))
        .expect(1)
        .mount(&server)
        .await;

    let csv = two_row_csv();
    let loader = Loader::new(
        client_for(&server),
        CollectionSchema::default().with_dimension(2),
    );

    let summary = loader
        .ingest_file(csv.path(), "My Org!")
        .await
        .expect("end-to-end ingest succeeds");

    assert_eq!(summary.collection, "MyOrg");
    assert!(summary.created);
    assert_eq!(summary.records, 2);
    assert_eq!(summary.inserted, 2);
    assert_eq!(summary.batches, 1);
}

#[tokio::test]
async fn existing_collection_is_not_recreated() {
    let server = MockServer::start().await;
    mount_provisioning(&server, true, 1).await;

    Mock::given(method("POST"))
        .and(path("/v2/vectordb/entities/insert"))
        .respond_with(ok(json!({ "insertCount": 1, "insertIds": [7] })))
        .expect(2)
        .mount(&server)
        .await;

    let csv = two_row_csv();
    let loader = Loader::new(
        client_for(&server),
        CollectionSchema::default().with_dimension(2),
    )
    .with_options(LoaderOptions {
        batch_size: 1,
        rebuild_index_after_insert: false,
        show_progress: false,
    });

    let summary = loader
        .ingest_file(csv.path(), "MyOrg")
        .await
        .expect("ingest into existing collection succeeds");

    assert!(!summary.created);
    assert_eq!(summary.batches, 2);
    assert_eq!(summary.inserted, 2);
}

#[tokio::test]
async fn wrong_dimension_never_reaches_insert() {
    let server = MockServer::start().await;
    mount_provisioning(&server, false, 1).await;

    Mock::given(method("POST"))
        .and(path("/v2/vectordb/entities/insert"))
        .respond_with(ok(json!({ "insertCount": 2 })))
        .expect(0)
        .mount(&server)
        .await;

    let csv = two_row_csv();
    let loader = Loader::new(client_for(&server), CollectionSchema::default());

    let result = loader.ingest_file(csv.path(), "My Org!").await;
    assert!(matches!(
        result,
        Err(IngestError::Store(StoreError::DimensionMismatch {
            row: 1,
            expected: 1536,
            actual: 2
        }))
    ));
}

#[tokio::test]
async fn connection_failure_is_fatal() {
    // Port 1 is reserved and has no listener
    let uri = "http://127.0.0.1:1";

    let client = MilvusClient::from_url(Url::parse(uri).expect("valid url"))
        .with_retry_attempts(1)
        .with_timeout(Duration::from_secs(2));
    let loader = Loader::new(client, CollectionSchema::default().with_dimension(2));

    let csv = two_row_csv();
    let result = loader.ingest_file(csv.path(), "MyOrg").await;
    assert!(matches!(result, Err(IngestError::Store(StoreError::Milvus(_)))));
}
