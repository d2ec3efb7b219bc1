// Milvus RESTful API v2 client
// Served on the same host:port as the gRPC endpoint (19530 by default)


use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{StoreError, VectorStore};
use crate::config::MilvusConfig;
use crate::records::Record;
use crate::schema::{
    CONTENT_FIELD, CollectionSchema, EMBEDDING_FIELD, ID_FIELD, NUM_TOKENS_FIELD,
};

const HAS_COLLECTION_PATH: &str = "/v2/vectordb/collections/has";
const CREATE_COLLECTION_PATH: &str = "/v2/vectordb/collections/create";
const CREATE_INDEX_PATH: &str = "/v2/vectordb/indexes/create";
const LOAD_COLLECTION_PATH: &str = "/v2/vectordb/collections/load";
const LOAD_STATE_PATH: &str = "/v2/vectordb/collections/get_load_state";
const INSERT_PATH: &str = "/v2/vectordb/entities/insert";

const LOAD_STATE_LOADED: &str = "LoadStateLoaded";
const EXPONENTIAL_BACKOFF_BASE: u32 = 2;

#[derive(Debug, Error)]
pub enum MilvusError {
    #[error("Invalid Milvus URL: {0}")]
    InvalidUrl(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("HTTP status {status}")]
    Http { status: u16 },
    #[error("Milvus returned code {code}: {message}")]
    Api { code: i64, message: String },
    #[error("Failed to decode Milvus response: {0}")]
    Decode(String),
    #[error("Collection '{collection}' was not loaded after {waited:?}")]
    LoadTimeout { collection: String, waited: Duration },
}

impl MilvusError {
    /// Whether this is Milvus reporting that the same index is already present on the field
    fn is_existing_index(&self) -> bool {
        self.api_message_contains("already exist")
    }

    /// Whether the field already carries an index with different parameters
    fn is_conflicting_index(&self) -> bool {
        self.api_message_contains("at most one distinct index")
    }

    fn api_message_contains(&self, needle: &str) -> bool {
        match self {
            Self::Api { message, .. } => message.to_lowercase().contains(needle),
            _ => false,
        }
    }
}

/// Response envelope shared by every v2 endpoint
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CollectionRequest<'a> {
    collection_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct HasCollectionData {
    has: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCollectionRequest<'a> {
    collection_name: &'a str,
    description: &'a str,
    schema: SchemaPayload<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SchemaPayload<'a> {
    auto_id: bool,
    enable_dynamic_field: bool,
    fields: Vec<FieldPayload<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FieldPayload<'a> {
    field_name: &'a str,
    data_type: &'a str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    is_primary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    element_type_params: Option<ElementTypeParams>,
}

#[derive(Debug, Serialize)]
struct ElementTypeParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    dim: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_length: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateIndexRequest<'a> {
    collection_name: &'a str,
    index_params: Vec<IndexParamsPayload<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexParamsPayload<'a> {
    field_name: &'a str,
    index_name: &'a str,
    metric_type: &'a str,
    params: HnswParams<'a>,
}

#[derive(Debug, Serialize)]
struct HnswParams<'a> {
    index_type: &'a str,
    #[serde(rename = "M")]
    m: u32,
    #[serde(rename = "efConstruction")]
    ef_construction: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadStateData {
    load_state: String,
    #[serde(default)]
    load_progress: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertRequest<'a> {
    collection_name: &'a str,
    data: Vec<RowPayload<'a>>,
}

/// One row in field-aligned form. Field names must match [`CollectionSchema`].
#[derive(Debug, Serialize)]
struct RowPayload<'a> {
    embedding: &'a [f32],
    content: &'a str,
    #[serde(rename = "numToken")]
    num_token: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertData {
    insert_count: u64,
}

/// Client for a Milvus server's RESTful API
#[derive(Debug, Clone)]
pub struct MilvusClient {
    base_url: Url,
    token: Option<String>,
    agent: ureq::Agent,
    retry_attempts: u32,
    backoff: Duration,
    load_timeout: Duration,
    load_poll_interval: Duration,
}

impl MilvusClient {
    #[inline]
    pub fn new(config: &MilvusConfig) -> Result<Self, MilvusError> {
        let base_url = config
            .base_url()
            .map_err(|e| MilvusError::InvalidUrl(e.to_string()))?;

        Ok(Self::from_url(base_url)
            .with_timeout(Duration::from_secs(config.timeout_seconds))
            .with_retry_attempts(config.retry_attempts)
            .with_load_wait(
                Duration::from_secs(config.load_timeout_seconds),
                Duration::from_millis(config.load_poll_interval_ms),
            )
            .with_token(config.token.clone()))
    }

    #[inline]
    pub fn from_url(base_url: Url) -> Self {
        Self {
            base_url,
            token: None,
            agent: Self::build_agent(Duration::from_secs(30)),
            retry_attempts: 3,
            backoff: Duration::from_secs(1),
            load_timeout: Duration::from_secs(300),
            load_poll_interval: Duration::from_millis(500),
        }
    }

    fn build_agent(timeout: Duration) -> ureq::Agent {
        ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into()
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = Self::build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Base delay between retries; doubles on every attempt
    #[inline]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    #[inline]
    pub fn with_load_wait(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.load_timeout = timeout;
        self.load_poll_interval = poll_interval;
        self
    }

    #[inline]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// POST a JSON body and unwrap the `{code, message, data}` envelope.
    ///
    /// The blocking HTTP call runs on tokio's blocking pool.
    async fn post<B, T>(
        &self,
        path: &'static str,
        body: &B,
        retry: bool,
    ) -> Result<Option<T>, MilvusError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + Send + 'static,
    {
        let body = serde_json::to_string(body)
            .map_err(|e| MilvusError::Decode(format!("failed to encode request: {}", e)))?;
        let client = self.clone();

        tokio::task::spawn_blocking(move || client.post_blocking(path, &body, retry))
            .await
            .map_err(|e| MilvusError::Transport(format!("request task failed: {}", e)))?
    }

    fn post_blocking<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &str,
        retry: bool,
    ) -> Result<Option<T>, MilvusError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| MilvusError::InvalidUrl(format!("{}: {}", path, e)))?;

        debug!("POST {} ({} bytes)", url, body.len());

        let attempts = if retry { self.retry_attempts } else { 1 };
        let response_text = self.make_request_with_retry(attempts, || {
            let mut request = self
                .agent
                .post(url.as_str())
                .header("Content-Type", "application/json");
            if let Some(token) = &self.token {
                request = request.header("Authorization", format!("Bearer {}", token));
            }
            request
                .send(body)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let envelope: Envelope<T> = serde_json::from_str(&response_text)
            .map_err(|e| MilvusError::Decode(format!("{} from {}", e, path)))?;

        // Older servers answer 200 instead of 0 on success
        if envelope.code != 0 && envelope.code != 200 {
            return Err(MilvusError::Api {
                code: envelope.code,
                message: envelope.message.unwrap_or_default(),
            });
        }

        Ok(envelope.data)
    }

    fn make_request_with_retry<F>(
        &self,
        attempts: u32,
        mut request_fn: F,
    ) -> Result<String, MilvusError>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=attempts {
            debug!("HTTP request attempt {}/{}", attempt, attempts);

            match request_fn() {
                Ok(response_text) => return Ok(response_text),
                Err(ureq::Error::StatusCode(status)) if status >= 500 => {
                    warn!(
                        "Server error (status {}), attempt {}/{}",
                        status, attempt, attempts
                    );
                    last_error = Some(MilvusError::Http { status });
                }
                Err(ureq::Error::StatusCode(status)) => {
                    warn!("Client error (status {}), not retrying", status);
                    return Err(MilvusError::Http { status });
                }
                Err(
                    error @ (ureq::Error::ConnectionFailed
                    | ureq::Error::HostNotFound
                    | ureq::Error::Timeout(_)
                    | ureq::Error::Io(_)),
                ) => {
                    warn!(
                        "Transport error: {}, attempt {}/{}",
                        error, attempt, attempts
                    );
                    last_error = Some(MilvusError::Transport(error.to_string()));
                }
                Err(error) => {
                    warn!("Non-retryable error: {}", error);
                    return Err(MilvusError::Transport(error.to_string()));
                }
            }

            if attempt < attempts {
                let delay = self.backoff * EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1);
                debug!("Waiting {:?} before retry", delay);
                std::thread::sleep(delay);
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);
        Err(last_error
            .unwrap_or_else(|| MilvusError::Transport("request failed after retries".to_string())))
    }

    async fn load_state(&self, name: &str) -> Result<LoadStateData, MilvusError> {
        self.post::<_, LoadStateData>(
            LOAD_STATE_PATH,
            &CollectionRequest {
                collection_name: name,
            },
            true,
        )
        .await?
        .ok_or_else(|| MilvusError::Decode("load state response has no data".to_string()))
    }
}

fn collection_fields(schema: &CollectionSchema) -> Vec<FieldPayload<'static>> {
    vec![
        FieldPayload {
            field_name: ID_FIELD,
            data_type: "Int64",
            is_primary: true,
            element_type_params: None,
        },
        FieldPayload {
            field_name: EMBEDDING_FIELD,
            data_type: "FloatVector",
            is_primary: false,
            element_type_params: Some(ElementTypeParams {
                dim: Some(schema.dimension),
                max_length: None,
            }),
        },
        FieldPayload {
            field_name: CONTENT_FIELD,
            data_type: "VarChar",
            is_primary: false,
            element_type_params: Some(ElementTypeParams {
                dim: None,
                max_length: Some(schema.max_content_length),
            }),
        },
        FieldPayload {
            field_name: NUM_TOKENS_FIELD,
            data_type: "Int64",
            is_primary: false,
            element_type_params: None,
        },
    ]
}

fn insert_rows(records: &[Record], first_row: usize) -> Result<Vec<RowPayload<'_>>, StoreError> {
    records
        .iter()
        .enumerate()
        .map(|(offset, record)| {
            let num_token = record
                .num_tokens_value()
                .ok_or_else(|| StoreError::InvalidNumTokens {
                    row: first_row + offset,
                    value: record.num_tokens.clone(),
                })?;
            Ok(RowPayload {
                embedding: &record.embedding,
                content: &record.content,
                num_token,
            })
        })
        .collect()
}

#[async_trait]
impl VectorStore for MilvusClient {
    async fn has_collection(&self, name: &str) -> Result<bool, StoreError> {
        let data = self
            .post::<_, HasCollectionData>(
                HAS_COLLECTION_PATH,
                &CollectionRequest {
                    collection_name: name,
                },
                true,
            )
            .await?;

        data.map(|d| d.has).ok_or_else(|| {
            MilvusError::Decode("has collection response has no data".to_string()).into()
        })
    }

    async fn create_collection(
        &self,
        name: &str,
        schema: &CollectionSchema,
    ) -> Result<(), StoreError> {
        let request = CreateCollectionRequest {
            collection_name: name,
            description: &schema.description,
            schema: SchemaPayload {
                auto_id: true,
                enable_dynamic_field: schema.enable_dynamic_field,
                fields: collection_fields(schema),
            },
        };

        self.post::<_, serde_json::Value>(CREATE_COLLECTION_PATH, &request, false)
            .await?;
        Ok(())
    }

    async fn create_index(&self, name: &str, schema: &CollectionSchema) -> Result<(), StoreError> {
        let request = CreateIndexRequest {
            collection_name: name,
            index_params: vec![IndexParamsPayload {
                field_name: EMBEDDING_FIELD,
                index_name: &schema.index.name,
                metric_type: schema.index.metric.as_str(),
                params: HnswParams {
                    index_type: schema.index.index_type(),
                    m: schema.index.m,
                    ef_construction: schema.index.ef_construction,
                },
            }],
        };

        match self
            .post::<_, serde_json::Value>(CREATE_INDEX_PATH, &request, true)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_conflicting_index() => {
                error!("Index on {}.{} conflicts: {}", name, EMBEDDING_FIELD, e);
                Err(StoreError::IndexConflict {
                    collection: name.to_string(),
                    index: schema.index.name.clone(),
                })
            }
            Err(e) if e.is_existing_index() => {
                warn!("Index on {}.{} already exists: {}", name, EMBEDDING_FIELD, e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn load_collection(&self, name: &str) -> Result<(), StoreError> {
        self.post::<_, serde_json::Value>(
            LOAD_COLLECTION_PATH,
            &CollectionRequest {
                collection_name: name,
            },
            true,
        )
        .await?;

        let started = Instant::now();
        loop {
            let state = self.load_state(name).await?;
            if state.load_state == LOAD_STATE_LOADED {
                info!("Collection {} loaded in {:?}", name, started.elapsed());
                return Ok(());
            }

            debug!(
                "Collection {} load state {} ({}%)",
                name,
                state.load_state,
                state.load_progress.unwrap_or(0)
            );

            if started.elapsed() >= self.load_timeout {
                return Err(MilvusError::LoadTimeout {
                    collection: name.to_string(),
                    waited: started.elapsed(),
                }
                .into());
            }

            tokio::time::sleep(self.load_poll_interval).await;
        }
    }

    async fn insert(
        &self,
        name: &str,
        _schema: &CollectionSchema,
        records: &[Record],
        first_row: usize,
    ) -> Result<u64, StoreError> {
        let request = InsertRequest {
            collection_name: name,
            data: insert_rows(records, first_row)?,
        };

        // Inserts are not idempotent, so they are never retried
        let data = self
            .post::<_, InsertData>(INSERT_PATH, &request, false)
            .await?;

        Ok(data.map_or(0, |d| d.insert_count))
    }
}
