//! REST search backend for Azure AI Search compatible services.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | create/update index | `PUT /indexes/{name}` with fields and an HNSW vector profile |
//! | delete index | `DELETE /indexes/{name}` (404 counts as success) |
//! | upload / delete records | `POST /indexes/{name}/docs/index` with `mergeOrUpload` / `delete` actions |
//! | query | `POST /indexes/{name}/docs/search` with `search` text and `vectorQueries` |
//!
//! Every request carries `api-version` and the admin key in the `api-key`
//! header. The key is read from the environment variable named by
//! `search.api_key_env`.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use docent_core::index::{
    fields, FieldKind, HybridQuery, IndexRecord, IndexSchema, RecordOutcome, SearchBackend,
};
use docent_core::models::{ChunkMetadata, RetrievedChunk};

use crate::config::SearchConfig;

const VECTOR_PROFILE: &str = "vector-profile";
const HNSW_CONFIG: &str = "hnsw-config";

/// Client for one search service.
pub struct RestSearchBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    api_version: String,
}

impl RestSearchBackend {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| anyhow!("search.endpoint required for the rest backend"))?
            .trim_end_matches('/')
            .to_string();
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("{} environment variable not set", config.api_key_env))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            api_version: config.api_version.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}?api-version={}", self.endpoint, path, self.api_version)
    }

    async fn send(&self, req: reqwest::RequestBuilder, what: &str) -> Result<reqwest::Response> {
        req.header("api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .send()
            .await
            .with_context(|| format!("{} request failed", what))
    }
}

async fn error_for_status(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    bail!(
        "{} failed (HTTP {}): {}",
        what,
        status,
        body.chars().take(300).collect::<String>()
    )
}

/// JSON index definition for a schema.
pub fn index_definition(schema: &IndexSchema) -> Value {
    let fields: Vec<Value> = schema
        .fields
        .iter()
        .map(|f| {
            let mut field = json!({
                "name": f.name,
                "key": f.key,
                "searchable": f.searchable,
                "filterable": f.filterable,
                "retrievable": true,
            });
            match f.kind {
                FieldKind::String => field["type"] = json!("Edm.String"),
                FieldKind::Int32 => field["type"] = json!("Edm.Int32"),
                FieldKind::Vector { dims } => {
                    field["type"] = json!("Collection(Edm.Single)");
                    field["dimensions"] = json!(dims);
                    field["vectorSearchProfile"] = json!(VECTOR_PROFILE);
                    field["retrievable"] = json!(false);
                    field["filterable"] = json!(false);
                }
            }
            field
        })
        .collect();

    json!({
        "name": schema.name,
        "fields": fields,
        "vectorSearch": {
            "algorithms": [{ "name": HNSW_CONFIG, "kind": "hnsw" }],
            "profiles": [{ "name": VECTOR_PROFILE, "algorithm": HNSW_CONFIG }],
        },
    })
}

#[derive(Debug, Deserialize)]
struct IndexingResponse {
    value: Vec<IndexingResult>,
}

#[derive(Debug, Deserialize)]
struct IndexingResult {
    key: String,
    status: bool,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    value: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "@search.score", default)]
    score: f64,
    #[serde(default)]
    id: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    source_document: String,
    page_number: Option<u32>,
    #[serde(default)]
    source_url: String,
    #[serde(default)]
    chunk_id: String,
}

/// Request body for a hybrid or vector-only query.
pub fn search_body(query: &HybridQuery) -> Value {
    let vector_query = json!({
        "kind": "vector",
        "vector": query.vector,
        "k": query.top_k,
        "fields": fields::CONTENT_VECTOR,
    });
    let select = [
        fields::ID,
        fields::CONTENT,
        fields::SOURCE_DOCUMENT,
        fields::PAGE_NUMBER,
        fields::SOURCE_URL,
        fields::CHUNK_ID,
    ]
    .join(",");

    let mut body = json!({
        "vectorQueries": [vector_query],
        "top": query.top_k,
        "select": select,
    });
    if query.hybrid {
        body["search"] = json!(query.text);
    }
    body
}

#[async_trait]
impl SearchBackend for RestSearchBackend {
    fn kind(&self) -> &'static str {
        "rest"
    }

    async fn create_or_update_index(&self, schema: &IndexSchema) -> Result<()> {
        let what = "create or update index";
        let resp = self
            .send(
                self.client
                    .put(self.url(&format!("/indexes/{}", schema.name)))
                    .json(&index_definition(schema)),
                what,
            )
            .await?;
        error_for_status(resp, what).await?;
        Ok(())
    }

    async fn delete_index(&self, name: &str) -> Result<()> {
        let what = "delete index";
        let resp = self
            .send(self.client.delete(self.url(&format!("/indexes/{}", name))), what)
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        error_for_status(resp, what).await?;
        Ok(())
    }

    async fn upload(&self, name: &str, records: &[IndexRecord]) -> Result<Vec<RecordOutcome>> {
        let actions: Vec<Value> = records
            .iter()
            .map(|r| -> Result<Value> {
                let mut doc = serde_json::to_value(r)?;
                doc["@search.action"] = json!("mergeOrUpload");
                Ok(doc)
            })
            .collect::<Result<_>>()?;

        let what = "upload documents";
        let resp = self
            .send(
                self.client
                    .post(self.url(&format!("/indexes/{}/docs/index", name)))
                    .json(&json!({ "value": actions })),
                what,
            )
            .await?;

        // 207 Multi-Status still carries per-record results
        let parsed: IndexingResponse = error_for_status(resp, what)
            .await?
            .json()
            .await
            .context("invalid indexing response")?;
        Ok(parsed
            .value
            .into_iter()
            .map(|r| RecordOutcome {
                id: r.key,
                succeeded: r.status,
                error: if r.status { None } else { r.error_message },
            })
            .collect())
    }

    async fn search(&self, name: &str, query: &HybridQuery) -> Result<Vec<RetrievedChunk>> {
        let what = "search";
        let resp = self
            .send(
                self.client
                    .post(self.url(&format!("/indexes/{}/docs/search", name)))
                    .json(&search_body(query)),
                what,
            )
            .await?;
        let parsed: SearchResponse = error_for_status(resp, what)
            .await?
            .json()
            .await
            .context("invalid search response")?;

        Ok(parsed
            .value
            .into_iter()
            .map(|hit| RetrievedChunk {
                content: hit.content,
                score: hit.score,
                metadata: ChunkMetadata {
                    source_document: hit.source_document,
                    page_number: hit.page_number,
                    chunk_id: if hit.chunk_id.is_empty() { hit.id } else { hit.chunk_id },
                    source_url: hit.source_url,
                },
            })
            .collect())
    }

    async fn list_ids(&self, name: &str, limit: usize) -> Result<Vec<String>> {
        let what = "list documents";
        let resp = self
            .send(
                self.client
                    .post(self.url(&format!("/indexes/{}/docs/search", name)))
                    .json(&json!({ "search": "*", "select": fields::ID, "top": limit })),
                what,
            )
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let parsed: SearchResponse = error_for_status(resp, what)
            .await?
            .json()
            .await
            .context("invalid search response")?;
        Ok(parsed.value.into_iter().map(|hit| hit.id).collect())
    }

    async fn delete_records(&self, name: &str, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let actions: Vec<Value> = ids
            .iter()
            .map(|id| json!({ "@search.action": "delete", "id": id }))
            .collect();

        let what = "delete documents";
        let resp = self
            .send(
                self.client
                    .post(self.url(&format!("/indexes/{}/docs/index", name)))
                    .json(&json!({ "value": actions })),
                what,
            )
            .await?;
        let parsed: IndexingResponse = error_for_status(resp, what)
            .await?
            .json()
            .await
            .context("invalid indexing response")?;
        Ok(parsed.value.iter().filter(|r| r.status).count())
    }
}
