//! Elasticsearch-compatible index store.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::IndexStore;
use crate::decode::ExtractedDocument;
use crate::error::IndexError;
use crate::Result;

/// Index store speaking the Elasticsearch REST API.
#[derive(Debug, Clone)]
pub struct ElasticIndexStore {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    errors: bool,
}

#[derive(Debug, Deserialize)]
struct DeleteByQueryResponse {
    #[serde(default)]
    deleted: u64,
}

impl ElasticIndexStore {
    /// Create a client for the service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(IndexError::from)?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn post_empty(&self, operation: &'static str, path: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url(path))
            .send()
            .await
            .map_err(IndexError::from)?;
        check(operation, response).await?;
        Ok(())
    }
}

/// Turn a non-success response into [`IndexError::Status`].
async fn check(operation: &'static str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(IndexError::Status {
        operation,
        status: status.as_u16(),
        body,
    }
    .into())
}

/// Index body: explicit keyword mapping for identity fields, text for content.
fn index_definition() -> serde_json::Value {
    json!({
        "mappings": {
            "properties": {
                "id": { "type": "keyword" },
                "contentHash": { "type": "keyword" },
                "originalPath": { "type": "keyword" },
                "fileName": { "type": "text", "fields": { "raw": { "type": "keyword" } } },
                "extension": { "type": "keyword" },
                "sizeBytes": { "type": "long" },
                "createdAt": { "type": "date" },
                "modifiedAt": { "type": "date" },
                "metadata": { "type": "object", "dynamic": true },
                "content": { "type": "text" }
            }
        }
    })
}

/// NDJSON body for the `_bulk` endpoint: one action line and one source line per
/// document, newline-terminated.
fn bulk_body(index: &str, docs: &[ExtractedDocument]) -> Result<String> {
    let mut body = String::new();
    for doc in docs {
        let action = json!({ "index": { "_index": index, "_id": doc.id } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(doc)?);
        body.push('\n');
    }
    Ok(body)
}

fn ids_query(ids: &[String]) -> serde_json::Value {
    json!({ "query": { "ids": { "values": ids } } })
}

#[async_trait]
impl IndexStore for ElasticIndexStore {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        let response = self
            .client
            .head(self.url(index))
            .send()
            .await
            .map_err(IndexError::from)?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            _ => check("index_exists", response).await.map(|_| true),
        }
    }

    async fn create_index(&self, index: &str) -> Result<()> {
        let response = self
            .client
            .put(self.url(index))
            .json(&index_definition())
            .send()
            .await
            .map_err(IndexError::from)?;
        check("create_index", response).await?;
        tracing::info!(index, "Index created");
        Ok(())
    }

    async fn bulk_write(&self, index: &str, docs: &[ExtractedDocument]) -> Result<bool> {
        if docs.is_empty() {
            return Ok(true);
        }
        let body = bulk_body(index, docs)?;
        let response = self
            .client
            .post(self.url("_bulk"))
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(IndexError::from)?;
        let parsed: BulkResponse = check("bulk", response)
            .await?
            .json()
            .await
            .map_err(IndexError::from)?;
        Ok(!parsed.errors)
    }

    async fn remove_by_id(&self, index: &str, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let response = self
            .client
            .post(self.url(&format!("{index}/_delete_by_query?conflicts=proceed")))
            .json(&ids_query(ids))
            .send()
            .await
            .map_err(IndexError::from)?;
        let parsed: DeleteByQueryResponse = check("delete_by_query", response)
            .await?
            .json()
            .await
            .map_err(IndexError::from)?;
        Ok(parsed.deleted)
    }

    async fn flush(&self, index: &str) -> Result<()> {
        self.post_empty("flush", &format!("{index}/_flush")).await
    }

    async fn refresh(&self, index: &str) -> Result<()> {
        self.post_empty("refresh", &format!("{index}/_refresh")).await
    }
}
