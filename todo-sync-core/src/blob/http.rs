//! HTTP blob store client.
//!
//! Blobs use the publisher/aggregator API (`PUT /v1/blobs`,
//! `GET /v1/blobs/<id>`). Metadata documents use the keyed document
//! extension (`PUT`/`GET /v1/documents/<key>`) served by the same endpoints.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::BlobStore;
use crate::error::{Result, TodoError};
use crate::models::ListMetadata;
use crate::network::NetworkConfig;

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreResponse {
    newly_created: Option<NewlyCreated>,
    already_certified: Option<AlreadyCertified>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewlyCreated {
    blob_object: BlobObject,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlobObject {
    blob_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlreadyCertified {
    blob_id: String,
}

impl StoreResponse {
    fn into_blob_id(self) -> Option<String> {
        self.newly_created
            .map(|n| n.blob_object.blob_id)
            .or(self.already_certified.map(|a| a.blob_id))
    }
}

/// A [`BlobStore`] backed by a publisher (writes) and an aggregator (reads).
#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    client: reqwest::Client,
    publisher_url: String,
    aggregator_url: String,
    epochs: u32,
}

impl HttpBlobStore {
    pub fn new(publisher_url: String, aggregator_url: String, epochs: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TodoError::Remote(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            publisher_url: publisher_url.trim_end_matches('/').to_string(),
            aggregator_url: aggregator_url.trim_end_matches('/').to_string(),
            epochs,
        })
    }

    pub fn from_config(config: &NetworkConfig) -> Result<Self> {
        let (publisher, aggregator) = config.require_storage()?;
        Self::new(publisher.to_string(), aggregator.to_string(), config.epochs)
    }

    fn write_url(&self) -> String {
        format!("{}/v1/blobs?epochs={}", self.publisher_url, self.epochs)
    }

    fn read_url(&self, blob_id: &str) -> String {
        format!(
            "{}/v1/blobs/{}",
            self.aggregator_url,
            urlencoding::encode(blob_id)
        )
    }

    fn document_url(&self, base: &str, list_id: &str) -> String {
        format!(
            "{}/v1/documents/{}",
            base,
            urlencoding::encode(&ListMetadata::key_for(list_id))
        )
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn write_blob(&self, bytes: &[u8]) -> Result<String> {
        let response = self
            .client
            .put(self.write_url())
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(TodoError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TodoError::from_status(status, "blob", "<new>"));
        }

        let parsed: StoreResponse = response.json().await.map_err(TodoError::from_transport)?;
        let blob_id = parsed
            .into_blob_id()
            .ok_or_else(|| TodoError::Remote("store response carried no blob id".into()))?;
        debug!(blob_id = %blob_id, size = bytes.len(), "wrote blob");
        Ok(blob_id)
    }

    async fn read_blob(&self, blob_id: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(self.read_url(blob_id))
            .send()
            .await
            .map_err(TodoError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TodoError::from_status(status, "blob", blob_id));
        }

        let bytes = response.bytes().await.map_err(TodoError::from_transport)?;
        Ok(bytes.to_vec())
    }

    async fn read_metadata(&self, list_id: &str) -> Result<ListMetadata> {
        let response = self
            .client
            .get(self.document_url(&self.aggregator_url, list_id))
            .send()
            .await
            .map_err(TodoError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TodoError::from_status(
                status,
                "metadata",
                ListMetadata::key_for(list_id),
            ));
        }

        response.json().await.map_err(TodoError::from_transport)
    }

    async fn write_metadata(&self, list_id: &str, metadata: &ListMetadata) -> Result<()> {
        let response = self
            .client
            .put(self.document_url(&self.publisher_url, list_id))
            .json(metadata)
            .send()
            .await
            .map_err(TodoError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TodoError::from_status(
                status,
                "metadata",
                ListMetadata::key_for(list_id),
            ));
        }
        debug!(list_id, entries = metadata.todo_ids.len(), "wrote metadata");
        Ok(())
    }
}
