//! HTTP implementation of [`BoundaryApi`].

use async_trait::async_trait;
use field_sync_models::{HierarchySnapshot, IngestSummary};
use geojson::FeatureCollection;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{BoundaryApi, RemoteError};

/// Boundary API client over HTTP.
///
/// Ingest operations map to RPC-style POST endpoints; the hierarchy query
/// is a plain GET. All requests carry the API key as a bearer token when
/// one is configured.
pub struct HttpBoundaryApi {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpBoundaryApi {
    /// Creates a client for the service at `base_url`.
    #[must_use]
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, RemoteError> {
        let mut request = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        decode(request.send().await?).await
    }
}

/// Request body for the hierarchy bulk-ingest procedure.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HierarchyIngestRequest<'a> {
    payload: &'a FeatureCollection,
    owner_id: &'a str,
    replace_missing: bool,
}

/// Request body for the legacy per-dataset ingest.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DatasetIngestRequest<'a> {
    dataset_id: &'a str,
    layer_id: &'a str,
    payload: &'a FeatureCollection,
}

/// Response body of the legacy per-dataset ingest.
#[derive(Deserialize)]
struct DatasetIngestResponse {
    inserted: u64,
}

/// Error envelope the endpoints return on failure. Both fields are
/// optional because proxies in front of the service produce bare text.
#[derive(Default, Deserialize)]
struct ErrorEnvelope {
    code: Option<String>,
    message: Option<String>,
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RemoteError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let envelope: ErrorEnvelope = serde_json::from_str(&body).unwrap_or_default();
        return Err(RemoteError::Api {
            status: status.as_u16(),
            code: envelope.code,
            message: envelope
                .message
                .unwrap_or_else(|| format!("HTTP {status}: {body}")),
        });
    }

    Ok(serde_json::from_str(&body)?)
}

#[async_trait]
impl BoundaryApi for HttpBoundaryApi {
    async fn ingest_hierarchy(
        &self,
        payload: &FeatureCollection,
        owner_id: &str,
        replace_missing: bool,
    ) -> Result<IngestSummary, RemoteError> {
        self.post_json(
            "/rpc/ingest-hierarchy",
            &HierarchyIngestRequest {
                payload,
                owner_id,
                replace_missing,
            },
        )
        .await
    }

    async fn ingest_dataset(
        &self,
        dataset_id: &str,
        layer_id: &str,
        payload: &FeatureCollection,
    ) -> Result<u64, RemoteError> {
        let response: DatasetIngestResponse = self
            .post_json(
                "/rpc/ingest-dataset",
                &DatasetIngestRequest {
                    dataset_id,
                    layer_id,
                    payload,
                },
            )
            .await?;
        Ok(response.inserted)
    }

    async fn fetch_hierarchy(&self, owner_id: &str) -> Result<HierarchySnapshot, RemoteError> {
        let mut request = self
            .client
            .get(format!("{}/hierarchy", self.base_url))
            .query(&[("ownerId", owner_id)]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        decode(request.send().await?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_loses_trailing_slash() {
        let api = HttpBoundaryApi::new("https://api.example.com/", None);
        assert_eq!(api.base_url, "https://api.example.com");
    }

    #[test]
    fn error_envelope_tolerates_bare_text() {
        let envelope: ErrorEnvelope = serde_json::from_str("{}").unwrap_or_default();
        assert!(envelope.code.is_none());
        let envelope: ErrorEnvelope = serde_json::from_str("not json").unwrap_or_default();
        assert!(envelope.message.is_none());
    }
}
