use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::models::catalog::Algorithm;
use crate::services::catalog::{AlgorithmCatalog, CatalogError};
use crate::services::execution::{ExecutionClient, ExecutionError, ExecutionStatus, RemoteStatus};

/// Metadata key prefix marking a band the algorithm requires.
const BAND_REQUIREMENT_PREFIX: &str = "ImgReq - ";
const CLOUD_COVER_REQUIREMENT: &str = "ImgReq - cloudCover";

/// Client for the Piazza execution gateway.
pub struct PiazzaClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientInitError {
    #[error("Invalid Piazza URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitData {
    job_id: String,
}

#[derive(Deserialize)]
struct StatusData {
    status: String,
    #[serde(default)]
    result: Option<StatusResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResult {
    #[serde(default)]
    data_id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceData {
    service_id: String,
    resource_metadata: ResourceMetadata,
}

#[derive(Deserialize)]
struct ResourceMetadata {
    name: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl PiazzaClient {
    /// Every request made through this client is bounded by `timeout`.
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ClientInitError> {
        let invalid = |reason: String| ClientInitError::InvalidUrl {
            url: base_url.to_string(),
            reason,
        };
        let parsed = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if parsed.cannot_be_a_base() {
            return Err(invalid("not a hierarchical URL".to_string()));
        }

        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()?;

        Ok(Self {
            http,
            base_url: parsed,
            api_key: api_key.to_string(),
        })
    }

    /// Base URL extended with `segments`, each percent-encoded as a single
    /// path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get(&self, url: Url) -> Result<String, ExecutionError> {
        let response = self
            .http
            .get(url)
            .basic_auth(&self.api_key, Some(""))
            .send()
            .await
            .map_err(transport_error)?;

        read_body(response).await
    }
}

#[async_trait]
impl ExecutionClient for PiazzaClient {
    async fn submit(
        &self,
        service_id: &str,
        inputs: serde_json::Value,
    ) -> Result<String, ExecutionError> {
        let request_body = serde_json::json!({
            "type": "execute-service",
            "data": {
                "serviceId": service_id,
                "dataInputs": inputs,
                "dataOutput": [{ "mimeType": "application/json", "type": "text" }],
            }
        });

        let response = self
            .http
            .post(self.endpoint(&["job"]))
            .basic_auth(&self.api_key, Some(""))
            .json(&request_body)
            .send()
            .await
            .map_err(transport_error)?;

        let body = read_body(response).await?;
        let envelope: Envelope<SubmitData> = decode(&body)?;
        Ok(envelope.data.job_id)
    }

    async fn get_status(&self, job_id: &str) -> Result<ExecutionStatus, ExecutionError> {
        let body = self.get(self.endpoint(&["job", job_id])).await?;
        decode_status(&body)
    }

    async fn get_file(&self, data_id: &str) -> Result<String, ExecutionError> {
        self.get(self.endpoint(&["file", data_id])).await
    }
}

#[async_trait]
impl AlgorithmCatalog for PiazzaClient {
    async fn get_algorithm(&self, algorithm_id: &str) -> Result<Algorithm, CatalogError> {
        let body = match self.get(self.endpoint(&["service", algorithm_id])).await {
            Ok(body) => body,
            Err(ExecutionError::NotFound) => {
                return Err(CatalogError::NotFound {
                    kind: "algorithm",
                    id: algorithm_id.to_string(),
                })
            }
            Err(e) => return Err(CatalogError::Unavailable(e.to_string())),
        };

        decode_algorithm(&body).map_err(|e| CatalogError::Unavailable(e.to_string()))
    }
}

/// Map a transport-level failure (connect, timeout, TLS) onto the error taxonomy.
fn transport_error(e: reqwest::Error) -> ExecutionError {
    if e.is_decode() {
        ExecutionError::InvalidResponse(e.to_string())
    } else {
        ExecutionError::Unreachable(e.to_string())
    }
}

async fn read_body(response: Response) -> Result<String, ExecutionError> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(classify_status(status, body))
    }
}

fn classify_status(status: StatusCode, body: String) -> ExecutionError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ExecutionError::Unauthorized,
        StatusCode::NOT_FOUND => ExecutionError::NotFound,
        _ => ExecutionError::ServerError {
            status: status.as_u16(),
            body,
        },
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ExecutionError> {
    serde_json::from_str(body).map_err(|e| ExecutionError::InvalidResponse(e.to_string()))
}

fn decode_status(body: &str) -> Result<ExecutionStatus, ExecutionError> {
    let envelope: Envelope<StatusData> = decode(body)?;
    let result = envelope.data.result;

    Ok(ExecutionStatus {
        status: RemoteStatus::parse(&envelope.data.status),
        data_id: result.as_ref().and_then(|r| r.data_id.clone()),
        error_message: result.and_then(|r| r.message),
    })
}

fn decode_algorithm(body: &str) -> Result<Algorithm, ExecutionError> {
    let envelope: Envelope<ServiceData> = decode(body)?;
    let service = envelope.data;
    let metadata = service.resource_metadata.metadata;

    let mut required_bands: Vec<String> = metadata
        .iter()
        .filter(|(key, value)| {
            key.as_str() != CLOUD_COVER_REQUIREMENT
                && key.starts_with(BAND_REQUIREMENT_PREFIX)
                && value.eq_ignore_ascii_case("yes")
        })
        .map(|(key, _)| key[BAND_REQUIREMENT_PREFIX.len()..].trim().to_lowercase())
        .collect();
    required_bands.sort();

    Ok(Algorithm {
        service_id: service.service_id,
        name: service.resource_metadata.name,
        version: service.resource_metadata.version.unwrap_or_default(),
        command: metadata.get("Cmd").cloned().unwrap_or_default(),
        required_bands,
        max_cloud_cover: metadata
            .get(CLOUD_COVER_REQUIREMENT)
            .and_then(|v| v.trim().parse().ok()),
    })
}
