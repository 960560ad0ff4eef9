//! API Sync Module
//!
//! HTTP communication with the EcoStream fleet backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// Source of raw fleet and alert payloads for the live poller.
///
/// [`ApiClient`] is the production implementation; tests script their own.
#[async_trait]
pub trait FleetBackend: Send + Sync {
    async fn fetch_fleet(&self) -> Result<Value, ApiError>;
    async fn fetch_alerts(&self) -> Result<Value, ApiError>;
}

/// API client for the EcoStream backend
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Fetch the current fleet payload: `{ units: [...] }`.
    pub async fn get_fleet(&self) -> Result<Value, ApiError> {
        self.fetch_json(self.client.get(format!("{}/api/fleet", self.base_url)))
            .await
    }

    /// Fetch the current alerts payload: `{ alerts: [...] }`.
    pub async fn get_alerts(&self) -> Result<Value, ApiError> {
        self.fetch_json(self.client.get(format!("{}/api/alerts", self.base_url)))
            .await
    }

    /// Ask the backend to diagnose a unit.
    pub async fn diagnose(
        &self,
        unit_id: &str,
        question: &str,
    ) -> Result<DiagnoseResponse, ApiError> {
        info!("Requesting diagnosis for unit {}", unit_id);

        let body = self
            .fetch_json(
                self.client
                    .post(format!("{}/api/diagnose", self.base_url))
                    .json(&DiagnoseRequest { unit_id, question }),
            )
            .await?;

        serde_json::from_value(body).map_err(|e| ApiError::Parse(e.to_string()))
    }

    /// Send a request and apply the uniform response policy: any non-2xx
    /// status is a failure carrying the parsed body when there is one; a
    /// 2xx empty body is null; a 2xx malformed body is a parse failure.
    async fn fetch_json(&self, request: reqwest::RequestBuilder) -> Result<Value, ApiError> {
        let response = request
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if !status.is_success() {
            debug!("Request failed with HTTP {}", status);
            return Err(ApiError::Http {
                status: status.as_u16(),
                body: serde_json::from_str(&text).ok(),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| ApiError::Parse(e.to_string()))
    }
}

#[async_trait]
impl FleetBackend for ApiClient {
    async fn fetch_fleet(&self) -> Result<Value, ApiError> {
        self.get_fleet().await
    }

    async fn fetch_alerts(&self) -> Result<Value, ApiError> {
        self.get_alerts().await
    }
}

// Request/Response types

#[derive(Serialize)]
struct DiagnoseRequest<'a> {
    unit_id: &'a str,
    question: &'a str,
}

/// Diagnosis result. Fields the backend omits default to empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiagnoseResponse {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub retrieve: Option<Value>,
}

/// API errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}")]
    Http { status: u16, body: Option<Value> },

    #[error("Parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = ApiClient::new("http://localhost:8000/");
        assert_eq!(client.base_url, "http://localhost:8000");
    }

    #[test]
    fn diagnose_request_serializes_contract_fields() {
        let request = DiagnoseRequest {
            unit_id: "ECO-101",
            question: "why is the motor hot?",
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"unit_id": "ECO-101", "question": "why is the motor hot?"})
        );
    }

    #[test]
    fn diagnose_response_tolerates_sparse_bodies() {
        let response: DiagnoseResponse = serde_json::from_value(json!({})).unwrap();
        assert!(response.mode.is_none());
        assert!(response.steps.is_empty());
        assert!(response.retrieve.is_none());

        let response: DiagnoseResponse = serde_json::from_value(json!({
            "mode": "retrieval_fallback",
            "steps": ["Check coolant loop", "Reduce load"],
            "retrieve": {"response": "manual chunk"},
            "unit_id": "ECO-101"
        }))
        .unwrap();
        assert_eq!(response.mode.as_deref(), Some("retrieval_fallback"));
        assert_eq!(response.steps.len(), 2);
        assert!(response.retrieve.is_some());
    }

    #[test]
    fn api_error_messages() {
        assert_eq!(
            ApiError::Http { status: 503, body: None }.to_string(),
            "HTTP 503"
        );
        assert!(ApiError::Network("refused".into()).to_string().contains("refused"));
    }
}
