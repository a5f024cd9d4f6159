//! Credential-attaching JSON client.

use crate::error::{ApiError, ApiResult};
use onevpn_types::Credential;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Header the backend reads the session credential from.
pub const DEFAULT_CREDENTIAL_HEADER: &str = "X-Telegram-Init";

const MAX_LOG_BODY_CHARS: usize = 256;

/// Transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the backend (e.g. `https://vpn.example`).
    pub base_url: String,
    /// Name of the header carrying the credential.
    pub credential_header: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            credential_header: DEFAULT_CREDENTIAL_HEADER.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

/// Single call surface for the backend.
///
/// Cloning is cheap; clones share the credential, so a refresh through one
/// handle is seen by all of them.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    config: ApiConfig,
    credential: Arc<RwLock<Credential>>,
}

impl ApiClient {
    /// Creates a client that sends `credential` with every call.
    pub fn new(config: ApiConfig, credential: Credential) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ApiError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            credential: Arc::new(RwLock::new(credential)),
        })
    }

    /// Returns the transport configuration.
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Replaces the credential used for subsequent calls.
    pub async fn set_credential(&self, credential: Credential) {
        *self.credential.write().await = credential;
    }

    /// Returns the credential currently attached to calls.
    pub async fn credential(&self) -> Credential {
        self.credential.read().await.clone()
    }

    fn url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    /// Sends a request and decodes the JSON response.
    ///
    /// An empty success body decodes as JSON `null`, so `T = ()` works for
    /// endpoints that return nothing.
    pub async fn request<T, B>(&self, endpoint: &str, method: Method, body: Option<&B>) -> ApiResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let header_name = HeaderName::from_bytes(self.config.credential_header.as_bytes())
            .map_err(|e| ApiError::InvalidRequest(format!("invalid credential header name: {e}")))?;
        let credential = self.credential.read().await.clone();
        let header_value = HeaderValue::from_str(credential.expose())
            .map_err(|_| ApiError::InvalidRequest("credential is not a valid header value".into()))?;

        debug!("{} {}", method, endpoint);

        let mut request = self
            .client
            .request(method.clone(), self.url(endpoint))
            .header(CONTENT_TYPE, "application/json")
            .header(header_name, header_value);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(format!("{method} {endpoint} failed: {e}")))?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            log_failure(status, &text);
            return Err(ApiError::Status {
                status: status.as_u16(),
                detail: error_detail(status, &text),
            });
        }

        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(text).map_err(|e| ApiError::Decode(format!("{method} {endpoint}: {e}")))
    }

    /// `GET` shorthand.
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> ApiResult<T> {
        self.request::<T, ()>(endpoint, Method::GET, None).await
    }

    /// `POST` shorthand.
    pub async fn post<T, B>(&self, endpoint: &str, body: &B) -> ApiResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(endpoint, Method::POST, Some(body)).await
    }

    /// `DELETE` shorthand.
    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> ApiResult<T> {
        self.request::<T, ()>(endpoint, Method::DELETE, None).await
    }
}

/// Extracts the `detail` message from an error body, falling back to the
/// status description.
fn error_detail(status: StatusCode, body: &str) -> String {
    let parsed = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.detail);

    match parsed {
        Some(serde_json::Value::String(detail)) if !detail.is_empty() => detail,
        Some(serde_json::Value::Null | serde_json::Value::String(_)) | None => status
            .canonical_reason()
            .map_or_else(|| format!("HTTP {}", status.as_u16()), str::to_string),
        Some(other) => other.to_string(),
    }
}

fn log_failure(status: StatusCode, body: &str) {
    let mut preview: String = body.chars().take(MAX_LOG_BODY_CHARS).collect();
    if body.chars().count() > MAX_LOG_BODY_CHARS {
        preview.push_str("...");
    }
    debug!("API response error ({}): {}", status, preview);
}
