//! HTTP utilities for OCI REST API calls

use super::signer::RequestSigner;
use crate::error::ApiError;
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Per-request timeout; the poller owns the long wait, not the transport
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Sanitize response body for logging
/// Truncates long responses and drops non-printable characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// HTTP client wrapper for OCI API calls
#[derive(Clone)]
pub struct OciHttpClient {
    client: Client,
}

impl OciHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(concat!("cipower/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self { client })
    }

    /// Make a signed GET request to an OCI API
    pub async fn get(&self, url: &str, signer: &RequestSigner) -> Result<Value, ApiError> {
        tracing::debug!("GET {}", url);
        self.send(Method::GET, url, None, signer).await
    }

    /// Make a signed POST request to an OCI API. Actions without a payload
    /// still send (and sign) an empty body.
    pub async fn post(
        &self,
        url: &str,
        signer: &RequestSigner,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        tracing::debug!("POST {}", url);
        let body = match body {
            Some(body) => serde_json::to_vec(body)?,
            None => Vec::new(),
        };
        self.send(Method::POST, url, Some(body), signer).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<Vec<u8>>,
        signer: &RequestSigner,
    ) -> Result<Value, ApiError> {
        let url = Url::parse(url)?;
        let request_id = uuid::Uuid::new_v4().simple().to_string();
        let headers = signer.sign(&method, &url, body.as_deref())?;

        let mut request = self
            .client
            .request(method, url)
            .headers(headers)
            .header("opc-request-id", &request_id);
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let body = sanitize_for_log(&body);
            tracing::error!(request_id = %request_id, "API error: {} - {}", status, body);
            return Err(ApiError::Status { status, body });
        }

        // Start/stop answer 202 with no body
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_str(&body)?)
    }
}

/// Format an OCI API error for display
/// Maps well-known status codes to short messages instead of raw API detail
pub fn format_api_error(error: &ApiError) -> String {
    let friendly = match error.status_code() {
        Some(401) => Some("Authentication failed. Check the resource principal or API key."),
        Some(403) => Some("Permission denied. Check your IAM policies."),
        Some(404) => Some("Resource not found."),
        Some(409) => Some("Resource conflict. The instance may be in a transitional state."),
        Some(429) => Some("Rate limit exceeded. Please try again later."),
        Some(400) => Some("Invalid request. Check your parameters."),
        Some(500) | Some(502) | Some(503) => {
            Some("OCI service temporarily unavailable. Please try again.")
        }
        _ => None,
    };
    if let Some(message) = friendly {
        return message.to_string();
    }

    let error_str = error.to_string();
    let sanitized = error_str
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(120)
        .collect::<String>();

    if sanitized.len() < error_str.len() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}
