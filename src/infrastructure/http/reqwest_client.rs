//! `HttpClient` over `reqwest`.

use async_trait::async_trait;

use crate::config::HttpSettings;
use crate::domain::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use crate::shared::error::SyncError;

/// Sends requests relative to a configured base URL. Single attempt, no retries.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestHttpClient {
    pub fn new(settings: &HttpSettings) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .user_agent(concat!("course-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Http(format!("failed to build client: {}", e)))?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Join the base URL and an endpoint path.
    pub fn url_for(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    fn method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, SyncError> {
        let url = self.url_for(&request.endpoint);
        let mut builder = self.client.request(Self::method(request.method), &url);
        if let Some(token) = &request.auth {
            builder = builder.bearer_auth(token.expose());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| SyncError::Http(format!("{} {} failed: {}", request.method.as_str(), url, e)))?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SyncError::Http(format!("failed to read response body: {}", e)))?;

        // Empty or non-JSON bodies (204, plain-text errors) map to Null
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };

        tracing::debug!(method = request.method.as_str(), %url, status, "HTTP request completed");
        Ok(HttpResponse { status, json })
    }
}
