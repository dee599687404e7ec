use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use super::dto::parse_error_detail;
use crate::ports::{ApiError, ApiResult};

const USER_AGENT: &str = concat!("todo-cli/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
}

impl HttpClient {
    pub fn new(base_url: &str, timeout_seconds: u64) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let response = self.send(self.client.get(self.url(path))).await?;
        self.read_json(response).await
    }

    pub async fn post<T: DeserializeOwned, R: Serialize>(&self, path: &str, body: &R) -> ApiResult<T> {
        let response = self.send(self.client.post(self.url(path)).json(body)).await?;
        self.read_json(response).await
    }

    /// POST without a request body.
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let response = self.send(self.client.post(self.url(path))).await?;
        self.read_json(response).await
    }

    pub async fn delete(&self, path: &str) -> ApiResult<()> {
        self.send(self.client.delete(self.url(path))).await?;
        Ok(())
    }

    /// Send a request and turn any non-2xx status into [`ApiError::Http`].
    async fn send(&self, request: RequestBuilder) -> ApiResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!("API error response {}: {}", status, body);

        Err(ApiError::Http {
            status: status.as_u16(),
            detail: parse_error_detail(&body),
        })
    }

    async fn read_json<T: DeserializeOwned>(&self, response: Response) -> ApiResult<T> {
        let response_text = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        tracing::debug!("API Response: {}", response_text);

        serde_json::from_str(&response_text).map_err(|e| {
            ApiError::Serialization(format!(
                "Failed to parse response: {}. Response was: {}",
                e, response_text
            ))
        })
    }
}
