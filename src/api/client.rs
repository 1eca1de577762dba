use std::{sync::Arc, time::Duration};

use reqwest::{header, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::settings::normalize_base_url;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("malformed response body: {0}")]
    Decode(String),
}

/// Thin JSON client for the dashboard backend.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Arc<str>,
    bearer_token: Option<Arc<str>>,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_http(http, base_url))
    }

    /// Wraps an already configured `reqwest` client.
    pub fn with_http(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: normalize_base_url(base_url).into(),
            bearer_token: None,
        }
    }

    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token.filter(|t| !t.is_empty()).map(Into::into);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URLs pass through untouched; anything else is joined to the base.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Authenticated GET. `Ok(None)` means the backend answered `204 No Content`.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ApiError> {
        let request = self.authorize(self.http.get(self.url(path)));
        self.send(request).await
    }

    /// POST without credentials; the upload endpoint is open.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<Option<T>, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.http.post(self.url(path)).json(body);
        self.send(request).await
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Option<T>, ApiError> {
        let response = request
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status,
                message: detail_message(status, &body),
            });
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| ApiError::Decode(err.to_string()))
    }
}

/// Error text for a failed response: the body's `detail` field when present,
/// otherwise the status reason.
pub fn detail_message(status: StatusCode, body: &str) -> String {
    let fallback = || {
        status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| "Request failed".to_string())
    };

    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return fallback();
    };

    match value.get("detail") {
        Some(serde_json::Value::String(detail)) if detail.is_empty() => fallback(),
        Some(serde_json::Value::String(detail)) => detail.clone(),
        Some(serde_json::Value::Null) | None => fallback(),
        Some(structured) => structured.to_string(),
    }
}
