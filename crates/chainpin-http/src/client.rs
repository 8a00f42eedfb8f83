//! Connector REST client backed by `reqwest`.
//!
//! Features:
//! - Automatic retry with exponential backoff for transport errors and 5xx
//! - Basic auth and static headers from [`HttpConfig`]
//! - Remote `{"error": "..."}` text preserved in [`PluginError::Rest`]

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use chainpin_core::PluginError;

use crate::config::HttpConfig;
use crate::retry::RetryPolicy;

/// HTTP verbs used against the connector management API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// A request relative to the connector base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct RestRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl RestRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Status and raw body of a completed request.
#[derive(Debug, Clone, PartialEq)]
pub struct RestResponse {
    pub status: u16,
    pub body: String,
}

impl RestResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parses the body as JSON; an empty body is `null`.
    pub fn json(&self) -> Result<Value, PluginError> {
        if self.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Converts a non-2xx response into [`PluginError::Rest`].
    pub fn error_for_status(self) -> Result<Self, PluginError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(rest_error(self.status, &self.body))
        }
    }
}

/// Builds a [`PluginError::Rest`], preferring the connector's `error` field.
pub fn rest_error(status: u16, body: &str) -> PluginError {
    let remote = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        v.get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    let message = match remote {
        Some(msg) => msg,
        None if body.trim().is_empty() => format!("HTTP {status}"),
        None => body.to_string(),
    };
    PluginError::Rest {
        status: Some(status),
        message,
    }
}

/// Management/REST API of a blockchain connector.
#[async_trait]
pub trait RestClient: Send + Sync {
    /// Sends one request. Returns the response whatever its status.
    async fn execute(&self, req: RestRequest) -> Result<RestResponse, PluginError>;

    async fn get_json(&self, path: &str) -> Result<Value, PluginError> {
        self.execute(RestRequest::new(Method::Get, path))
            .await?
            .error_for_status()?
            .json()
    }

    async fn post_json(&self, path: &str, body: Value) -> Result<Value, PluginError> {
        self.execute(RestRequest::new(Method::Post, path).json(body))
            .await?
            .error_for_status()?
            .json()
    }

    async fn patch_json(&self, path: &str, body: Value) -> Result<Value, PluginError> {
        self.execute(RestRequest::new(Method::Patch, path).json(body))
            .await?
            .error_for_status()?
            .json()
    }

    async fn delete(&self, path: &str) -> Result<RestResponse, PluginError> {
        self.execute(RestRequest::new(Method::Delete, path)).await
    }
}

/// `reqwest` implementation of [`RestClient`] with built-in retry.
pub struct HttpRestClient {
    base_url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    config: HttpConfig,
}

impl HttpRestClient {
    /// Create a client for the connector at `base_url`.
    pub fn new(base_url: &str, config: &HttpConfig) -> Result<Self, PluginError> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| PluginError::Other(format!("invalid connector URL '{base_url}': {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| PluginError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            http,
            retry: RetryPolicy::new(config.retry.clone()),
            config: config.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    async fn send_once(&self, req: &RestRequest) -> Result<RestResponse, PluginError> {
        let url = self.url_for(&req.path);
        let mut builder = match req.method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url),
            Method::Patch => self.http.patch(&url),
            Method::Delete => self.http.delete(&url),
        };
        if let Some(auth) = &self.config.auth {
            builder = builder.basic_auth(&auth.username, Some(&auth.password));
        }
        for (name, value) in self.config.headers.iter() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        for (name, value) in &req.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await.map_err(|e| PluginError::Rest {
            status: None,
            message: e.to_string(),
        })?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| PluginError::Rest {
            status: Some(status),
            message: e.to_string(),
        })?;
        tracing::trace!(method = %req.method, path = %req.path, status, "connector response");

        if status >= 500 {
            return Err(rest_error(status, &body));
        }
        Ok(RestResponse { status, body })
    }
}

#[async_trait]
impl RestClient for HttpRestClient {
    async fn execute(&self, req: RestRequest) -> Result<RestResponse, PluginError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.send_once(&req).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_retryable() => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            method = %req.method,
                            path = %req.path,
                            "retrying connector request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(
                            attempt,
                            error = %e,
                            method = %req.method,
                            path = %req.path,
                            "max retries exceeded"
                        );
                        return Err(e);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rest_error_prefers_remote_error_field() {
        let err = rest_error(500, r#"{"error":"pop"}"#);
        assert!(matches!(err, PluginError::Rest { status: Some(500), ref message } if message == "pop"));
        assert_eq!(err.to_string(), "connector REST error: pop");
    }

    #[test]
    fn rest_error_falls_back_to_body_then_status() {
        let err = rest_error(400, "not json");
        assert!(err.to_string().contains("not json"));
        let err = rest_error(404, "");
        assert!(err.to_string().contains("HTTP 404"));
    }

    #[test]
    fn empty_body_is_null() {
        assert_eq!(RestResponse::new(204, "").json().unwrap(), Value::Null);
        assert!(RestResponse::new(200, "{bad").json().is_err());
    }

    #[test]
    fn new_rejects_bad_url_and_builds_paths() {
        assert!(HttpRestClient::new("::::", &HttpConfig::default()).is_err());
        let client = HttpRestClient::new("http://localhost:12345/", &HttpConfig::default()).unwrap();
        assert_eq!(client.url_for("/eventstreams"), "http://localhost:12345/eventstreams");
        assert_eq!(client.url_for("query"), "http://localhost:12345/query");
    }

    #[tokio::test]
    async fn transport_failure_is_retryable_rest_error() {
        let config = HttpConfig {
            request_timeout_ms: 500,
            retry: crate::retry::RetryConfig::disabled(),
            ..Default::default()
        };
        let client = HttpRestClient::new("http://127.0.0.1:1", &config).unwrap();
        let err = client.get_json("/eventstreams").await.unwrap_err();
        assert!(matches!(err, PluginError::Rest { status: None, .. }));
        assert!(err.is_retryable());
    }
}
