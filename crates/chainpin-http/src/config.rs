//! HTTP client configuration shared by the connector config sections.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::retry::RetryConfig;

fn default_request_timeout_ms() -> u64 {
    30_000
}

/// HTTP basic credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Settings for [`crate::HttpRestClient`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<BasicAuth>,
    /// Extra headers sent on every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            retry: RetryConfig::default(),
            auth: None,
            headers: HashMap::new(),
        }
    }
}
