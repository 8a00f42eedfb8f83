//! Plugin-level error types.

use thiserror::Error;

/// Errors returned by connector plugins and their transports.
#[derive(Debug, Error)]
pub enum PluginError {
    /// A required configuration key is absent or empty.
    #[error("missing configuration '{key}' for {section}")]
    MissingConfig { key: String, section: String },

    /// `FireFlyContracts.active.index` points past the configured deployments.
    #[error("invalid FireFly contract index: {0}")]
    InvalidContractIndex(String),

    /// Non-2xx response or request failure from the connector REST API.
    #[error("connector REST error: {message}")]
    Rest {
        status: Option<u16>,
        message: String,
    },

    /// WebSocket connection/send/receive error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Value is not a 20-byte hex Ethereum address.
    #[error("invalid Ethereum address: {0}")]
    InvalidAddress(String),

    /// Contract location JSON is malformed or incomplete.
    #[error("invalid contract location: {0}")]
    InvalidLocation(String),

    /// The `details` block of an FFI param schema is unusable.
    #[error("invalid details for param '{param}': {reason}")]
    InvalidParamDetails { param: String, reason: String },

    /// A custom option tried to replace a field the connector sets itself.
    #[error("custom option '{0}' would override an existing request field")]
    OptionOverride(String),

    /// Input could not be encoded for the connector.
    #[error("invalid input for '{field}': {reason}")]
    InvalidInput { field: String, reason: String },

    /// ABI type with no FFI schema equivalent.
    #[error("unsupported ABI type '{0}'")]
    UnsupportedAbiType(String),

    /// FFI generation input was not usable.
    #[error("FFI generation failed: {0}")]
    FfiGenerationFailed(String),

    /// This connector cannot generate FFIs.
    #[error("FFI generation is not supported by this connector")]
    FfiGenerationUnsupported,

    /// X.509 certificate could not be decoded.
    #[error("failed to decode certificate: {0}")]
    Certificate(String),

    /// Response could not be deserialized.
    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// Error returned by a registered listener; the event loop treats it as shutdown.
    #[error("{0}")]
    Callback(String),

    /// An unexpected error.
    #[error("{0}")]
    Other(String),
}

impl PluginError {
    /// Returns `true` if a retry might succeed (transport failures and 5xx).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rest { status: None, .. } => true,
            Self::Rest {
                status: Some(code), ..
            } => *code >= 500,
            Self::WebSocket(_) => true,
            _ => false,
        }
    }

    /// Shorthand for [`PluginError::MissingConfig`].
    pub fn missing_config(key: impl Into<String>, section: impl Into<String>) -> Self {
        Self::MissingConfig {
            key: key.into(),
            section: section.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rest_retryable_only_for_transport_and_5xx() {
        let transport = PluginError::Rest {
            status: None,
            message: "connection refused".into(),
        };
        let server = PluginError::Rest {
            status: Some(503),
            message: "busy".into(),
        };
        let client = PluginError::Rest {
            status: Some(400),
            message: "bad".into(),
        };
        assert!(transport.is_retryable());
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        assert!(!PluginError::OptionOverride("params".into()).is_retryable());
    }

    #[test]
    fn callback_error_displays_verbatim() {
        assert_eq!(PluginError::Callback("pop".into()).to_string(), "pop");
    }

    #[test]
    fn missing_config_names_key_and_section() {
        let err = PluginError::missing_config("topic", "blockchain.ethereum.ethconnect");
        assert_eq!(
            err.to_string(),
            "missing configuration 'topic' for blockchain.ethereum.ethconnect"
        );
    }
}
