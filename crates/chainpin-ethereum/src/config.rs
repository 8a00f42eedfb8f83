//! Ethereum connector configuration.

use serde::{Deserialize, Serialize};

use chainpin_core::ffi::FIRST_EVENT_OLDEST;
use chainpin_http::HttpConfig;
use chainpin_ws::WsConfig;

pub(crate) const ETHCONNECT_SECTION: &str = "blockchain.ethereum.ethconnect";
pub(crate) const FIREFLY_CONTRACT_SECTION: &str = "blockchain.ethereum.firefly_contract";

fn default_batch_size() -> u32 {
    50
}
fn default_batch_timeout_ms() -> u64 {
    500
}
fn default_ws() -> WsConfig {
    WsConfig::with_path("/ws")
}
fn default_from_block() -> String {
    FIRST_EVENT_OLDEST.to_string()
}

/// Top-level Ethereum plugin configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EthereumConfig {
    #[serde(default)]
    pub ethconnect: EthconnectConfig,
    /// Ordered FireFly contract deployments; `FireFlyContracts.active.index` points into it.
    #[serde(default)]
    pub firefly_contract: Vec<EthereumContractConfig>,
}

/// Connection to an ethconnect instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EthconnectConfig {
    /// REST base URL. Required.
    #[serde(default)]
    pub url: String,
    /// Event stream websocket topic. Required.
    #[serde(default)]
    pub topic: String,
    /// Deprecated single-contract setting, used when `firefly_contract` is empty.
    #[serde(default)]
    pub instance: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
    #[serde(default)]
    pub http: HttpConfig,
    /// Event websocket; the path defaults to `/ws`.
    #[serde(default = "default_ws")]
    pub ws: WsConfig,
}

impl Default for EthconnectConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            topic: String::new(),
            instance: String::new(),
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
            http: HttpConfig::default(),
            ws: default_ws(),
        }
    }
}

/// One FireFly contract deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthereumContractConfig {
    #[serde(default)]
    pub address: String,
    /// `oldest`, `newest` or a block number.
    #[serde(default = "default_from_block")]
    pub from_block: String,
}

impl EthereumContractConfig {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            from_block: default_from_block(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_applied() {
        let cfg: EthereumConfig = serde_json::from_value(json!({
            "ethconnect": { "url": "http://localhost:12345", "topic": "topic1" },
            "firefly_contract": [{ "address": "0x123" }]
        }))
        .unwrap();
        assert_eq!(cfg.ethconnect.batch_size, 50);
        assert_eq!(cfg.ethconnect.batch_timeout_ms, 500);
        assert_eq!(cfg.ethconnect.instance, "");
        assert_eq!(cfg.firefly_contract[0].from_block, "oldest");
    }

    #[test]
    fn empty_config_is_valid_json() {
        let cfg: EthereumConfig = serde_json::from_value(json!({})).unwrap();
        assert!(cfg.ethconnect.url.is_empty());
        assert!(cfg.firefly_contract.is_empty());
    }
}
