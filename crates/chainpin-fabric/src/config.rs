//! Fabric connector configuration.

use serde::{Deserialize, Serialize};

use chainpin_core::ffi::FIRST_EVENT_OLDEST;
use chainpin_http::HttpConfig;
use chainpin_ws::WsConfig;

pub(crate) const FABCONNECT_SECTION: &str = "blockchain.fabric.fabconnect";
pub(crate) const FIREFLY_CONTRACT_SECTION: &str = "blockchain.fabric.firefly_contract";

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

/// Top-level Fabric plugin configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FabricConfig {
    #[serde(default)]
    pub fabconnect: FabconnectConfig,
    #[serde(default)]
    pub firefly_contract: Vec<FabricContractConfig>,
}

/// Connection to a fabconnect instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FabconnectConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub topic: String,
    /// Default channel for the FireFly chaincode.
    #[serde(default)]
    pub channel: String,
    /// Organization identity used for queries and subscriptions.
    #[serde(default)]
    pub signer: String,
    /// Deprecated, used when `firefly_contract` is empty.
    #[serde(default)]
    pub chaincode: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default = "default_ws")]
    pub ws: WsConfig,
}

impl Default for FabconnectConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            topic: String::new(),
            channel: String::new(),
            signer: String::new(),
            chaincode: String::new(),
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
            http: HttpConfig::default(),
            ws: default_ws(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FabricContractConfig {
    #[serde(default)]
    pub chaincode: String,
    #[serde(default = "default_from_block")]
    pub from_block: String,
}

impl FabricContractConfig {
    pub fn new(chaincode: &str) -> Self {
        Self {
            chaincode: chaincode.to_string(),
            from_block: default_from_block(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: FabricConfig = serde_json::from_value(json!({
            "fabconnect": {"url": "http://localhost:3000", "topic": "topic1", "signer": "org1"},
            "firefly_contract": [{"chaincode": "firefly"}]
        }))
        .unwrap();
        assert_eq!(config.fabconnect.batch_size, 50);
        assert_eq!(config.fabconnect.batch_timeout_ms, 500);
        assert_eq!(config.fabconnect.ws.path, "/ws");
        assert_eq!(config.firefly_contract[0].from_block, "oldest");
    }
}
