//! Contract deployment records and the connector's shared runtime state.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::types::JsonObject;

/// One deployment slot of the pinning contract.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractInfo {
    /// Index into the configured deployments.
    pub index: usize,
    /// Connector-specific binding details (address or chaincode, fromBlock, subscription).
    #[serde(default)]
    pub info: JsonObject,
    /// ProtocolID of the termination event, set once the deployment is retired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_event: Option<String>,
}

/// The active deployment plus the append-only history of retired ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FireFlyContracts {
    pub active: ContractInfo,
    #[serde(default)]
    pub terminated: Vec<ContractInfo>,
}

impl FireFlyContracts {
    /// Retires the active deployment at `final_event` and activates the next slot.
    ///
    /// Returns the new active index.
    pub fn roll_forward(&mut self, final_event: &str) -> usize {
        let next = self.active.index + 1;
        let mut retired = std::mem::replace(
            &mut self.active,
            ContractInfo {
                index: next,
                ..Default::default()
            },
        );
        retired.final_event = Some(final_event.to_string());
        self.terminated.push(retired);
        next
    }
}

/// Values published by a successful contract configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractBinding {
    /// Contract address (Ethereum) or chaincode name (Fabric).
    pub location: String,
    pub from_block: String,
    pub network_version: u32,
    /// Connector id of the BatchPin subscription.
    pub subscription: String,
}

/// Mutex-guarded [`ContractBinding`]. The lock is only held to copy or swap.
#[derive(Debug, Default)]
pub struct ContractState {
    inner: Mutex<ContractBinding>,
}

impl ContractState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of the current binding.
    pub fn snapshot(&self) -> ContractBinding {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Atomically publishes a new binding, returning the previous one.
    pub fn replace(&self, binding: ContractBinding) -> ContractBinding {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *guard, binding)
    }

    /// Id of the active BatchPin subscription (empty before configuration).
    pub fn subscription(&self) -> String {
        self.snapshot().subscription
    }

    pub fn network_version(&self) -> u32 {
        self.snapshot().network_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn roll_forward_appends_and_bumps_index() {
        let mut contracts = FireFlyContracts::default();
        contracts
            .active
            .info
            .insert("address".into(), json!("0x123"));

        let next = contracts.roll_forward("000000000010/000020/000030");

        assert_eq!(next, 1);
        assert_eq!(contracts.active.index, 1);
        assert!(contracts.active.info.is_empty());
        assert!(contracts.active.final_event.is_none());
        assert_eq!(contracts.terminated.len(), 1);
        assert_eq!(contracts.terminated[0].index, 0);
        assert_eq!(
            contracts.terminated[0].final_event.as_deref(),
            Some("000000000010/000020/000030")
        );
        assert_eq!(contracts.terminated[0].info["address"], "0x123");
    }

    #[test]
    fn state_replace_returns_previous() {
        let state = ContractState::new();
        assert_eq!(state.subscription(), "");
        let prev = state.replace(ContractBinding {
            location: "0xabc".into(),
            from_block: "oldest".into(),
            network_version: 2,
            subscription: "sb-1".into(),
        });
        assert_eq!(prev, ContractBinding::default());
        assert_eq!(state.subscription(), "sb-1");
        assert_eq!(state.network_version(), 2);
    }

    #[test]
    fn contracts_serialize_camel_case() {
        let mut contracts = FireFlyContracts::default();
        contracts.roll_forward("1");
        let v = serde_json::to_value(&contracts).unwrap();
        assert_eq!(v["terminated"][0]["finalEvent"], "1");
        assert!(v["active"].get("finalEvent").is_none());
    }
}
