//! FireFly Interface (FFI) model and contract listener records.
//!
//! An FFI describes a custom contract in chain-neutral terms: each method and
//! event parameter carries a JSON Schema, and a `details` object holds the
//! connector-specific type information (for Ethereum, the ABI type).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::PluginError;
use crate::types::JsonObject;

/// Replay a listener from the start of the chain.
pub const FIRST_EVENT_OLDEST: &str = "oldest";
/// Deliver only events emitted after the listener is created.
pub const FIRST_EVENT_NEWEST: &str = "newest";

/// A named parameter and its JSON Schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FfiParam {
    pub name: String,
    #[serde(default)]
    pub schema: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FfiMethod {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub params: Vec<FfiParam>,
    #[serde(default)]
    pub returns: Vec<FfiParam>,
    #[serde(default, skip_serializing_if = "JsonObject::is_empty")]
    pub details: JsonObject,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FfiEventDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub params: Vec<FfiParam>,
    #[serde(default, skip_serializing_if = "JsonObject::is_empty")]
    pub details: JsonObject,
}

/// An event published as part of an FFI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FfiEvent {
    #[serde(flatten)]
    pub definition: FfiEventDefinition,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ffi {
    pub namespace: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub methods: Vec<FfiMethod>,
    #[serde(default)]
    pub events: Vec<FfiEvent>,
}

/// Request to derive an FFI from a connector-native interface description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FfiGenerationRequest {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Connector-specific input, e.g. `{"abi": [...]}`.
    #[serde(default)]
    pub input: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerOptions {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub first_event: String,
}

/// A custom contract listener.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractListener {
    pub id: Uuid,
    /// Subscription id assigned by the connector.
    #[serde(default)]
    pub backend_id: String,
    /// Connector-specific contract location.
    #[serde(default)]
    pub location: Value,
    pub event: FfiEventDefinition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ListenerOptions>,
}

impl ContractListener {
    /// Requested first event, falling back to `default` when unset.
    pub fn first_event_or<'a>(&'a self, default: &'a str) -> &'a str {
        match &self.options {
            Some(o) if !o.first_event.is_empty() => &o.first_event,
            _ => default,
        }
    }
}

/// Listener creation input. Connectors fill `listener.backend_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractListenerInput {
    #[serde(flatten)]
    pub listener: ContractListener,
}

/// Connector-specific validation of FFI parameter schemas.
pub trait FfiParamValidator: Send + Sync {
    /// Name of the schema extension keyword this validator owns.
    fn extension_name(&self) -> &str;

    fn validate_param(&self, param: &FfiParam) -> Result<(), PluginError>;
}
