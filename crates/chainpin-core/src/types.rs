//! Canonical event model shared by every connector.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::PluginError;

/// Reserved namespace prefix marking a network action instead of a data batch.
pub const FIREFLY_ACTION_PREFIX: &str = "firefly:";

/// Zero hash as transmitted on the wire.
pub const ZERO_HASH_HEX: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000000";

/// JSON object used for event output/info blobs.
pub type JsonObject = Map<String, Value>;

/// String field of a connector message, `""` when absent or not a string.
pub fn json_str<'a>(obj: &'a JsonObject, key: &str) -> &'a str {
    obj.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Unsigned field sent as a JSON number, a decimal string or a `0x` hex string.
///
/// Absent or unparsable values read as 0.
pub fn json_u64(obj: &JsonObject, key: &str) -> u64 {
    let parsed = match obj.get(key) {
        None | Some(Value::Null) => return 0,
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => s.parse().ok(),
        },
        Some(_) => None,
    };
    parsed.unwrap_or_else(|| {
        tracing::warn!(field = key, value = ?obj.get(key), "cannot parse integer field");
        0
    })
}

/// Adds custom options to a request body. Replacing an existing field is an error.
pub fn merge_options(mut body: JsonObject, options: &JsonObject) -> Result<JsonObject, PluginError> {
    for (key, value) in options {
        if body.contains_key(key) {
            return Err(PluginError::OptionOverride(key.clone()));
        }
        body.insert(key.clone(), value.clone());
    }
    Ok(body)
}

// ─── Bytes32 ──────────────────────────────────────────────────────────────────

/// A 32-byte hash (batch hash, context hash, packed UUID pair).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Bytes32(pub [u8; 32]);

/// Error parsing a [`Bytes32`] from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid 32-byte hex value '{0}'")]
pub struct Bytes32ParseError(pub String);

impl Bytes32 {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// `0x`-prefixed lowercase hex, always 64 hex characters.
    pub fn to_hex0x(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Packs two UUIDs into one value: bytes 0..16 first, 16..32 second.
    pub fn from_uuid_pair(first: &Uuid, second: &Uuid) -> Self {
        let mut out = [0u8; 32];
        out[..16].copy_from_slice(first.as_bytes());
        out[16..].copy_from_slice(second.as_bytes());
        Self(out)
    }

    /// Splits a packed value back into `(first, second)`.
    pub fn to_uuid_pair(&self) -> (Uuid, Uuid) {
        let mut first = [0u8; 16];
        let mut second = [0u8; 16];
        first.copy_from_slice(&self.0[..16]);
        second.copy_from_slice(&self.0[16..]);
        (Uuid::from_bytes(first), Uuid::from_bytes(second))
    }
}

/// Formats an optional hash, writing all zeros for `None`.
pub fn format_hex0x(hash: Option<&Bytes32>) -> String {
    match hash {
        Some(h) => h.to_hex0x(),
        None => ZERO_HASH_HEX.to_string(),
    }
}

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

impl FromStr for Bytes32 {
    type Err = Bytes32ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = strip_hex_prefix(s);
        if raw.len() != 64 {
            return Err(Bytes32ParseError(s.to_string()));
        }
        let decoded = hex::decode(raw).map_err(|_| Bytes32ParseError(s.to_string()))?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&decoded);
        Ok(Self(out))
    }
}

impl fmt::Display for Bytes32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Bytes32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bytes32({self})")
    }
}

impl Serialize for Bytes32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Bytes32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ─── Protocol IDs and timestamps ──────────────────────────────────────────────

/// Builds the lexicographically sortable `block/txIndex/logIndex` identifier.
pub fn protocol_id(block_number: u64, transaction_index: u64, log_index: u64) -> String {
    format!("{block_number:012}/{transaction_index:06}/{log_index:06}")
}

/// Converts a unix timestamp in seconds, millis, micros or nanos to UTC.
pub fn unix_time(value: i64) -> DateTime<Utc> {
    let nanos = if value < 10_000_000_000 {
        value.saturating_mul(1_000_000_000)
    } else if value < 10_000_000_000_000 {
        value.saturating_mul(1_000_000)
    } else if value < 10_000_000_000_000_000 {
        value.saturating_mul(1_000)
    } else {
        value
    };
    Utc.timestamp_nanos(nanos)
}

// ─── Verifiers and statuses ───────────────────────────────────────────────────

/// Kind of signing identity a connector attributes events to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerifierType {
    #[serde(rename = "ethereum_address")]
    EthAddress,
    #[serde(rename = "fabric_msp_id")]
    MspIdentity,
}

impl fmt::Display for VerifierType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EthAddress => write!(f, "ethereum_address"),
            Self::MspIdentity => write!(f, "fabric_msp_id"),
        }
    }
}

/// A chain-specific signer reference attached to inbound events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierRef {
    #[serde(rename = "type")]
    pub verifier_type: VerifierType,
    pub value: String,
}

impl VerifierRef {
    pub fn new(verifier_type: VerifierType, value: impl Into<String>) -> Self {
        Self {
            verifier_type,
            value: value.into(),
        }
    }
}

/// Outcome of a submitted transaction as reported by a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Succeeded,
    Failed,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Operator actions carried on the BatchPin channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkAction {
    Terminate,
}

impl NetworkAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Terminate => "terminate",
        }
    }

    /// The namespace string written on chain, e.g. `firefly:terminate`.
    pub fn to_namespace(&self) -> String {
        format!("{FIREFLY_ACTION_PREFIX}{}", self.as_str())
    }
}

/// Feature set supported by a connector. Nothing is optional today.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct Capabilities {}

// ─── Events ───────────────────────────────────────────────────────────────────

/// A normalized ledger occurrence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Name of the connector that produced the event.
    pub source: String,
    /// Short event name, e.g. `BatchPin`.
    pub name: String,
    /// Sortable `block/txIndex/logIndex` identifier.
    #[serde(rename = "protocolId")]
    pub protocol_id: String,
    /// Raw decoded event output.
    pub output: JsonObject,
    /// Chain metadata (tx hash, block number, subscription, ...).
    pub info: JsonObject,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "blockchainTxId")]
    pub blockchain_tx_id: String,
    /// Location of the emitting contract.
    pub location: String,
    /// Canonical event signature.
    pub signature: String,
}

/// Sequencing record for one batch of off-chain data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPin {
    pub namespace: String,
    pub transaction_id: Uuid,
    pub batch_id: Uuid,
    pub batch_hash: Bytes32,
    /// Storage pointer for broadcast payloads; empty for private batches.
    pub batch_payload_ref: String,
    /// One hash per context, in emission order.
    pub contexts: Vec<Bytes32>,
    pub event: Event,
}

/// A contract event plus the connector subscription that delivered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventWithSubscription {
    pub event: Event,
    pub subscription: String,
}
