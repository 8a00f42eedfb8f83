//! chainpin-core — event model and plugin contract for ChainPin connectors.
//!
//! # Overview
//!
//! ChainPin normalizes Ethereum-style and Fabric-style ledgers into one
//! event and transaction model. The core crate defines:
//!
//! - [`Plugin`]: the async trait every connector implements
//! - [`Callbacks`] / [`CallbackRegistry`]: ordered delivery to the host
//! - [`Event`] / [`BatchPin`] / [`EventWithSubscription`]: the canonical events
//! - [`FireFlyContracts`] / [`ContractState`]: contract lifecycle records
//! - [`PluginError`]: structured error type
//! - [`ffi`] module: FireFly Interface model and contract listeners
//! - [`metrics`] module: submission metrics hook

pub mod callbacks;
pub mod contracts;
pub mod error;
pub mod ffi;
pub mod metrics;
pub mod plugin;
pub mod types;

#[cfg(any(test, feature = "mock"))]
pub mod testing;

pub use callbacks::CallbackRegistry;
pub use contracts::{ContractBinding, ContractInfo, ContractState, FireFlyContracts};
pub use error::PluginError;
pub use metrics::{Metrics, NoopMetrics};
pub use plugin::{Callbacks, Plugin};
pub use types::{
    format_hex0x, json_str, json_u64, merge_options, protocol_id, unix_time, BatchPin, Bytes32,
    Capabilities, Event, EventWithSubscription, JsonObject, NetworkAction, TransactionStatus,
    VerifierRef, VerifierType, FIREFLY_ACTION_PREFIX, ZERO_HASH_HEX,
};
