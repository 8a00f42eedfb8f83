//! The connector contract and the host callbacks it drives.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::contracts::FireFlyContracts;
use crate::error::PluginError;
use crate::ffi::{
    ContractListener, ContractListenerInput, Ffi, FfiEventDefinition, FfiGenerationRequest,
    FfiMethod, FfiParamValidator,
};
use crate::types::{
    BatchPin, Capabilities, Event, EventWithSubscription, JsonObject, NetworkAction,
    TransactionStatus, VerifierRef, VerifierType,
};

/// Host-side receiver of normalized events.
///
/// Events are delivered one at a time: a callback completes before the next
/// one is invoked. An `Err` from any delivery method stops the connector's
/// event loop without acknowledging the batch.
#[async_trait]
pub trait Callbacks: Send + Sync {
    /// Status update for an operation submitted through this connector.
    async fn blockchain_op_update(
        &self,
        plugin: &str,
        op_id: &str,
        status: TransactionStatus,
        blockchain_tx_id: &str,
        error_message: &str,
        output: &JsonObject,
    );

    async fn batch_pin_complete(
        &self,
        batch: &BatchPin,
        signing_key: &VerifierRef,
    ) -> Result<(), PluginError>;

    /// `action` has the `firefly:` prefix already stripped.
    async fn blockchain_network_action(
        &self,
        action: &str,
        event: &Event,
        signing_key: &VerifierRef,
    ) -> Result<(), PluginError>;

    async fn blockchain_event(&self, event: &EventWithSubscription) -> Result<(), PluginError>;
}

/// A blockchain connector.
///
/// Lifecycle: `init` → `register_listener`* → `configure_contract` → `start`
/// → ... → `shutdown` → `wait_closed`.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Connector configuration section.
    type Config: DeserializeOwned + Send;

    fn name(&self) -> &'static str;

    /// Validates configuration and prepares the connector's event stream.
    async fn init(&mut self, config: Self::Config) -> Result<(), PluginError>;

    /// Adds a listener. Listeners registered after `start` are not notified.
    fn register_listener(&mut self, listener: Arc<dyn Callbacks>);

    /// Binds the connector to `contracts.active` and updates its `info`.
    async fn configure_contract(&self, contracts: &mut FireFlyContracts)
        -> Result<(), PluginError>;

    /// Retires the active contract if `termination` came from it.
    async fn terminate_contract(
        &self,
        contracts: &mut FireFlyContracts,
        termination: &Event,
    ) -> Result<(), PluginError>;

    /// Spawns the event loop. No events are delivered before this.
    async fn start(&mut self) -> Result<(), PluginError>;

    /// Signals the event loop to stop. Returns immediately.
    fn shutdown(&self);

    /// Resolves once the event loop has exited and the transport is closed.
    async fn wait_closed(&self);

    fn capabilities(&self) -> &Capabilities;

    fn verifier_type(&self) -> VerifierType;

    async fn normalize_signing_key(&self, key: &str) -> Result<String, PluginError>;

    async fn submit_batch_pin(
        &self,
        op_id: &str,
        signing_key: &str,
        batch: &BatchPin,
    ) -> Result<(), PluginError>;

    async fn submit_network_action(
        &self,
        op_id: &str,
        signing_key: &str,
        action: NetworkAction,
    ) -> Result<(), PluginError>;

    #[allow(clippy::too_many_arguments)]
    async fn invoke_contract(
        &self,
        op_id: &str,
        signing_key: &str,
        location: &Value,
        method: &FfiMethod,
        input: &JsonObject,
        options: &JsonObject,
    ) -> Result<(), PluginError>;

    async fn query_contract(
        &self,
        location: &Value,
        method: &FfiMethod,
        input: &JsonObject,
        options: &JsonObject,
    ) -> Result<Value, PluginError>;

    /// Creates the connector subscription and fills `listener.backend_id`.
    async fn add_contract_listener(
        &self,
        listener: &mut ContractListenerInput,
    ) -> Result<(), PluginError>;

    async fn delete_contract_listener(&self, listener: &ContractListener)
        -> Result<(), PluginError>;

    fn ffi_param_validator(&self) -> Option<Arc<dyn FfiParamValidator>>;

    async fn generate_ffi(&self, request: &FfiGenerationRequest) -> Result<Ffi, PluginError>;

    async fn normalize_contract_location(&self, location: &Value) -> Result<Value, PluginError>;

    fn generate_event_signature(&self, event: &FfiEventDefinition) -> String;

    /// Network rules version of the active contract.
    fn network_version(&self) -> u32;
}
