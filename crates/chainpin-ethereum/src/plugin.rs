//! The ethconnect implementation of [`Plugin`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use chainpin_core::ffi::{
    ContractListener, ContractListenerInput, Ffi, FfiEventDefinition, FfiGenerationRequest,
    FfiMethod, FfiParamValidator, FIRST_EVENT_NEWEST, FIRST_EVENT_OLDEST,
};
use chainpin_core::{
    json_str, merge_options, BatchPin, Bytes32, CallbackRegistry, Callbacks, Capabilities,
    ContractBinding, ContractState, Event, FireFlyContracts, JsonObject, Metrics, NetworkAction,
    Plugin, PluginError, VerifierType, ZERO_HASH_HEX,
};
use chainpin_http::{rest_error, HttpRestClient, Method, RestClient, RestRequest, RestResponse};
use chainpin_ws::{listen_handshake, spawn_event_loop, LoopHandle, WsClient, WsConnection};

use crate::abi::{self, AbiEntry, EthereumFfiParamValidator};
use crate::address::validate_eth_address;
use crate::config::{EthereumConfig, ETHCONNECT_SECTION, FIREFLY_CONTRACT_SECTION};
use crate::events::EthereumEvents;
use crate::streams::StreamManager;

/// Error code ethconnect returns when the contract has no `networkVersion()`.
const NETWORK_VERSION_NOT_FOUND: &str = "FFEC100148";

#[derive(Debug, Deserialize)]
struct Location {
    #[serde(default)]
    address: String,
}

fn parse_contract_location(location: &Value) -> Result<String, PluginError> {
    let location: Location = serde_json::from_value(location.clone())
        .map_err(|e| PluginError::InvalidLocation(e.to_string()))?;
    if location.address.is_empty() {
        return Err(PluginError::InvalidLocation("'address' not set".into()));
    }
    Ok(location.address)
}

fn into_object(value: Value) -> JsonObject {
    match value {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    }
}

fn not_initialized() -> PluginError {
    PluginError::Other("ethereum plugin is not initialized".into())
}

/// Ethereum connector over ethconnect.
pub struct EthereumPlugin {
    config: EthereumConfig,
    metrics: Arc<dyn Metrics>,
    rest: Option<Arc<dyn RestClient>>,
    ws: Option<Arc<dyn WsConnection>>,
    streams: Option<StreamManager>,
    stream_id: String,
    state: Arc<ContractState>,
    callbacks: CallbackRegistry,
    capabilities: Capabilities,
    event_loop: Option<LoopHandle>,
}

impl EthereumPlugin {
    /// A plugin whose `init` builds the REST and websocket clients from config.
    pub fn new(metrics: Arc<dyn Metrics>) -> Self {
        Self {
            config: EthereumConfig::default(),
            metrics,
            rest: None,
            ws: None,
            streams: None,
            stream_id: String::new(),
            state: Arc::new(ContractState::new()),
            callbacks: CallbackRegistry::new(),
            capabilities: Capabilities::default(),
            event_loop: None,
        }
    }

    /// A plugin that uses the given transports instead of building its own.
    pub fn with_transports(
        rest: Arc<dyn RestClient>,
        ws: Arc<dyn WsConnection>,
        metrics: Arc<dyn Metrics>,
    ) -> Self {
        Self {
            rest: Some(rest),
            ws: Some(ws),
            ..Self::new(metrics)
        }
    }

    /// Event stream id from `init`.
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    fn rest(&self) -> Result<&Arc<dyn RestClient>, PluginError> {
        self.rest.as_ref().ok_or_else(not_initialized)
    }

    fn streams(&self) -> Result<&StreamManager, PluginError> {
        self.streams.as_ref().ok_or_else(not_initialized)
    }

    /// Address and starting block of the deployment at `index`.
    async fn resolve_firefly_contract(&self, index: usize) -> Result<(String, String), PluginError> {
        let deployments = &self.config.firefly_contract;
        let (mut address, from_block) = if !deployments.is_empty() || index > 0 {
            let entry = deployments.get(index).ok_or_else(|| {
                PluginError::InvalidContractIndex(format!("{FIREFLY_CONTRACT_SECTION}[{index}]"))
            })?;
            if entry.address.is_empty() {
                return Err(PluginError::missing_config("address", FIREFLY_CONTRACT_SECTION));
            }
            (entry.address.clone(), entry.from_block.clone())
        } else {
            let instance = &self.config.ethconnect.instance;
            if instance.is_empty() {
                return Err(PluginError::missing_config("instance", ETHCONNECT_SECTION));
            }
            tracing::warn!(
                "{ETHCONNECT_SECTION}.instance is deprecated, use {FIREFLY_CONTRACT_SECTION} instead"
            );
            (instance.clone(), FIRST_EVENT_OLDEST.to_string())
        };

        if address.to_ascii_lowercase().starts_with("/contracts/") {
            address = self.get_contract_address(&address).await?;
        } else if let Some(stripped) = address.strip_prefix("/instances/") {
            address = stripped.to_string();
        }
        Ok((validate_eth_address(&address)?, from_block))
    }

    /// Resolves a named ethconnect contract path to its address.
    async fn get_contract_address(&self, path: &str) -> Result<String, PluginError> {
        #[derive(Deserialize)]
        struct ContractAddress {
            #[serde(default)]
            address: String,
        }
        let body = self.rest()?.get_json(path).await?;
        let resolved: ContractAddress = serde_json::from_value(body)?;
        Ok(resolved.address)
    }

    async fn query_network_version(&self, address: &str) -> Result<u32, PluginError> {
        #[derive(Deserialize)]
        struct QueryOutput {
            output: Value,
        }

        let method = abi::network_version_method();
        let resp = match self
            .query_contract_method(address, &method, Vec::new(), &JsonObject::new())
            .await
        {
            Ok(resp) if resp.is_success() => resp,
            Ok(resp) if resp.body.contains(NETWORK_VERSION_NOT_FOUND) => return Ok(1),
            Ok(resp) => return Err(rest_error(resp.status, &resp.body)),
            Err(e) if e.to_string().contains(NETWORK_VERSION_NOT_FOUND) => return Ok(1),
            Err(e) => return Err(e),
        };

        let parsed: QueryOutput = serde_json::from_str(&resp.body)?;
        let version = match &parsed.output {
            Value::String(s) => s.parse::<u32>().ok(),
            Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
            _ => None,
        };
        version.ok_or_else(|| {
            PluginError::Other(format!("invalid network version output: {}", parsed.output))
        })
    }

    async fn query_contract_method(
        &self,
        address: &str,
        method: &AbiEntry,
        params: Vec<Value>,
        options: &JsonObject,
    ) -> Result<RestResponse, PluginError> {
        if self.metrics.is_enabled() {
            self.metrics.blockchain_query(address, &method.name);
        }
        let body = merge_options(
            into_object(json!({
                "headers": { "type": "Query" },
                "to": address,
                "method": method,
                "params": params,
            })),
            options,
        )?;
        self.rest()?
            .execute(RestRequest::new(Method::Post, "/").json(Value::Object(body)))
            .await
    }

    async fn invoke_contract_method(
        &self,
        address: &str,
        signing_key: &str,
        method: &AbiEntry,
        request_id: &str,
        params: Vec<Value>,
        options: &JsonObject,
    ) -> Result<(), PluginError> {
        if self.metrics.is_enabled() {
            self.metrics.blockchain_transaction(address, &method.name);
        }
        let body = merge_options(
            into_object(json!({
                "headers": { "id": request_id, "type": "SendTransaction" },
                "from": signing_key,
                "to": address,
                "method": method,
                "params": params,
            })),
            options,
        )?;
        self.rest()?
            .execute(RestRequest::new(Method::Post, "/").json(Value::Object(body)))
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Plugin for EthereumPlugin {
    type Config = EthereumConfig;

    fn name(&self) -> &'static str {
        "ethereum"
    }

    async fn init(&mut self, config: EthereumConfig) -> Result<(), PluginError> {
        let conf = &config.ethconnect;
        if conf.url.is_empty() {
            return Err(PluginError::missing_config("url", ETHCONNECT_SECTION));
        }
        if conf.topic.is_empty() {
            return Err(PluginError::missing_config("topic", ETHCONNECT_SECTION));
        }

        let rest = match &self.rest {
            Some(rest) => rest.clone(),
            None => Arc::new(HttpRestClient::new(&conf.url, &conf.http)?),
        };
        let ws = match &self.ws {
            Some(ws) => ws.clone(),
            None => Arc::new(WsClient::new(
                &conf.url,
                conf.ws.clone(),
                listen_handshake(&conf.topic),
            )?),
        };

        let streams = StreamManager::new(rest.clone(), conf.batch_size, conf.batch_timeout_ms);
        let stream = streams.ensure_event_stream(&conf.topic).await?;
        tracing::info!(id = %stream.id, topic = %conf.topic, "event stream ready");

        self.rest = Some(rest);
        self.ws = Some(ws);
        self.streams = Some(streams);
        self.stream_id = stream.id;
        self.config = config;
        Ok(())
    }

    fn register_listener(&mut self, listener: Arc<dyn Callbacks>) {
        self.callbacks.register(listener);
    }

    async fn configure_contract(&self, contracts: &mut FireFlyContracts) -> Result<(), PluginError> {
        tracing::info!(index = contracts.active.index, "resolving FireFly contract");
        let (address, from_block) = self.resolve_firefly_contract(contracts.active.index).await?;
        let sub = self
            .streams()?
            .ensure_firefly_subscription(&address, &from_block, &self.stream_id, &abi::batch_pin_event())
            .await?;
        let network_version = self.query_network_version(&address).await?;

        self.state.replace(ContractBinding {
            location: address.clone(),
            from_block: from_block.clone(),
            network_version,
            subscription: sub.id.clone(),
        });
        contracts.active.info = into_object(json!({
            "address": address,
            "fromBlock": from_block,
            "subscription": sub.id,
        }));
        Ok(())
    }

    async fn terminate_contract(
        &self,
        contracts: &mut FireFlyContracts,
        termination: &Event,
    ) -> Result<(), PluginError> {
        let address = validate_eth_address(json_str(&termination.info, "address"))?;
        let active = self.state.snapshot().location;
        if address != active {
            tracing::warn!(
                address = %address,
                active = %active,
                "ignoring termination request from an address that is not the active contract"
            );
            return Ok(());
        }
        tracing::info!(address = %address, "processing termination request");
        contracts.roll_forward(&termination.protocol_id);
        self.configure_contract(contracts).await
    }

    async fn start(&mut self) -> Result<(), PluginError> {
        let ws = self.ws.clone().ok_or_else(not_initialized)?;
        ws.connect().await?;
        let handler = EthereumEvents::new(
            self.name(),
            Arc::new(self.callbacks.clone()),
            self.state.clone(),
        );
        let topic = self.config.ethconnect.topic.clone();
        self.event_loop = Some(spawn_event_loop(ws, Arc::new(handler), topic)?);
        Ok(())
    }

    fn shutdown(&self) {
        if let Some(event_loop) = &self.event_loop {
            event_loop.shutdown();
        }
    }

    async fn wait_closed(&self) {
        if let Some(event_loop) = &self.event_loop {
            event_loop.wait_closed().await;
        }
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn verifier_type(&self) -> VerifierType {
        VerifierType::EthAddress
    }

    async fn normalize_signing_key(&self, key: &str) -> Result<String, PluginError> {
        validate_eth_address(key)
    }

    async fn submit_batch_pin(
        &self,
        op_id: &str,
        signing_key: &str,
        batch: &BatchPin,
    ) -> Result<(), PluginError> {
        let uuids = Bytes32::from_uuid_pair(&batch.transaction_id, &batch.batch_id);
        let contexts: Vec<String> = batch.contexts.iter().map(Bytes32::to_hex0x).collect();
        let params = vec![
            json!(batch.namespace),
            json!(uuids.to_hex0x()),
            json!(batch.batch_hash.to_hex0x()),
            json!(batch.batch_payload_ref),
            json!(contexts),
        ];
        let address = self.state.snapshot().location;
        self.invoke_contract_method(
            &address,
            signing_key,
            &abi::pin_batch_method(),
            op_id,
            params,
            &JsonObject::new(),
        )
        .await
    }

    async fn submit_network_action(
        &self,
        op_id: &str,
        signing_key: &str,
        action: NetworkAction,
    ) -> Result<(), PluginError> {
        let params = vec![
            json!(action.to_namespace()),
            json!(ZERO_HASH_HEX),
            json!(ZERO_HASH_HEX),
            json!(""),
            json!([]),
        ];
        let address = self.state.snapshot().location;
        self.invoke_contract_method(
            &address,
            signing_key,
            &abi::pin_batch_method(),
            op_id,
            params,
            &JsonObject::new(),
        )
        .await
    }

    async fn invoke_contract(
        &self,
        op_id: &str,
        signing_key: &str,
        location: &Value,
        method: &FfiMethod,
        input: &JsonObject,
        options: &JsonObject,
    ) -> Result<(), PluginError> {
        let address = parse_contract_location(location)?;
        let abi = abi::ffi_method_to_abi(method)?;
        let params = ordered_input(method, input);
        self.invoke_contract_method(&address, signing_key, &abi, op_id, params, options)
            .await
    }

    async fn query_contract(
        &self,
        location: &Value,
        method: &FfiMethod,
        input: &JsonObject,
        options: &JsonObject,
    ) -> Result<Value, PluginError> {
        let address = parse_contract_location(location)?;
        let abi = abi::ffi_method_to_abi(method)?;
        let params = ordered_input(method, input);
        self.query_contract_method(&address, &abi, params, options)
            .await?
            .error_for_status()?
            .json()
    }

    async fn add_contract_listener(
        &self,
        input: &mut ContractListenerInput,
    ) -> Result<(), PluginError> {
        let listener = &mut input.listener;
        let address = parse_contract_location(&listener.location)?;
        let event = abi::ffi_event_to_abi(&listener.event)?;
        let name = format!("ff-sub-{}", listener.id);
        let first_event = listener.first_event_or(FIRST_EVENT_NEWEST).to_string();
        let sub = self
            .streams()?
            .create_subscription(&address, &self.stream_id, &name, &first_event, &event)
            .await?;
        listener.backend_id = sub.id;
        Ok(())
    }

    async fn delete_contract_listener(&self, listener: &ContractListener) -> Result<(), PluginError> {
        self.streams()?
            .delete_subscription(&listener.backend_id)
            .await
    }

    fn ffi_param_validator(&self) -> Option<Arc<dyn FfiParamValidator>> {
        Some(Arc::new(EthereumFfiParamValidator))
    }

    async fn generate_ffi(&self, request: &FfiGenerationRequest) -> Result<Ffi, PluginError> {
        abi::generate_ffi(request)
    }

    async fn normalize_contract_location(&self, location: &Value) -> Result<Value, PluginError> {
        let address = validate_eth_address(&parse_contract_location(location)?)?;
        Ok(json!({ "address": address }))
    }

    fn generate_event_signature(&self, event: &FfiEventDefinition) -> String {
        abi::event_signature(event)
    }

    fn network_version(&self) -> u32 {
        self.state.network_version()
    }
}

/// Input values in the order of the method's params. Missing values are `null`.
fn ordered_input(method: &FfiMethod, input: &JsonObject) -> Vec<Value> {
    method
        .params
        .iter()
        .map(|p| input.get(&p.name).cloned().unwrap_or(Value::Null))
        .collect()
}
