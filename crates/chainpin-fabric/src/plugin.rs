//! The fabconnect implementation of [`Plugin`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use chainpin_core::ffi::{
    ContractListener, ContractListenerInput, Ffi, FfiEventDefinition, FfiGenerationRequest,
    FfiMethod, FfiParamValidator, FIRST_EVENT_NEWEST, FIRST_EVENT_OLDEST,
};
use chainpin_core::{
    format_hex0x, json_str, merge_options, BatchPin, CallbackRegistry, Callbacks, Capabilities,
    ContractBinding, ContractState, Event, FireFlyContracts, JsonObject, Metrics, NetworkAction,
    Plugin, PluginError, VerifierType,
};
use chainpin_http::{HttpRestClient, Method, RestClient, RestRequest};
use chainpin_ws::{listen_handshake, spawn_event_loop, LoopHandle, WsClient, WsConnection};

use crate::config::{FabricConfig, FABCONNECT_SECTION, FIREFLY_CONTRACT_SECTION};
use crate::events::{FabricEvents, BATCH_PIN_EVENT};
use crate::identity::{user_name, IdentityResolver};
use crate::streams::StreamManager;

const PIN_BATCH_FUNCTION: &str = "PinBatch";
const NETWORK_VERSION_FUNCTION: &str = "NetworkVersion";
const BATCH_PIN_ARGS: [&str; 5] = ["namespace", "uuids", "batchHash", "payloadRef", "contexts"];

/// Chaincode location on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub chaincode: String,
}

fn parse_contract_location(location: &Value) -> Result<Location, PluginError> {
    let parsed: Location = serde_json::from_value(location.clone())
        .map_err(|e| PluginError::InvalidLocation(e.to_string()))?;
    if parsed.channel.is_empty() {
        return Err(PluginError::InvalidLocation("'channel' not set".into()));
    }
    if parsed.chaincode.is_empty() {
        return Err(PluginError::InvalidLocation("'chaincode' not set".into()));
    }
    Ok(parsed)
}

/// One positional chaincode argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct PrefixItem {
    name: String,
    #[serde(rename = "type")]
    item_type: String,
}

impl PrefixItem {
    fn string(name: &str) -> Self {
        Self {
            name: name.to_string(),
            item_type: "string".into(),
        }
    }
}

/// Chaincode arguments travel as strings; anything else is JSON-encoded.
fn encode_args(input: &JsonObject) -> JsonObject {
    input
        .iter()
        .map(|(key, value)| {
            let encoded = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), Value::String(encoded))
        })
        .collect()
}

struct ChaincodeCall<'a> {
    channel: &'a str,
    chaincode: &'a str,
    function: &'a str,
    signer: &'a str,
    request_id: &'a str,
    prefix_items: Vec<PrefixItem>,
}

impl ChaincodeCall<'_> {
    fn body(&self, input: &JsonObject, options: &JsonObject) -> Result<Value, PluginError> {
        let mut headers = JsonObject::new();
        if !self.request_id.is_empty() {
            headers.insert("id".into(), json!(self.request_id));
        }
        headers.insert(
            "payloadSchema".into(),
            json!({ "type": "array", "prefixItems": self.prefix_items }),
        );
        headers.insert("channel".into(), json!(self.channel));
        headers.insert("chaincode".into(), json!(self.chaincode));
        let signer = user_name(self.signer);
        if !signer.is_empty() {
            headers.insert("signer".into(), json!(signer));
        }

        let mut body = JsonObject::new();
        body.insert("headers".into(), Value::Object(headers));
        body.insert("func".into(), json!(self.function));
        body.insert("args".into(), Value::Object(encode_args(input)));
        Ok(Value::Object(merge_options(body, options)?))
    }
}

#[derive(Deserialize)]
struct QueryOutput {
    #[serde(default)]
    result: Value,
}

fn not_initialized() -> PluginError {
    PluginError::Other("fabric plugin is not initialized".into())
}

/// Fabric connector over fabconnect.
pub struct FabricPlugin {
    config: FabricConfig,
    metrics: Arc<dyn Metrics>,
    rest: Option<Arc<dyn RestClient>>,
    ws: Option<Arc<dyn WsConnection>>,
    streams: Option<StreamManager>,
    identities: Option<IdentityResolver>,
    stream_id: String,
    state: Arc<ContractState>,
    callbacks: CallbackRegistry,
    capabilities: Capabilities,
    event_loop: Option<LoopHandle>,
}

impl FabricPlugin {
    pub fn new(metrics: Arc<dyn Metrics>) -> Self {
        Self {
            config: FabricConfig::default(),
            metrics,
            rest: None,
            ws: None,
            streams: None,
            identities: None,
            stream_id: String::new(),
            state: Arc::new(ContractState::new()),
            callbacks: CallbackRegistry::new(),
            capabilities: Capabilities::default(),
            event_loop: None,
        }
    }

    /// Uses the given transports instead of building them in `init`.
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

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    fn rest(&self) -> Result<&Arc<dyn RestClient>, PluginError> {
        self.rest.as_ref().ok_or_else(not_initialized)
    }

    fn streams(&self) -> Result<&StreamManager, PluginError> {
        self.streams.as_ref().ok_or_else(not_initialized)
    }

    fn resolve_firefly_contract(&self, index: usize) -> Result<(String, String), PluginError> {
        let deployments = &self.config.firefly_contract;
        if !deployments.is_empty() || index > 0 {
            let entry = deployments.get(index).ok_or_else(|| {
                PluginError::InvalidContractIndex(format!("{FIREFLY_CONTRACT_SECTION}[{index}]"))
            })?;
            if entry.chaincode.is_empty() {
                return Err(PluginError::missing_config("chaincode", FIREFLY_CONTRACT_SECTION));
            }
            return Ok((entry.chaincode.clone(), entry.from_block.clone()));
        }

        let chaincode = &self.config.fabconnect.chaincode;
        if chaincode.is_empty() {
            return Err(PluginError::missing_config("chaincode", FABCONNECT_SECTION));
        }
        tracing::warn!(
            "{FABCONNECT_SECTION}.chaincode is deprecated, use {FIREFLY_CONTRACT_SECTION} instead"
        );
        Ok((chaincode.clone(), FIRST_EVENT_OLDEST.to_string()))
    }

    async fn invoke_chaincode(
        &self,
        call: ChaincodeCall<'_>,
        input: &JsonObject,
        options: &JsonObject,
    ) -> Result<(), PluginError> {
        if self.metrics.is_enabled() {
            self.metrics.blockchain_transaction(call.chaincode, call.function);
        }
        let body = call.body(input, options)?;
        self.rest()?
            .execute(
                RestRequest::new(Method::Post, "/transactions")
                    .header("x-firefly-sync", "false")
                    .json(body),
            )
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn query_chaincode(
        &self,
        call: ChaincodeCall<'_>,
        input: &JsonObject,
        options: &JsonObject,
    ) -> Result<Value, PluginError> {
        if self.metrics.is_enabled() {
            self.metrics.blockchain_query(call.chaincode, call.function);
        }
        let body = call.body(input, options)?;
        let resp = self
            .rest()?
            .execute(RestRequest::new(Method::Post, "/query").json(body))
            .await?
            .error_for_status()?;
        let output: QueryOutput = serde_json::from_str(&resp.body)?;
        Ok(output.result)
    }

    async fn query_network_version(&self, chaincode: &str) -> Result<u32, PluginError> {
        let call = ChaincodeCall {
            channel: &self.config.fabconnect.channel,
            chaincode,
            function: NETWORK_VERSION_FUNCTION,
            signer: &self.config.fabconnect.signer,
            request_id: "",
            prefix_items: Vec::new(),
        };
        let result = match self
            .query_chaincode(call, &JsonObject::new(), &JsonObject::new())
            .await
        {
            Ok(result) => result,
            Err(e) if e.to_string().contains("Function NetworkVersion not found") => return Ok(1),
            Err(e) => return Err(e),
        };
        result
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| PluginError::Other(format!("invalid network version result: {result}")))
    }

    async fn submit_pin(
        &self,
        op_id: &str,
        signing_key: &str,
        input: JsonObject,
    ) -> Result<(), PluginError> {
        let chaincode = self.state.snapshot().location;
        let call = ChaincodeCall {
            channel: &self.config.fabconnect.channel,
            chaincode: &chaincode,
            function: PIN_BATCH_FUNCTION,
            signer: signing_key,
            request_id: op_id,
            prefix_items: BATCH_PIN_ARGS.iter().map(|n| PrefixItem::string(n)).collect(),
        };
        self.invoke_chaincode(call, &input, &JsonObject::new()).await
    }
}

#[derive(Deserialize)]
struct ParamSchema {
    #[serde(default, rename = "type")]
    param_type: String,
}

#[async_trait]
impl Plugin for FabricPlugin {
    type Config = FabricConfig;

    fn name(&self) -> &'static str {
        "fabric"
    }

    async fn init(&mut self, config: FabricConfig) -> Result<(), PluginError> {
        let conf = &config.fabconnect;
        if conf.url.is_empty() {
            return Err(PluginError::missing_config("url", FABCONNECT_SECTION));
        }
        if conf.topic.is_empty() {
            return Err(PluginError::missing_config("topic", FABCONNECT_SECTION));
        }

        let rest: Arc<dyn RestClient> = match &self.rest {
            Some(rest) => rest.clone(),
            None => Arc::new(HttpRestClient::new(&conf.url, &conf.http)?),
        };
        let ws: Arc<dyn WsConnection> = match &self.ws {
            Some(ws) => ws.clone(),
            None => Arc::new(WsClient::new(
                &conf.url,
                conf.ws.clone(),
                listen_handshake(&conf.topic),
            )?),
        };

        let streams = StreamManager::new(
            rest.clone(),
            &conf.signer,
            conf.batch_size,
            conf.batch_timeout_ms,
        );
        let stream = streams.ensure_event_stream(&conf.topic).await?;
        tracing::info!(id = %stream.id, "event stream");

        self.identities = Some(IdentityResolver::new(rest.clone()));
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
        let (chaincode, from_block) = self.resolve_firefly_contract(contracts.active.index)?;
        let sub = self
            .streams()?
            .ensure_firefly_subscription(
                &self.config.fabconnect.channel,
                &chaincode,
                &from_block,
                &self.stream_id,
                BATCH_PIN_EVENT,
            )
            .await?;
        let network_version = self.query_network_version(&chaincode).await?;

        self.state.replace(ContractBinding {
            location: chaincode.clone(),
            from_block: from_block.clone(),
            network_version,
            subscription: sub.id.clone(),
        });
        let mut info = JsonObject::new();
        info.insert("chaincode".into(), json!(chaincode));
        info.insert("fromBlock".into(), json!(from_block));
        info.insert("subscription".into(), json!(sub.id));
        contracts.active.info = info;
        Ok(())
    }

    async fn terminate_contract(
        &self,
        contracts: &mut FireFlyContracts,
        termination: &Event,
    ) -> Result<(), PluginError> {
        let chaincode = json_str(&termination.info, "chaincodeId");
        let active = self.state.snapshot().location;
        if chaincode != active {
            tracing::warn!(
                chaincode,
                active = %active,
                "ignoring termination request from chaincode that is not active"
            );
            return Ok(());
        }
        tracing::info!(chaincode, "processing termination request");
        contracts.roll_forward(&termination.protocol_id);
        self.configure_contract(contracts).await
    }

    async fn start(&mut self) -> Result<(), PluginError> {
        let ws = self.ws.clone().ok_or_else(not_initialized)?;
        ws.connect().await?;
        let handler = FabricEvents::new(
            self.name(),
            Arc::new(self.callbacks.clone()),
            self.state.clone(),
        );
        let topic = self.config.fabconnect.topic.clone();
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
        VerifierType::MspIdentity
    }

    async fn normalize_signing_key(&self, key: &str) -> Result<String, PluginError> {
        self.identities
            .as_ref()
            .ok_or_else(not_initialized)?
            .resolve(key)
            .await
    }

    async fn submit_batch_pin(
        &self,
        op_id: &str,
        signing_key: &str,
        batch: &BatchPin,
    ) -> Result<(), PluginError> {
        let uuids = chainpin_core::Bytes32::from_uuid_pair(&batch.transaction_id, &batch.batch_id);
        let contexts: Vec<String> = batch.contexts.iter().map(|c| c.to_hex0x()).collect();
        let mut input = JsonObject::new();
        input.insert("namespace".into(), json!(batch.namespace));
        input.insert("uuids".into(), json!(uuids.to_hex0x()));
        input.insert("batchHash".into(), json!(batch.batch_hash.to_hex0x()));
        input.insert("payloadRef".into(), json!(batch.batch_payload_ref));
        input.insert("contexts".into(), json!(contexts));
        self.submit_pin(op_id, signing_key, input).await
    }

    async fn submit_network_action(
        &self,
        op_id: &str,
        signing_key: &str,
        action: NetworkAction,
    ) -> Result<(), PluginError> {
        let mut input = JsonObject::new();
        input.insert("namespace".into(), json!(action.to_namespace()));
        input.insert("uuids".into(), json!(format_hex0x(None)));
        input.insert("batchHash".into(), json!(format_hex0x(None)));
        input.insert("payloadRef".into(), json!(""));
        input.insert("contexts".into(), json!([]));
        self.submit_pin(op_id, signing_key, input).await
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
        let location = parse_contract_location(location)?;
        let prefix_items = method
            .params
            .iter()
            .map(|param| {
                serde_json::from_value::<ParamSchema>(param.schema.clone())
                    .map(|schema| PrefixItem {
                        name: param.name.clone(),
                        item_type: schema.param_type,
                    })
                    .map_err(|e| PluginError::InvalidInput {
                        field: format!("{}.schema", param.name),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, PluginError>>()?;
        let call = ChaincodeCall {
            channel: &location.channel,
            chaincode: &location.chaincode,
            function: &method.name,
            signer: signing_key,
            request_id: op_id,
            prefix_items,
        };
        self.invoke_chaincode(call, input, options).await
    }

    async fn query_contract(
        &self,
        location: &Value,
        method: &FfiMethod,
        input: &JsonObject,
        options: &JsonObject,
    ) -> Result<Value, PluginError> {
        let location = parse_contract_location(location)?;
        let call = ChaincodeCall {
            channel: &location.channel,
            chaincode: &location.chaincode,
            function: &method.name,
            signer: &self.config.fabconnect.signer,
            request_id: "",
            prefix_items: method
                .params
                .iter()
                .map(|p| PrefixItem::string(&p.name))
                .collect(),
        };
        self.query_chaincode(call, input, options).await
    }

    async fn add_contract_listener(
        &self,
        input: &mut ContractListenerInput,
    ) -> Result<(), PluginError> {
        let listener = &mut input.listener;
        let location = parse_contract_location(&listener.location)?;
        let sub = self
            .streams()?
            .create_subscription(
                &location.channel,
                &location.chaincode,
                &self.stream_id,
                &format!("ff-sub-{}", listener.id),
                &listener.event.name,
                listener.first_event_or(FIRST_EVENT_NEWEST),
            )
            .await?;
        listener.backend_id = sub.id;
        Ok(())
    }

    async fn delete_contract_listener(&self, listener: &ContractListener) -> Result<(), PluginError> {
        self.streams()?.delete_subscription(&listener.backend_id).await
    }

    fn ffi_param_validator(&self) -> Option<Arc<dyn FfiParamValidator>> {
        None
    }

    async fn generate_ffi(&self, _request: &FfiGenerationRequest) -> Result<Ffi, PluginError> {
        Err(PluginError::FfiGenerationUnsupported)
    }

    async fn normalize_contract_location(&self, location: &Value) -> Result<Value, PluginError> {
        Ok(serde_json::to_value(parse_contract_location(location)?)?)
    }

    fn generate_event_signature(&self, event: &FfiEventDefinition) -> String {
        event.name.clone()
    }

    fn network_version(&self) -> u32 {
        self.state.network_version()
    }
}
