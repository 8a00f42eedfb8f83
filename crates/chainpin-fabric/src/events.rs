//! Decoding of fabconnect chaincode events and transaction receipts.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::Value;

use chainpin_core::{
    json_str, json_u64, protocol_id, unix_time, BatchPin, Bytes32, CallbackRegistry,
    ContractState, Event, EventWithSubscription, JsonObject, PluginError, TransactionStatus,
    VerifierRef, VerifierType, FIREFLY_ACTION_PREFIX,
};
use chainpin_ws::FrameHandler;

pub const BATCH_PIN_EVENT: &str = "BatchPin";

/// Decodes a base64 payload holding a JSON object.
fn decode_payload(encoded: &str) -> Option<JsonObject> {
    let bytes = match BASE64.decode(encoded) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, payload = encoded, "BatchPin event is not valid - bad payload content");
            return None;
        }
    };
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(payload)) => Some(payload),
        _ => {
            tracing::error!(
                payload = %String::from_utf8_lossy(&bytes),
                "BatchPin event is not valid - bad JSON payload"
            );
            None
        }
    }
}

/// Frame handler for the fabconnect event stream.
pub struct FabricEvents {
    plugin_name: &'static str,
    callbacks: Arc<CallbackRegistry>,
    state: Arc<ContractState>,
}

impl FabricEvents {
    pub fn new(
        plugin_name: &'static str,
        callbacks: Arc<CallbackRegistry>,
        state: Arc<ContractState>,
    ) -> Self {
        Self {
            plugin_name,
            callbacks,
            state,
        }
    }

    fn parse_event(&self, mut msg: JsonObject) -> Option<Event> {
        let payload = decode_payload(json_str(&msg, "payload"))?;
        msg.remove("payload");
        let name = json_str(&msg, "eventName").to_string();
        Some(Event {
            source: self.plugin_name.to_string(),
            name: name.clone(),
            protocol_id: protocol_id(
                json_u64(&msg, "blockNumber"),
                json_u64(&msg, "transactionIndex"),
                json_u64(&msg, "eventIndex"),
            ),
            output: payload,
            timestamp: Some(unix_time(
                i64::try_from(json_u64(&msg, "timestamp")).unwrap_or(i64::MAX),
            )),
            blockchain_tx_id: json_str(&msg, "transactionId").to_string(),
            location: format!("chaincode={}", json_str(&msg, "chaincodeId")),
            signature: name,
            info: msg,
        })
    }

    async fn handle_batch_pin_event(&self, msg: JsonObject) -> Result<(), PluginError> {
        let Some(event) = self.parse_event(msg) else {
            return Ok(());
        };
        let payload = &event.output;
        let verifier = VerifierRef::new(VerifierType::MspIdentity, json_str(payload, "signer"));

        let namespace = json_str(payload, "namespace");
        if let Some(action) = namespace.strip_prefix(FIREFLY_ACTION_PREFIX) {
            return self.callbacks.network_action(action, &event, &verifier).await;
        }

        let uuids = json_str(payload, "uuids");
        let Ok(uuids) = uuids.parse::<Bytes32>() else {
            tracing::error!(uuids, "BatchPin event is not valid - bad uuids");
            return Ok(());
        };
        let batch_hash = json_str(payload, "batchHash");
        let Ok(batch_hash) = batch_hash.parse::<Bytes32>() else {
            tracing::error!(batch_hash, "BatchPin event is not valid - bad batchHash");
            return Ok(());
        };

        let raw_contexts = payload
            .get("contexts")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let mut contexts = Vec::with_capacity(raw_contexts.len());
        for (i, raw) in raw_contexts.iter().enumerate() {
            match raw.as_str().map(str::parse::<Bytes32>) {
                Some(Ok(hash)) => contexts.push(hash),
                _ => {
                    tracing::error!(index = i, pin = %raw, "BatchPin event is not valid - bad pin");
                    return Ok(());
                }
            }
        }

        let (transaction_id, batch_id) = uuids.to_uuid_pair();
        let batch = BatchPin {
            namespace: namespace.to_string(),
            transaction_id,
            batch_id,
            batch_hash,
            batch_payload_ref: json_str(payload, "payloadRef").to_string(),
            contexts,
            event: event.clone(),
        };
        self.callbacks.batch_pin_complete(&batch, &verifier).await
    }

    async fn handle_contract_event(&self, msg: JsonObject) -> Result<(), PluginError> {
        let subscription = json_str(&msg, "subId").to_string();
        let Some(event) = self.parse_event(msg) else {
            return Ok(());
        };
        self.callbacks
            .blockchain_event(&EventWithSubscription {
                event,
                subscription,
            })
            .await
    }
}

#[async_trait]
impl FrameHandler for FabricEvents {
    async fn handle_message_batch(&self, messages: Vec<Value>) -> Result<(), PluginError> {
        for (i, msg) in messages.into_iter().enumerate() {
            let Value::Object(msg) = msg else {
                tracing::error!(index = i, "message cannot be parsed as JSON object");
                continue;
            };
            let event_name = json_str(&msg, "eventName");
            let sub_id = json_str(&msg, "subId");
            tracing::info!(index = i, event_name, "received message");
            tracing::trace!(index = i, message = ?msg, "message");

            if sub_id != self.state.subscription() {
                self.handle_contract_event(msg).await?;
            } else if event_name == BATCH_PIN_EVENT {
                self.handle_batch_pin_event(msg).await?;
            } else {
                tracing::info!(event_name, "ignoring event with unknown name");
            }
        }
        Ok(())
    }

    async fn handle_receipt(&self, reply: JsonObject) {
        let empty = JsonObject::new();
        let headers = reply
            .get("headers")
            .and_then(Value::as_object)
            .unwrap_or(&empty);
        let request_id = json_str(headers, "requestId");
        let reply_type = json_str(headers, "type");
        if request_id.is_empty() || reply_type.is_empty() {
            tracing::error!(reply = ?reply, "reply cannot be processed");
            return;
        }
        let status = match reply_type {
            "TransactionSuccess" => TransactionStatus::Succeeded,
            _ => TransactionStatus::Failed,
        };
        let tx_id = json_str(&reply, "transactionId");
        let message = json_str(&reply, "errorMessage");
        tracing::info!(reply_type, tx = tx_id, request_id, message, "fabconnect reply");
        self.callbacks
            .op_update(self.plugin_name, request_id, status, tx_id, message, &reply)
            .await;
    }
}
