//! Decoding of ethconnect event batches and transaction receipts.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use chainpin_core::{
    json_str, json_u64, protocol_id, unix_time, BatchPin, Bytes32, CallbackRegistry,
    ContractState, Event, EventWithSubscription, JsonObject, PluginError, TransactionStatus,
    VerifierRef, VerifierType, FIREFLY_ACTION_PREFIX,
};
use chainpin_ws::FrameHandler;

use crate::abi::BATCH_PIN_EVENT;
use crate::address::validate_eth_address;

/// Event name from a signature such as `BatchPin(address,uint256,...)`.
fn event_name(signature: &str) -> &str {
    signature.split('(').next().unwrap_or_default()
}

/// Frame handler for the ethconnect event stream.
pub struct EthereumEvents {
    plugin_name: &'static str,
    callbacks: Arc<CallbackRegistry>,
    state: Arc<ContractState>,
}

impl EthereumEvents {
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

    /// Builds the canonical event. `None` if the message carries no `data`.
    fn parse_event(&self, mut msg: JsonObject) -> Option<Event> {
        let data = match msg.remove("data") {
            Some(Value::Object(data)) => data,
            _ => {
                tracing::error!(message = ?msg, "blockchain event is not valid - missing data");
                return None;
            }
        };
        let signature = json_str(&msg, "signature").to_string();
        let timestamp = msg
            .contains_key("timestamp")
            .then(|| json_u64(&msg, "timestamp"))
            .map(|t| unix_time(i64::try_from(t).unwrap_or(i64::MAX)));

        Some(Event {
            source: self.plugin_name.to_string(),
            name: event_name(&signature).to_string(),
            protocol_id: protocol_id(
                json_u64(&msg, "blockNumber"),
                json_u64(&msg, "transactionIndex"),
                json_u64(&msg, "logIndex"),
            ),
            output: data,
            timestamp,
            blockchain_tx_id: json_str(&msg, "transactionHash").to_string(),
            location: format!("address={}", json_str(&msg, "address").to_ascii_lowercase()),
            signature,
            info: msg,
        })
    }

    async fn handle_batch_pin_event(&self, msg: JsonObject) -> Result<(), PluginError> {
        let Some(event) = self.parse_event(msg) else {
            return Ok(());
        };
        let data = &event.output;

        let author = match validate_eth_address(json_str(data, "author")) {
            Ok(author) => author,
            Err(e) => {
                tracing::error!(error = %e, "BatchPin event is not valid - bad author");
                return Ok(());
            }
        };
        let verifier = VerifierRef::new(VerifierType::EthAddress, author);

        let namespace = json_str(data, "namespace");
        if let Some(action) = namespace.strip_prefix(FIREFLY_ACTION_PREFIX) {
            return self.callbacks.network_action(action, &event, &verifier).await;
        }

        let uuids: Bytes32 = match json_str(data, "uuids").parse() {
            Ok(uuids) => uuids,
            Err(e) => {
                tracing::error!(error = %e, "BatchPin event is not valid - bad uuids");
                return Ok(());
            }
        };
        let batch_hash: Bytes32 = match json_str(data, "batchHash").parse() {
            Ok(hash) => hash,
            Err(e) => {
                tracing::error!(error = %e, "BatchPin event is not valid - bad batchHash");
                return Ok(());
            }
        };
        let contexts = match parse_contexts(data.get("contexts")) {
            Ok(contexts) => contexts,
            Err(reason) => {
                tracing::error!(reason = %reason, "BatchPin event is not valid - bad context");
                return Ok(());
            }
        };

        let (transaction_id, batch_id) = uuids.to_uuid_pair();
        let batch = BatchPin {
            namespace: namespace.to_string(),
            transaction_id,
            batch_id,
            batch_hash,
            batch_payload_ref: json_str(data, "payloadRef").to_string(),
            contexts,
            event: event.clone(),
        };
        self.callbacks.batch_pin_complete(&batch, &verifier).await
    }

    async fn handle_contract_event(&self, msg: JsonObject) -> Result<(), PluginError> {
        let subscription = json_str(&msg, "subId").to_string();
        match self.parse_event(msg) {
            Some(event) => {
                self.callbacks
                    .blockchain_event(&EventWithSubscription {
                        event,
                        subscription,
                    })
                    .await
            }
            None => Ok(()),
        }
    }
}

fn parse_contexts(raw: Option<&Value>) -> Result<Vec<Bytes32>, String> {
    let entries = match raw {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(other) => return Err(format!("contexts is not an array: {other}")),
    };
    entries
        .iter()
        .map(|entry| {
            entry
                .as_str()
                .ok_or_else(|| format!("context is not a string: {entry}"))?
                .parse::<Bytes32>()
                .map_err(|e| e.to_string())
        })
        .collect()
}

#[async_trait]
impl FrameHandler for EthereumEvents {
    async fn handle_message_batch(&self, messages: Vec<Value>) -> Result<(), PluginError> {
        for (i, msg) in messages.into_iter().enumerate() {
            let Value::Object(msg) = msg else {
                tracing::error!(index = i, "message cannot be parsed as JSON object");
                continue;
            };
            tracing::trace!(index = i, message = ?msg, "message");

            let sub_id = json_str(&msg, "subId");
            let signature = json_str(&msg, "signature");
            tracing::info!(index = i, sub_id, signature, "received event");

            if sub_id == self.state.subscription() {
                if event_name(signature) == BATCH_PIN_EVENT {
                    self.handle_batch_pin_event(msg).await?;
                } else {
                    tracing::info!(signature, "ignoring event with unknown name");
                }
            } else {
                self.handle_contract_event(msg).await?;
            }
        }
        Ok(())
    }

    async fn handle_receipt(&self, reply: JsonObject) {
        let headers = reply.get("headers").and_then(Value::as_object);
        let request_id = headers.map(|h| json_str(h, "requestId")).unwrap_or("");
        let reply_type = headers.map(|h| json_str(h, "type")).unwrap_or("");
        if request_id.is_empty() || reply_type.is_empty() {
            tracing::error!(reply = ?reply, "reply cannot be processed - missing fields");
            return;
        }

        let status = if reply_type == "TransactionSuccess" {
            TransactionStatus::Succeeded
        } else {
            TransactionStatus::Failed
        };
        let tx_hash = json_str(&reply, "transactionHash");
        let message = json_str(&reply, "errorMessage");
        tracing::info!(
            reply_type,
            request_id,
            tx = tx_hash,
            message,
            "ethconnect reply"
        );
        self.callbacks
            .op_update(self.plugin_name, request_id, status, tx_hash, message, &reply)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainpin_core::testing::{Recorded, RecordingCallbacks};
    use chainpin_core::ContractBinding;
    use serde_json::json;
    use uuid::Uuid;

    const SUB_ID: &str = "sb-b5b97a4e-a317-4053-6400-1474650efcb5";
    const BATCH_PIN_SIG: &str = "BatchPin(address,uint256,string,bytes32,bytes32,string,bytes32[])";

    fn handler(callbacks: &Arc<RecordingCallbacks>) -> EthereumEvents {
        let mut registry = CallbackRegistry::new();
        registry.register(callbacks.clone());
        let state = ContractState::new();
        state.replace(ContractBinding {
            subscription: SUB_ID.into(),
            ..Default::default()
        });
        EthereumEvents::new("ethereum", Arc::new(registry), Arc::new(state))
    }

    fn batch_pin_message(data: Value) -> Value {
        json!({
            "address": "0x1C197604587F046FD40684A8f21f4609FB811A7b",
            "blockNumber": "38011",
            "transactionIndex": "0x0",
            "transactionHash": "0xc26df2bf1a733e9249372d61eb11bd8662d26c8129df76890b1beb2f6fa72628",
            "data": data,
            "subId": SUB_ID,
            "signature": BATCH_PIN_SIG,
            "logIndex": "50",
            "timestamp": "1620576488"
        })
    }

    fn good_data() -> Value {
        json!({
            "author": "0X91D2B4381A4CD5C7C0F27565A7D4B829844C8635",
            "namespace": "ns1",
            "uuids": "0xe19af8b390604051812d7597d19adfb9847d3bfd074249efb65d3fed15f5b0a6",
            "batchHash": "0xd71eb138d74c229a388eb0e1abc03f4c7cbb21d4fc4b839fbf0ec73e4263f6be",
            "payloadRef": "Qmf412jQZiuVUtdgnB36FXFX7xg5V6KEbSJ4dpQuhkLyfD",
            "contexts": [
                "0x68e4da79f805bca5b912bcda9c63d03e6e867108dabb9b944109aea541ef522a",
                "0x19b82093de5ce92a01e333048e877e2374354bf846dd034864ef6ffbd6438771"
            ],
            "timestamp": "1620576488"
        })
    }

    fn with(mut data: Value, key: &str, value: Value) -> Value {
        data[key] = value;
        data
    }

    #[tokio::test]
    async fn batch_pin_decoded() {
        let callbacks = Arc::new(RecordingCallbacks::new());
        handler(&callbacks)
            .handle_message_batch(vec![batch_pin_message(good_data())])
            .await
            .unwrap();

        let pins = callbacks.batch_pins();
        assert_eq!(pins.len(), 1);
        let (batch, signer) = &pins[0];
        assert_eq!(batch.namespace, "ns1");
        assert_eq!(
            batch.transaction_id,
            Uuid::parse_str("e19af8b3-9060-4051-812d-7597d19adfb9").unwrap()
        );
        assert_eq!(
            batch.batch_id,
            Uuid::parse_str("847d3bfd-0742-49ef-b65d-3fed15f5b0a6").unwrap()
        );
        assert_eq!(
            batch.batch_hash.to_hex0x(),
            "0xd71eb138d74c229a388eb0e1abc03f4c7cbb21d4fc4b839fbf0ec73e4263f6be"
        );
        assert_eq!(batch.batch_payload_ref, "Qmf412jQZiuVUtdgnB36FXFX7xg5V6KEbSJ4dpQuhkLyfD");
        assert_eq!(batch.contexts.len(), 2);
        assert_eq!(
            batch.contexts[1].to_hex0x(),
            "0x19b82093de5ce92a01e333048e877e2374354bf846dd034864ef6ffbd6438771"
        );
        assert_eq!(
            *signer,
            VerifierRef::new(
                VerifierType::EthAddress,
                "0x91d2b4381a4cd5c7c0f27565a7d4b829844c8635"
            )
        );

        let event = &batch.event;
        assert_eq!(event.source, "ethereum");
        assert_eq!(event.name, "BatchPin");
        assert_eq!(event.protocol_id, "000000038011/000000/000050");
        assert_eq!(event.signature, BATCH_PIN_SIG);
        assert_eq!(event.location, "address=0x1c197604587f046fd40684a8f21f4609fb811a7b");
        assert_eq!(
            event.blockchain_tx_id,
            "0xc26df2bf1a733e9249372d61eb11bd8662d26c8129df76890b1beb2f6fa72628"
        );
        assert_eq!(event.timestamp.unwrap().timestamp(), 1620576488);
        assert_eq!(Value::Object(event.output.clone()), good_data());
        assert!(!event.info.contains_key("data"));
        assert_eq!(event.info["blockNumber"], "38011");
        assert_eq!(event.info["address"], "0x1C197604587F046FD40684A8f21f4609FB811A7b");
    }

    #[tokio::test]
    async fn missing_contexts_means_empty() {
        let callbacks = Arc::new(RecordingCallbacks::new());
        let mut data = good_data();
        data.as_object_mut().unwrap().remove("contexts");
        handler(&callbacks)
            .handle_message_batch(vec![batch_pin_message(data)])
            .await
            .unwrap();
        assert!(callbacks.batch_pins()[0].0.contexts.is_empty());
    }

    #[tokio::test]
    async fn malformed_messages_are_skipped() {
        let callbacks = Arc::new(RecordingCallbacks::new());
        let mut no_data = batch_pin_message(good_data());
        no_data.as_object_mut().unwrap().remove("data");

        let batch = vec![
            json!(10),
            json!(20),
            batch_pin_message(with(good_data(), "author", json!(""))),
            batch_pin_message(with(good_data(), "author", json!("!good"))),
            batch_pin_message(with(good_data(), "uuids", json!("!good"))),
            batch_pin_message(with(good_data(), "uuids", json!("0x1234"))),
            batch_pin_message(with(good_data(), "batchHash", json!("!good"))),
            batch_pin_message(with(good_data(), "contexts", json!(["0xabcd"]))),
            batch_pin_message(with(good_data(), "contexts", json!([42]))),
            no_data,
            json!({"subId": SUB_ID, "signature": BATCH_PIN_SIG}),
            json!({"subId": SUB_ID, "signature": "Random(bytes32)", "data": {}}),
            batch_pin_message(good_data()),
        ];
        handler(&callbacks).handle_message_batch(batch).await.unwrap();

        assert_eq!(callbacks.calls().len(), 1);
        assert_eq!(callbacks.batch_pins().len(), 1);
    }

    #[tokio::test]
    async fn network_action_bypasses_batch_decoding() {
        let callbacks = Arc::new(RecordingCallbacks::new());
        let data = with(
            with(good_data(), "namespace", json!("firefly:terminate")),
            "uuids",
            json!("not-checked"),
        );
        handler(&callbacks)
            .handle_message_batch(vec![batch_pin_message(data)])
            .await
            .unwrap();

        let actions = callbacks.network_actions();
        assert_eq!(actions.len(), 1);
        let (action, event, signer) = &actions[0];
        assert_eq!(action, "terminate");
        assert_eq!(event.protocol_id, "000000038011/000000/000050");
        assert_eq!(signer.value, "0x91d2b4381a4cd5c7c0f27565a7d4b829844c8635");
        assert!(callbacks.batch_pins().is_empty());
    }

    #[tokio::test]
    async fn callback_error_is_returned_verbatim() {
        let callbacks = Arc::new(RecordingCallbacks::failing("pop"));
        let err = handler(&callbacks)
            .handle_message_batch(vec![batch_pin_message(good_data())])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "pop");
    }

    #[tokio::test]
    async fn contract_event_on_other_subscription() {
        let callbacks = Arc::new(RecordingCallbacks::new());
        let msg = json!({
            "address": "0x1C197604587F046FD40684A8f21f4609FB811A7b",
            "blockNumber": "38011",
            "transactionIndex": "0x0",
            "transactionHash": "0xc26df2bf1a733e9249372d61eb11bd8662d26c8129df76890b1beb2f6fa72628",
            "data": {"from": "0x91D2B4381A4CD5C7C0F27565A7D4B829844C8635", "value": "1"},
            "subId": "sub2",
            "signature": "Changed(address,uint256)",
            "logIndex": "50",
            "timestamp": "1640811383"
        });
        handler(&callbacks).handle_message_batch(vec![msg]).await.unwrap();

        let events = callbacks.events();
        assert_eq!(events.len(), 1);
        let ev = &events[0];
        assert_eq!(ev.subscription, "sub2");
        assert_eq!(ev.event.name, "Changed");
        assert_eq!(ev.event.protocol_id, "000000038011/000000/000050");
        assert_eq!(ev.event.output["value"], "1");
        assert_eq!(ev.event.info["subId"], "sub2");
        assert!(!ev.event.info.contains_key("data"));
        assert_eq!(
            ev.event.blockchain_tx_id,
            "0xc26df2bf1a733e9249372d61eb11bd8662d26c8129df76890b1beb2f6fa72628"
        );
    }

    #[tokio::test]
    async fn contract_event_without_data_is_skipped() {
        let callbacks = Arc::new(RecordingCallbacks::new());
        handler(&callbacks)
            .handle_message_batch(vec![json!({"subId": "sub2", "signature": "Changed()"})])
            .await
            .unwrap();
        assert!(callbacks.calls().is_empty());
    }

    #[test]
    fn oversized_timestamp_saturates() {
        let callbacks = Arc::new(RecordingCallbacks::new());
        let msg = with(batch_pin_message(good_data()), "timestamp", json!(u64::MAX.to_string()));
        let event = handler(&callbacks).parse_event(reply(msg)).unwrap();
        assert_eq!(event.timestamp, Some(unix_time(i64::MAX)));
        assert!(event.timestamp.unwrap().timestamp() > 0);
    }

    fn reply(value: Value) -> JsonObject {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn receipt_success_and_failure() {
        let callbacks = Arc::new(RecordingCallbacks::new());
        let h = handler(&callbacks);
        let ok = reply(json!({
            "headers": {"requestId": "ns1:4f9e0c32-f3d4-4a8b-b1a4-7a5e7b1e35b4", "type": "TransactionSuccess"},
            "transactionHash": "0x71a38acb7a5d4a970854f6d638ceb1fa10a4b59cbf4ed7674273a1a8dc8b36b8"
        }));
        let failed = reply(json!({
            "headers": {"requestId": "ns1:c0e1e2f5-1ad5-4b0a-8d0c-1d2b2c8b3e0f", "type": "Error"},
            "errorMessage": "Packing arguments for method 'broadcastBatch': abi: cannot use [3]uint8 as type [32]uint8 as argument"
        }));
        h.handle_receipt(ok.clone()).await;
        h.handle_receipt(failed.clone()).await;

        assert_eq!(
            callbacks.calls(),
            vec![
                Recorded::OpUpdate {
                    plugin: "ethereum".into(),
                    op_id: "ns1:4f9e0c32-f3d4-4a8b-b1a4-7a5e7b1e35b4".into(),
                    status: TransactionStatus::Succeeded,
                    tx_id: "0x71a38acb7a5d4a970854f6d638ceb1fa10a4b59cbf4ed7674273a1a8dc8b36b8".into(),
                    error_message: String::new(),
                    output: ok,
                },
                Recorded::OpUpdate {
                    plugin: "ethereum".into(),
                    op_id: "ns1:c0e1e2f5-1ad5-4b0a-8d0c-1d2b2c8b3e0f".into(),
                    status: TransactionStatus::Failed,
                    tx_id: String::new(),
                    error_message: "Packing arguments for method 'broadcastBatch': abi: cannot use [3]uint8 as type [32]uint8 as argument".into(),
                    output: failed,
                },
            ]
        );
    }

    #[tokio::test]
    async fn receipt_missing_fields_ignored() {
        let callbacks = Arc::new(RecordingCallbacks::new());
        let h = handler(&callbacks);
        h.handle_receipt(JsonObject::new()).await;
        h.handle_receipt(reply(json!({"headers": {"requestId": "ns1:abc"}})))
            .await;
        assert!(callbacks.calls().is_empty());
    }
}
