//! fabconnect event streams and chaincode event subscriptions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use chainpin_core::ffi::{FIRST_EVENT_NEWEST, FIRST_EVENT_OLDEST};
use chainpin_core::PluginError;
use chainpin_http::{rest_error, RestClient};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStreamWebSocket {
    #[serde(default)]
    pub topic: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStream {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub error_handling: String,
    #[serde(default)]
    pub batch_size: u32,
    #[serde(default, rename = "batchTimeoutMS")]
    pub batch_timeout_ms: u64,
    #[serde(default, rename = "type")]
    pub stream_type: String,
    #[serde(default)]
    pub websocket: EventStreamWebSocket,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionFilter {
    #[serde(default)]
    pub chaincode_id: String,
    #[serde(default)]
    pub event_filter: String,
    #[serde(default)]
    pub block_type: String,
}

/// A fabconnect subscription to one chaincode event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub stream: String,
    #[serde(default)]
    pub from_block: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub signer: String,
    #[serde(default)]
    pub payload_type: String,
    #[serde(default)]
    pub filter: SubscriptionFilter,
}

/// Subscription name for the FireFly chaincode: event plus hex of the first 8 chaincode chars.
pub fn firefly_subscription_name(event_name: &str, chaincode: &str) -> String {
    let prefix: String = chaincode.chars().take(8).collect();
    format!("{event_name}_{}", hex::encode(prefix))
}

/// Maps a FireFly first-event option to a fabconnect `fromBlock`.
pub fn from_block_for(first_event: &str) -> String {
    match first_event {
        FIRST_EVENT_OLDEST => "0".to_string(),
        FIRST_EVENT_NEWEST => "newest".to_string(),
        other => other.to_string(),
    }
}

#[derive(Clone)]
pub struct StreamManager {
    client: Arc<dyn RestClient>,
    signer: String,
    batch_size: u32,
    batch_timeout_ms: u64,
}

impl StreamManager {
    pub fn new(
        client: Arc<dyn RestClient>,
        signer: &str,
        batch_size: u32,
        batch_timeout_ms: u64,
    ) -> Self {
        Self {
            client,
            signer: signer.to_string(),
            batch_size,
            batch_timeout_ms,
        }
    }

    pub async fn get_event_streams(&self) -> Result<Vec<EventStream>, PluginError> {
        let body = self.client.get_json("/eventstreams").await?;
        Ok(serde_json::from_value(null_as_empty(body))?)
    }

    /// Returns the stream listening on `topic`, patching its batch settings
    /// when they differ from ours, or creates one.
    pub async fn ensure_event_stream(&self, topic: &str) -> Result<EventStream, PluginError> {
        let body = serde_json::to_value(EventStream {
            id: String::new(),
            name: topic.to_string(),
            error_handling: "block".into(),
            batch_size: self.batch_size,
            batch_timeout_ms: self.batch_timeout_ms,
            stream_type: "websocket".into(),
            websocket: EventStreamWebSocket {
                topic: topic.to_string(),
            },
        })?;
        let existing = self
            .get_event_streams()
            .await?
            .into_iter()
            .find(|s| s.websocket.topic == topic);
        let stream: EventStream = match existing {
            Some(stream)
                if stream.batch_size == self.batch_size
                    && stream.batch_timeout_ms == self.batch_timeout_ms =>
            {
                stream
            }
            Some(stream) => serde_json::from_value(
                self.client
                    .patch_json(&format!("/eventstreams/{}", stream.id), body)
                    .await?,
            )?,
            None => serde_json::from_value(self.client.post_json("/eventstreams", body).await?)?,
        };
        tracing::info!(id = %stream.id, topic, "event stream ready");
        Ok(stream)
    }

    pub async fn get_subscriptions(&self) -> Result<Vec<Subscription>, PluginError> {
        let body = self.client.get_json("/subscriptions").await?;
        Ok(serde_json::from_value(null_as_empty(body))?)
    }

    pub async fn create_subscription(
        &self,
        channel: &str,
        chaincode: &str,
        stream_id: &str,
        name: &str,
        event: &str,
        first_event: &str,
    ) -> Result<Subscription, PluginError> {
        let request = Subscription {
            id: String::new(),
            name: name.to_string(),
            stream: stream_id.to_string(),
            from_block: from_block_for(first_event),
            channel: channel.to_string(),
            signer: self.signer.clone(),
            payload_type: "stringifiedJSON".into(),
            filter: SubscriptionFilter {
                chaincode_id: chaincode.to_string(),
                event_filter: event.to_string(),
                block_type: "tx".into(),
            },
        };
        let created = self
            .client
            .post_json("/subscriptions", serde_json::to_value(&request)?)
            .await?;
        Ok(serde_json::from_value(created)?)
    }

    /// Deletes a subscription. A 404 counts as deleted.
    pub async fn delete_subscription(&self, id: &str) -> Result<(), PluginError> {
        let resp = self.client.delete(&format!("/subscriptions/{id}")).await?;
        if resp.is_success() || resp.status == 404 {
            return Ok(());
        }
        Err(rest_error(resp.status, &resp.body))
    }

    pub async fn ensure_firefly_subscription(
        &self,
        channel: &str,
        chaincode: &str,
        from_block: &str,
        stream_id: &str,
        event: &str,
    ) -> Result<Subscription, PluginError> {
        let name = firefly_subscription_name(event, chaincode);
        if let Some(sub) = self
            .get_subscriptions()
            .await?
            .into_iter()
            .find(|s| s.stream == stream_id && s.name == name)
        {
            tracing::info!(event, id = %sub.id, "reusing FireFly chaincode subscription");
            return Ok(sub);
        }
        let sub = self
            .create_subscription(channel, chaincode, stream_id, &name, event, from_block)
            .await?;
        tracing::info!(event, id = %sub.id, "created FireFly chaincode subscription");
        Ok(sub)
    }
}

fn null_as_empty(body: Value) -> Value {
    match body {
        Value::Null => Value::Array(Vec::new()),
        other => other,
    }
}
