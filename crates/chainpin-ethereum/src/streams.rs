//! ethconnect event streams and subscriptions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use chainpin_core::ffi::{FIRST_EVENT_NEWEST, FIRST_EVENT_OLDEST};
use chainpin_core::PluginError;
use chainpin_http::{rest_error, RestClient};

use crate::abi::AbiEntry;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStreamWebSocket {
    #[serde(default)]
    pub topic: String,
}

/// An ethconnect event stream delivering over the websocket.
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

/// An ethconnect subscription to one event of one contract.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub stream: String,
    #[serde(default)]
    pub from_block: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<AbiEntry>,
}

/// Subscription name for the FireFly contract at `address`.
///
/// Embeds the hex of the first 8 characters of the address so pointing at a
/// different contract produces a fresh subscription.
pub fn firefly_subscription_name(event_name: &str, address: &str) -> String {
    let lower = address.to_ascii_lowercase();
    let prefix: String = lower.chars().take(8).collect();
    format!("{event_name}_{}", hex::encode(prefix))
}

/// Maps a FireFly first-event option to an ethconnect `fromBlock`.
pub fn from_block_for(first_event: &str) -> String {
    match first_event {
        FIRST_EVENT_OLDEST => "0".to_string(),
        FIRST_EVENT_NEWEST => "latest".to_string(),
        other => other.to_string(),
    }
}

/// Manages event streams and subscriptions over the ethconnect REST API.
#[derive(Clone)]
pub struct StreamManager {
    client: Arc<dyn RestClient>,
    batch_size: u32,
    batch_timeout_ms: u64,
}

impl StreamManager {
    pub fn new(client: Arc<dyn RestClient>, batch_size: u32, batch_timeout_ms: u64) -> Self {
        Self {
            client,
            batch_size,
            batch_timeout_ms,
        }
    }

    fn stream_body(&self, topic: &str) -> EventStream {
        EventStream {
            id: String::new(),
            name: topic.to_string(),
            error_handling: "block".into(),
            batch_size: self.batch_size,
            batch_timeout_ms: self.batch_timeout_ms,
            stream_type: "websocket".into(),
            websocket: EventStreamWebSocket {
                topic: topic.to_string(),
            },
        }
    }

    pub async fn get_event_streams(&self) -> Result<Vec<EventStream>, PluginError> {
        let body = self.client.get_json("/eventstreams").await?;
        Ok(serde_json::from_value(null_as_empty(body))?)
    }

    /// Reuses the stream listening on `topic`, patching it only when its batch
    /// settings differ, or creates one.
    pub async fn ensure_event_stream(&self, topic: &str) -> Result<EventStream, PluginError> {
        let body = serde_json::to_value(self.stream_body(topic))?;
        for stream in self.get_event_streams().await? {
            if stream.websocket.topic == topic {
                if stream.batch_size == self.batch_size
                    && stream.batch_timeout_ms == self.batch_timeout_ms
                {
                    tracing::info!(id = %stream.id, topic, "event stream reused");
                    return Ok(stream);
                }
                let updated = self
                    .client
                    .patch_json(&format!("/eventstreams/{}", stream.id), body)
                    .await?;
                let updated: EventStream = serde_json::from_value(updated)?;
                tracing::info!(id = %updated.id, topic, "event stream updated");
                return Ok(updated);
            }
        }
        let created: EventStream =
            serde_json::from_value(self.client.post_json("/eventstreams", body).await?)?;
        tracing::info!(id = %created.id, topic, "event stream created");
        Ok(created)
    }

    pub async fn get_subscriptions(&self) -> Result<Vec<Subscription>, PluginError> {
        let body = self.client.get_json("/subscriptions").await?;
        Ok(serde_json::from_value(null_as_empty(body))?)
    }

    pub async fn create_subscription(
        &self,
        address: &str,
        stream_id: &str,
        name: &str,
        first_event: &str,
        event: &AbiEntry,
    ) -> Result<Subscription, PluginError> {
        let request = Subscription {
            name: name.to_string(),
            stream: stream_id.to_string(),
            from_block: from_block_for(first_event),
            address: address.to_string(),
            event: Some(event.clone()),
            ..Default::default()
        };
        let created = self
            .client
            .post_json("/subscriptions", serde_json::to_value(&request)?)
            .await?;
        Ok(serde_json::from_value(created)?)
    }

    /// Deletes a subscription. Already gone is success.
    pub async fn delete_subscription(&self, id: &str) -> Result<(), PluginError> {
        let resp = self.client.delete(&format!("/subscriptions/{id}")).await?;
        if resp.is_success() || resp.status == 404 {
            Ok(())
        } else {
            Err(rest_error(resp.status, &resp.body))
        }
    }

    /// Finds or creates the subscription for the FireFly contract's `event`.
    pub async fn ensure_firefly_subscription(
        &self,
        address: &str,
        from_block: &str,
        stream_id: &str,
        event: &AbiEntry,
    ) -> Result<Subscription, PluginError> {
        let name = firefly_subscription_name(&event.name, address);
        let existing = self
            .get_subscriptions()
            .await?
            .into_iter()
            .find(|s| s.stream == stream_id && s.name == name);
        let sub = match existing {
            Some(sub) => sub,
            None => {
                self.create_subscription(address, stream_id, &name, from_block, event)
                    .await?
            }
        };
        tracing::info!(event = %event.name, id = %sub.id, "FireFly contract subscription");
        Ok(sub)
    }
}

fn null_as_empty(body: Value) -> Value {
    if body.is_null() {
        Value::Array(Vec::new())
    } else {
        body
    }
}
