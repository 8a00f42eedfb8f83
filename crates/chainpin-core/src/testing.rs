//! Test double for [`Callbacks`], shared with the connector crates' tests.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::PluginError;
use crate::plugin::Callbacks;
use crate::types::{
    BatchPin, Event, EventWithSubscription, JsonObject, TransactionStatus, VerifierRef,
};

/// One recorded callback invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    OpUpdate {
        plugin: String,
        op_id: String,
        status: TransactionStatus,
        tx_id: String,
        error_message: String,
        output: JsonObject,
    },
    BatchPin {
        batch: BatchPin,
        signer: VerifierRef,
    },
    NetworkAction {
        action: String,
        event: Event,
        signer: VerifierRef,
    },
    Event(EventWithSubscription),
}

/// Records every callback. Optionally fails all fallible callbacks.
pub struct RecordingCallbacks {
    calls: Mutex<Vec<Recorded>>,
    fail_with: Option<String>,
    count: watch::Sender<usize>,
}

impl Default for RecordingCallbacks {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingCallbacks {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_with: None,
            count: watch::channel(0).0,
        }
    }

    /// Returns `PluginError::Callback(message)` from every fallible callback.
    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::new()
        }
    }

    fn record(&self, call: Recorded) -> Result<(), PluginError> {
        let len = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(call);
            calls.len()
        };
        self.count.send_replace(len);
        match &self.fail_with {
            Some(msg) => Err(PluginError::Callback(msg.clone())),
            None => Ok(()),
        }
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    pub fn batch_pins(&self) -> Vec<(BatchPin, VerifierRef)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Recorded::BatchPin { batch, signer } => Some((batch, signer)),
                _ => None,
            })
            .collect()
    }

    pub fn network_actions(&self) -> Vec<(String, Event, VerifierRef)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Recorded::NetworkAction {
                    action,
                    event,
                    signer,
                } => Some((action, event, signer)),
                _ => None,
            })
            .collect()
    }

    pub fn events(&self) -> Vec<EventWithSubscription> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Recorded::Event(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    /// Waits until at least `n` callbacks have been recorded.
    pub async fn wait_for_calls(&self, n: usize) {
        let mut rx = self.count.subscribe();
        let _ = rx.wait_for(|len| *len >= n).await;
    }
}

#[async_trait]
impl Callbacks for RecordingCallbacks {
    async fn blockchain_op_update(
        &self,
        plugin: &str,
        op_id: &str,
        status: TransactionStatus,
        blockchain_tx_id: &str,
        error_message: &str,
        output: &JsonObject,
    ) {
        let _ = self.record(Recorded::OpUpdate {
            plugin: plugin.to_string(),
            op_id: op_id.to_string(),
            status,
            tx_id: blockchain_tx_id.to_string(),
            error_message: error_message.to_string(),
            output: output.clone(),
        });
    }

    async fn batch_pin_complete(
        &self,
        batch: &BatchPin,
        signing_key: &VerifierRef,
    ) -> Result<(), PluginError> {
        self.record(Recorded::BatchPin {
            batch: batch.clone(),
            signer: signing_key.clone(),
        })
    }

    async fn blockchain_network_action(
        &self,
        action: &str,
        event: &Event,
        signing_key: &VerifierRef,
    ) -> Result<(), PluginError> {
        self.record(Recorded::NetworkAction {
            action: action.to_string(),
            event: event.clone(),
            signer: signing_key.clone(),
        })
    }

    async fn blockchain_event(&self, event: &EventWithSubscription) -> Result<(), PluginError> {
        self.record(Recorded::Event(event.clone()))
    }
}
