//! Ordered fan-out of normalized events to registered listeners.

use std::sync::Arc;

use crate::error::PluginError;
use crate::plugin::Callbacks;
use crate::types::{
    BatchPin, Event, EventWithSubscription, JsonObject, TransactionStatus, VerifierRef,
};

/// Registry of host listeners, notified in registration order.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    listeners: Vec<Arc<dyn Callbacks>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener.
    pub fn register(&mut self, listener: Arc<dyn Callbacks>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Notify every listener of an operation update. Never fails.
    pub async fn op_update(
        &self,
        plugin: &str,
        op_id: &str,
        status: TransactionStatus,
        blockchain_tx_id: &str,
        error_message: &str,
        output: &JsonObject,
    ) {
        for listener in &self.listeners {
            listener
                .blockchain_op_update(plugin, op_id, status, blockchain_tx_id, error_message, output)
                .await;
        }
    }

    /// Deliver a batch pin; the first listener error stops delivery.
    pub async fn batch_pin_complete(
        &self,
        batch: &BatchPin,
        signing_key: &VerifierRef,
    ) -> Result<(), PluginError> {
        for listener in &self.listeners {
            listener.batch_pin_complete(batch, signing_key).await?;
        }
        Ok(())
    }

    pub async fn network_action(
        &self,
        action: &str,
        event: &Event,
        signing_key: &VerifierRef,
    ) -> Result<(), PluginError> {
        for listener in &self.listeners {
            listener
                .blockchain_network_action(action, event, signing_key)
                .await?;
        }
        Ok(())
    }

    pub async fn blockchain_event(&self, event: &EventWithSubscription) -> Result<(), PluginError> {
        for listener in &self.listeners {
            listener.blockchain_event(event).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
