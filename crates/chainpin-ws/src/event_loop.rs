//! Consumption loop shared by the connectors.
//!
//! Frames are classified as a message batch (JSON array) or a receipt (JSON
//! object). A batch is acknowledged only after every callback for it has
//! returned `Ok`; any error ends the loop so the batch is redelivered after
//! reconnect.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use chainpin_core::{JsonObject, PluginError};

use crate::client::WsConnection;

/// Connector-specific handling of inbound frames.
#[async_trait]
pub trait FrameHandler: Send + Sync {
    /// Processes one delivered batch. `Err` stops the loop without acking.
    async fn handle_message_batch(&self, messages: Vec<Value>) -> Result<(), PluginError>;

    /// Processes an asynchronous transaction receipt.
    async fn handle_receipt(&self, reply: JsonObject);
}

/// Caller side of a running event loop.
#[derive(Debug)]
pub struct LoopHandle {
    shutdown_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
}

impl LoopHandle {
    /// Asks the loop to exit after the frame it is processing.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Resolves once the loop has exited and closed the connection.
    pub async fn wait_closed(&self) {
        let mut rx = self.closed_rx.clone();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    pub fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }
}

/// Spawns the event loop for `topic` and returns its handle.
pub fn spawn_event_loop(
    ws: Arc<dyn WsConnection>,
    handler: Arc<dyn FrameHandler>,
    topic: String,
) -> Result<LoopHandle, PluginError> {
    let receiver = ws
        .take_receiver()
        .ok_or_else(|| PluginError::WebSocket("event loop already started".into()))?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (closed_tx, closed_rx) = watch::channel(false);

    tokio::spawn(async move {
        event_loop(ws.as_ref(), handler.as_ref(), &topic, receiver, shutdown_rx).await;
        ws.close();
        closed_tx.send_replace(true);
    });

    Ok(LoopHandle {
        shutdown_tx,
        closed_rx,
    })
}

async fn event_loop(
    ws: &dyn WsConnection,
    handler: &dyn FrameHandler,
    topic: &str,
    mut receiver: mpsc::UnboundedReceiver<String>,
    mut shutdown: watch::Receiver<bool>,
) {
    let ack = crate::ack_frame(topic);
    loop {
        if *shutdown.borrow() {
            tracing::debug!(topic, "event loop exiting (shutdown requested)");
            return;
        }
        let frame = tokio::select! {
            _ = shutdown.changed() => {
                tracing::debug!(topic, "event loop exiting (shutdown requested)");
                return;
            }
            frame = receiver.recv() => match frame {
                Some(frame) => frame,
                None => {
                    tracing::debug!(topic, "event loop exiting (receive channel closed)");
                    return;
                }
            },
        };

        let parsed: Value = match serde_json::from_str(&frame) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, frame = %frame, "message cannot be parsed as JSON");
                continue;
            }
        };

        let result = match parsed {
            Value::Array(messages) => match handler.handle_message_batch(messages).await {
                Ok(()) => ws.send(&ack).await,
                Err(e) => Err(e),
            },
            Value::Object(reply) => {
                handler.handle_receipt(reply).await;
                Ok(())
            }
            other => {
                tracing::error!(message = %other, "unexpected message");
                continue;
            }
        };

        if let Err(e) = result {
            tracing::error!(error = %e, topic, "event loop exiting");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockWsConnection;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        batches: Mutex<Vec<Vec<Value>>>,
        receipts: Mutex<Vec<JsonObject>>,
        fail: bool,
    }

    #[async_trait]
    impl FrameHandler for Recorder {
        async fn handle_message_batch(&self, messages: Vec<Value>) -> Result<(), PluginError> {
            self.batches.lock().unwrap().push(messages);
            if self.fail {
                return Err(PluginError::Callback("pop".into()));
            }
            Ok(())
        }

        async fn handle_receipt(&self, reply: JsonObject) {
            self.receipts.lock().unwrap().push(reply);
        }
    }

    #[tokio::test]
    async fn acks_batches_and_skips_bad_frames() {
        let ws = Arc::new(MockWsConnection::new());
        let handler = Arc::new(Recorder::default());
        let handle = spawn_event_loop(ws.clone(), handler.clone(), "topic1".into()).unwrap();

        ws.push("!json");
        ws.push("42");
        ws.push(r#"{"headers":{}}"#);
        ws.push("[]");
        ws.wait_for_sent(1).await;

        assert_eq!(ws.sent(), vec![crate::ack_frame("topic1")]);
        assert_eq!(handler.batches.lock().unwrap().len(), 1);
        assert_eq!(handler.receipts.lock().unwrap().len(), 1);

        handle.shutdown();
        handle.wait_closed().await;
        assert!(ws.is_closed());
    }

    #[tokio::test]
    async fn handler_error_exits_without_ack() {
        let ws = Arc::new(MockWsConnection::new());
        let handler = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let handle = spawn_event_loop(ws.clone(), handler, "topic1".into()).unwrap();

        ws.push("[]");
        handle.wait_closed().await;

        assert!(ws.sent().is_empty());
        assert!(ws.is_closed());
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn ack_send_failure_exits() {
        let ws = Arc::new(MockWsConnection::new());
        ws.fail_send(true);
        let handle =
            spawn_event_loop(ws.clone(), Arc::new(Recorder::default()), "topic1".into()).unwrap();

        ws.push("[]");
        handle.wait_closed().await;
        assert!(ws.is_closed());
    }

    #[tokio::test]
    async fn receiver_closed_exits() {
        let ws = Arc::new(MockWsConnection::new());
        let handle =
            spawn_event_loop(ws.clone(), Arc::new(Recorder::default()), "topic1".into()).unwrap();
        ws.end_inbound();
        handle.wait_closed().await;
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let ws = Arc::new(MockWsConnection::new());
        let handler = Arc::new(Recorder::default());
        let first = spawn_event_loop(ws.clone(), handler.clone(), "t".into()).unwrap();
        assert!(spawn_event_loop(ws.clone(), handler, "t".into()).is_err());
        first.shutdown();
        first.wait_closed().await;
    }
}
