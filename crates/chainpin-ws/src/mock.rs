//! In-memory [`WsConnection`] for connector tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use chainpin_core::PluginError;

use crate::client::WsConnection;

/// Records sent frames and lets tests inject inbound ones.
pub struct MockWsConnection {
    sent: Mutex<Vec<Value>>,
    sent_count: watch::Sender<usize>,
    inbound_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    connected: AtomicBool,
    closed: AtomicBool,
    fail_connect: AtomicBool,
    fail_send: AtomicBool,
}

impl Default for MockWsConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWsConnection {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sent: Mutex::new(Vec::new()),
            sent_count: watch::channel(0).0,
            inbound_tx: Mutex::new(Some(tx)),
            inbound_rx: Mutex::new(Some(rx)),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
        }
    }

    /// Queue an inbound text frame.
    pub fn push(&self, frame: &str) {
        if let Some(tx) = self.inbound_tx.lock().unwrap().as_ref() {
            let _ = tx.send(frame.to_string());
        }
    }

    pub fn push_json(&self, frame: &Value) {
        self.push(&frame.to_string());
    }

    /// Simulate the connection dropping for good.
    pub fn end_inbound(&self) {
        self.inbound_tx.lock().unwrap().take();
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Value> {
        self.sent.lock().unwrap().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Waits until at least `n` frames have been sent.
    pub async fn wait_for_sent(&self, n: usize) {
        let mut rx = self.sent_count.subscribe();
        let _ = rx.wait_for(|len| *len >= n).await;
    }
}

#[async_trait]
impl WsConnection for MockWsConnection {
    async fn connect(&self) -> Result<(), PluginError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(PluginError::WebSocket("mock connect failure".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, frame: &Value) -> Result<(), PluginError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(PluginError::WebSocket("mock send failure".into()));
        }
        let len = {
            let mut sent = self.sent.lock().unwrap();
            sent.push(frame.clone());
            sent.len()
        };
        self.sent_count.send_replace(len);
        Ok(())
    }

    fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.inbound_rx.lock().unwrap().take()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.inbound_tx.lock().unwrap().take();
    }
}
