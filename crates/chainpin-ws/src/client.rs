//! Connector event websocket with auto-reconnect and an after-connect handshake.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tokio_tungstenite::tungstenite::Message;

use chainpin_core::PluginError;

fn default_reconnect_initial_ms() -> u64 {
    500
}
fn default_reconnect_max_ms() -> u64 {
    60_000
}
fn default_initial_connect_attempts() -> u32 {
    5
}

/// Configuration for [`WsClient`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WsConfig {
    /// Appended to the connector URL, e.g. `/ws`.
    #[serde(default)]
    pub path: String,
    /// Reconnect backoff starting delay.
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    /// Maximum reconnect backoff.
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
    /// Attempts before `connect()` gives up. 0 retries forever.
    #[serde(default = "default_initial_connect_attempts")]
    pub initial_connect_attempts: u32,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            initial_connect_attempts: default_initial_connect_attempts(),
        }
    }
}

impl WsConfig {
    pub fn with_path(path: &str) -> Self {
        Self {
            path: path.to_string(),
            ..Default::default()
        }
    }
}

/// A long-lived duplex text-frame connection to a connector.
#[async_trait]
pub trait WsConnection: Send + Sync {
    /// Establishes the connection, returning once the first handshake is sent.
    async fn connect(&self) -> Result<(), PluginError>;

    /// Sends one JSON frame. While reconnecting the frame is held and sent
    /// after the handshake is replayed.
    async fn send(&self, frame: &Value) -> Result<(), PluginError>;

    /// Hands out the inbound frame receiver. Only the first call returns `Some`.
    fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<String>>;

    /// Stops the connection. The receiver then yields `None`.
    fn close(&self);
}

/// Command sent from callers to the background WS task.
enum WsCommand {
    Send {
        text: String,
        tx: oneshot::Sender<Result<(), PluginError>>,
    },
    Close,
}

/// Websocket client.
///
/// A background task owns the socket, reconnects with exponential backoff,
/// and re-sends the handshake frames after every (re)connect.
pub struct WsClient {
    url: String,
    config: WsConfig,
    handshake: Vec<Value>,
    cmd_tx: Mutex<Option<mpsc::UnboundedSender<WsCommand>>>,
    inbound_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl WsClient {
    /// Validates `base_url` and prepares the client. Nothing connects until [`WsConnection::connect`].
    pub fn new(base_url: &str, config: WsConfig, handshake: Vec<Value>) -> Result<Self, PluginError> {
        let url = websocket_url(base_url, &config.path)?;
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Ok(Self {
            url,
            config,
            handshake,
            cmd_tx: Mutex::new(None),
            inbound_tx: Mutex::new(Some(inbound_tx)),
            inbound_rx: Mutex::new(Some(inbound_rx)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Rewrites `http(s)` to `ws(s)` and appends `path`.
pub fn websocket_url(base_url: &str, path: &str) -> Result<String, PluginError> {
    let mut url = url::Url::parse(base_url)
        .map_err(|e| PluginError::WebSocket(format!("invalid URL '{base_url}': {e}")))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(PluginError::WebSocket(format!(
                "unsupported URL scheme '{other}' in '{base_url}'"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| PluginError::WebSocket(format!("cannot use scheme {scheme} for '{base_url}'")))?;
    if !path.is_empty() {
        let joined = format!("{}{}", url.path().trim_end_matches('/'), path);
        url.set_path(&joined);
    }
    Ok(url.to_string())
}

#[async_trait]
impl WsConnection for WsClient {
    async fn connect(&self) -> Result<(), PluginError> {
        let inbound_tx = self
            .inbound_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| PluginError::WebSocket("websocket already connected or closed".into()))?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<WsCommand>();
        let (ready_tx, ready_rx) = oneshot::channel();
        *self.cmd_tx.lock().unwrap_or_else(|e| e.into_inner()) = Some(cmd_tx);

        let task = WsTask {
            url: self.url.clone(),
            handshake: self.handshake.clone(),
            config: self.config.clone(),
            inbound_tx,
        };
        tokio::spawn(async move {
            task.run(cmd_rx, ready_tx).await;
        });

        ready_rx
            .await
            .map_err(|_| PluginError::WebSocket("websocket task ended before connecting".into()))?
    }

    async fn send(&self, frame: &Value) -> Result<(), PluginError> {
        let (tx, rx) = oneshot::channel();
        let cmd_tx = self
            .cmd_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| PluginError::WebSocket("websocket not connected".into()))?;
        cmd_tx
            .send(WsCommand::Send {
                text: frame.to_string(),
                tx,
            })
            .map_err(|_| PluginError::WebSocket("WS task closed".into()))?;
        rx.await
            .map_err(|_| PluginError::WebSocket("WS send dropped".into()))?
    }

    fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.inbound_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    fn close(&self) {
        if let Some(cmd_tx) = self.cmd_tx.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = cmd_tx.send(WsCommand::Close);
        }
        // Never connected: drop the sender so the receiver ends.
        self.inbound_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.close();
    }
}

/// State owned by the background task.
struct WsTask {
    url: String,
    handshake: Vec<Value>,
    config: WsConfig,
    inbound_tx: mpsc::UnboundedSender<String>,
}

enum Backoff {
    Continue,
    Closed,
}

/// A frame accepted from a caller but not yet written to a socket.
type PendingSend = (String, oneshot::Sender<Result<(), PluginError>>);

impl WsTask {
    async fn run(
        self,
        mut cmd_rx: mpsc::UnboundedReceiver<WsCommand>,
        ready_tx: oneshot::Sender<Result<(), PluginError>>,
    ) {
        let initial = Duration::from_millis(self.config.reconnect_initial_ms);
        let max = Duration::from_millis(self.config.reconnect_max_ms);
        let mut backoff = initial;
        let mut ready = Some(ready_tx);
        let mut failed_attempts = 0u32;
        let mut pending: VecDeque<PendingSend> = VecDeque::new();

        loop {
            tracing::info!(url = %self.url, "connecting websocket");

            let (ws_stream, _) = match tokio_tungstenite::connect_async(self.url.as_str()).await {
                Ok(conn) => conn,
                Err(e) => {
                    failed_attempts += 1;
                    let limit = self.config.initial_connect_attempts;
                    if ready.is_some() && limit > 0 && failed_attempts >= limit {
                        tracing::error!(error = %e, attempts = failed_attempts, "websocket connect failed");
                        if let Some(ready) = ready.take() {
                            let _ = ready.send(Err(PluginError::WebSocket(format!(
                                "failed to connect to {} after {failed_attempts} attempts: {e}",
                                self.url
                            ))));
                        }
                        return;
                    }
                    tracing::warn!(error = %e, "WS connect failed, retrying in {backoff:?}");
                    if let Backoff::Closed =
                        Self::wait_backoff(backoff, &mut cmd_rx, &mut pending).await
                    {
                        return;
                    }
                    backoff = (backoff * 2).min(max);
                    continue;
                }
            };

            backoff = initial;
            let (mut sink, mut stream) = ws_stream.split();

            // Re-establish the listen state on every connection
            let mut handshake_ok = true;
            for frame in &self.handshake {
                if let Err(e) = sink.send(Message::Text(frame.to_string().into())).await {
                    tracing::warn!(error = %e, "failed to send websocket handshake");
                    handshake_ok = false;
                    break;
                }
            }
            if handshake_ok {
                if let Some(ready) = ready.take() {
                    let _ = ready.send(Ok(()));
                }
            }

            // Frames held while disconnected go out after the handshake, in order
            let mut connected = handshake_ok;
            while connected {
                let Some((text, tx)) = pending.pop_front() else {
                    break;
                };
                if let Err(e) = sink.send(Message::Text(text.clone().into())).await {
                    tracing::warn!(error = %e, "failed to flush queued websocket frame");
                    pending.push_front((text, tx));
                    connected = false;
                } else {
                    let _ = tx.send(Ok(()));
                }
            }

            while connected {
                tokio::select! {
                    cmd = cmd_rx.recv() => {
                        match cmd {
                            None | Some(WsCommand::Close) => {
                                let _ = sink.close().await;
                                tracing::debug!(url = %self.url, "websocket closed");
                                return;
                            }
                            Some(WsCommand::Send { text, tx }) => {
                                match sink.send(Message::Text(text.clone().into())).await {
                                    Ok(()) => {
                                        let _ = tx.send(Ok(()));
                                    }
                                    Err(e) => {
                                        tracing::warn!(error = %e, "WS send failed, holding frame for reconnect");
                                        pending.push_back((text, tx));
                                        connected = false;
                                    }
                                }
                            }
                        }
                    }
                    msg = stream.next() => {
                        match msg {
                            None => connected = false,
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "WS receive error");
                                connected = false;
                            }
                            Some(Ok(Message::Text(text))) => {
                                if self.inbound_tx.send(text.as_str().to_string()).is_err() {
                                    tracing::debug!("websocket receiver dropped");
                                }
                            }
                            Some(Ok(Message::Ping(payload))) => {
                                let _ = sink.send(Message::Pong(payload)).await;
                            }
                            Some(Ok(Message::Close(_))) => connected = false,
                            _ => {}
                        }
                    }
                }
            }

            tracing::warn!(url = %self.url, "WS disconnected, reconnecting in {backoff:?}");
            if let Backoff::Closed = Self::wait_backoff(backoff, &mut cmd_rx, &mut pending).await {
                return;
            }
            backoff = (backoff * 2).min(max);
        }
    }

    /// Sleeps for `delay`, holding sends for the next connection and honouring close.
    async fn wait_backoff(
        delay: Duration,
        cmd_rx: &mut mpsc::UnboundedReceiver<WsCommand>,
        pending: &mut VecDeque<PendingSend>,
    ) -> Backoff {
        let sleep = time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return Backoff::Continue,
                cmd = cmd_rx.recv() => match cmd {
                    None | Some(WsCommand::Close) => return Backoff::Closed,
                    Some(WsCommand::Send { text, tx }) => pending.push_back((text, tx)),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::{spawn_event_loop, FrameHandler};
    use crate::{ack_frame, listen_handshake};
    use chainpin_core::JsonObject;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::{accept_async, WebSocketStream};

    type ServerSocket = WebSocketStream<TcpStream>;

    async fn local_server() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        (listener, url)
    }

    async fn accept(listener: &TcpListener) -> ServerSocket {
        let (stream, _) = listener.accept().await.unwrap();
        accept_async(stream).await.unwrap()
    }

    async fn next_json(socket: &mut ServerSocket) -> Value {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("socket ended: {other:?}"),
            }
        }
    }

    async fn send_json(socket: &mut ServerSocket, frame: Value) {
        socket.send(Message::Text(frame.to_string().into())).await.unwrap();
    }

    async fn expect_handshake(socket: &mut ServerSocket) {
        for frame in listen_handshake("topic1") {
            assert_eq!(next_json(socket).await, frame);
        }
    }

    async fn drain(mut socket: ServerSocket) {
        while let Some(Ok(_)) = socket.next().await {}
    }

    fn client(url: &str, reconnect_initial_ms: u64) -> Arc<WsClient> {
        let config = WsConfig {
            reconnect_initial_ms,
            ..Default::default()
        };
        Arc::new(WsClient::new(url, config, listen_handshake("topic1")).unwrap())
    }

    #[test]
    fn url_rewrites_scheme_and_appends_path() {
        assert_eq!(
            websocket_url("http://localhost:12345", "/ws").unwrap(),
            "ws://localhost:12345/ws"
        );
        assert_eq!(
            websocket_url("https://fab.example.com/api/", "/ws").unwrap(),
            "wss://fab.example.com/api/ws"
        );
        assert_eq!(
            websocket_url("http://localhost:12345", "").unwrap(),
            "ws://localhost:12345/"
        );
        assert!(websocket_url("!!!", "").is_err());
        assert!(websocket_url("ftp://host", "").is_err());
    }

    #[test]
    fn config_defaults() {
        let cfg: WsConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(cfg, WsConfig::default());
        assert_eq!(WsConfig::with_path("/ws").path, "/ws");
    }

    #[tokio::test]
    async fn connect_gives_up_after_configured_attempts() {
        let config = WsConfig {
            reconnect_initial_ms: 1,
            reconnect_max_ms: 2,
            initial_connect_attempts: 2,
            ..Default::default()
        };
        let client = WsClient::new("http://127.0.0.1:1", config, vec![]).unwrap();
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, PluginError::WebSocket(_)));
    }

    #[tokio::test]
    async fn close_before_connect_ends_receiver() {
        let client = WsClient::new("http://127.0.0.1:1", WsConfig::default(), vec![]).unwrap();
        let mut rx = client.take_receiver().unwrap();
        assert!(client.take_receiver().is_none());
        client.close();
        assert!(rx.recv().await.is_none());
        assert!(client.send(&json!({"type": "ack"})).await.is_err());
    }

    #[tokio::test]
    async fn frames_sent_while_disconnected_go_out_after_handshake() {
        let (listener, url) = local_server().await;
        let server = tokio::spawn(async move {
            let mut first = accept(&listener).await;
            expect_handshake(&mut first).await;
            send_json(&mut first, json!(["one"])).await;
            let _ = first.close(None).await;
            drop(first);

            let mut second = accept(&listener).await;
            expect_handshake(&mut second).await;
            let held = next_json(&mut second).await;
            send_json(&mut second, json!(["two"])).await;
            drain(second).await;
            held
        });

        let ws = client(&url, 300);
        let mut rx = ws.take_receiver().unwrap();
        ws.connect().await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), r#"["one"]"#);

        // the server has closed; this send lands during the reconnect backoff
        time::sleep(Duration::from_millis(100)).await;
        let sender = ws.clone();
        let ack = tokio::spawn(async move { sender.send(&ack_frame("topic1")).await });

        assert_eq!(rx.recv().await.unwrap(), r#"["two"]"#);
        assert!(ack.await.unwrap().is_ok());
        ws.close();
        assert_eq!(server.await.unwrap(), ack_frame("topic1"));
    }

    #[tokio::test]
    async fn replays_handshake_and_resets_backoff_on_every_reconnect() {
        let (listener, url) = local_server().await;
        let server = tokio::spawn(async move {
            for _ in 0..4 {
                let mut socket = accept(&listener).await;
                expect_handshake(&mut socket).await;
                let _ = socket.close(None).await;
            }
            let mut last = accept(&listener).await;
            expect_handshake(&mut last).await;
            send_json(&mut last, json!(["resumed"])).await;
            drain(last).await;
        });

        let ws = client(&url, 200);
        let mut rx = ws.take_receiver().unwrap();
        let started = Instant::now();
        ws.connect().await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), r#"["resumed"]"#);
        // 4 x 200ms with a reset backoff, 3s if it kept doubling
        assert!(started.elapsed() < Duration::from_millis(2_000));

        ws.close();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn answers_pings() {
        let (listener, url) = local_server().await;
        let server = tokio::spawn(async move {
            let mut socket = accept(&listener).await;
            expect_handshake(&mut socket).await;
            socket.send(Message::Ping(vec![1, 2, 3].into())).await.unwrap();
            loop {
                match socket.next().await {
                    Some(Ok(Message::Pong(payload))) => return payload.to_vec(),
                    Some(Ok(_)) => continue,
                    other => panic!("socket ended: {other:?}"),
                }
            }
        });

        let ws = client(&url, 100);
        ws.connect().await.unwrap();
        assert_eq!(server.await.unwrap(), vec![1, 2, 3]);
        ws.close();
    }

    struct SlowBatches {
        batches: AtomicUsize,
    }

    #[async_trait]
    impl FrameHandler for SlowBatches {
        async fn handle_message_batch(&self, _messages: Vec<Value>) -> Result<(), PluginError> {
            time::sleep(Duration::from_millis(200)).await;
            self.batches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn handle_receipt(&self, _reply: JsonObject) {}
    }

    #[tokio::test]
    async fn event_loop_survives_disconnect_with_ack_in_flight() {
        let (listener, url) = local_server().await;
        let server = tokio::spawn(async move {
            let mut first = accept(&listener).await;
            expect_handshake(&mut first).await;
            send_json(&mut first, json!([])).await;
            let _ = first.close(None).await;
            drop(first);

            let mut second = accept(&listener).await;
            expect_handshake(&mut second).await;
            assert_eq!(next_json(&mut second).await, ack_frame("topic1"));
            send_json(&mut second, json!([])).await;
            assert_eq!(next_json(&mut second).await, ack_frame("topic1"));
            second
        });

        let ws: Arc<dyn WsConnection> = client(&url, 300);
        ws.connect().await.unwrap();
        let handler = Arc::new(SlowBatches {
            batches: AtomicUsize::new(0),
        });
        let handle = spawn_event_loop(ws, handler.clone(), "topic1".into()).unwrap();

        let second = server.await.unwrap();
        assert_eq!(handler.batches.load(Ordering::SeqCst), 2);
        assert!(!handle.is_closed());

        handle.shutdown();
        handle.wait_closed().await;
        drain(second).await;
    }
}
