//! chainpin-ws — connector event websocket with auto-reconnect.
//!
//! # Features
//! - Auto-reconnect on disconnect (exponential backoff)
//! - After-connect handshake replayed on every reconnect
//! - Inbound text frames delivered over an mpsc channel
//! - [`WsConnection`] seam for testing connectors without a socket
//! - Shared batch/receipt event loop driving a connector's [`FrameHandler`]

pub mod client;
pub mod event_loop;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use client::{websocket_url, WsClient, WsConfig, WsConnection};
pub use event_loop::{spawn_event_loop, FrameHandler, LoopHandle};

use serde_json::{json, Value};

/// Frames a connector expects after each connect: listen on `topic`, then for replies.
pub fn listen_handshake(topic: &str) -> Vec<Value> {
    vec![
        json!({ "type": "listen", "topic": topic }),
        json!({ "type": "listenreplies" }),
    ]
}

/// Acknowledges a delivered batch on `topic`.
pub fn ack_frame(topic: &str) -> Value {
    json!({ "type": "ack", "topic": topic })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_frames() {
        let hs = listen_handshake("topic1");
        assert_eq!(hs[0], json!({"type": "listen", "topic": "topic1"}));
        assert_eq!(hs[1], json!({"type": "listenreplies"}));
        assert_eq!(ack_frame("topic1"), json!({"type": "ack", "topic": "topic1"}));
    }
}
