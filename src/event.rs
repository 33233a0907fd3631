//! JSON event envelope exchanged with the application over WebSocket connections.
//!
//! ```json
//! {"event": "get", "uuid": "…", "parameter": {}, "request": {}, "response": {},
//!  "error": {"code": 0, "desc": ""}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::server::SocketId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventError {
    pub code: i64,
    #[serde(default)]
    pub desc: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event: String,
    #[serde(default)]
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub parameter: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub request: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub response: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EventError>,
}

impl Event {
    /// A server-originated event with a fresh v4 uuid.
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            uuid: Uuid::new_v4().to_string(),
            parameter: Value::Null,
            request: Value::Null,
            response: Value::Null,
            error: None,
        }
    }

    pub fn with_parameter(mut self, parameter: Value) -> Self {
        self.parameter = parameter;
        self
    }

    pub fn with_response(mut self, response: Value) -> Self {
        self.response = response;
        self
    }

    pub fn with_error(mut self, code: i64, desc: impl Into<String>) -> Self {
        self.error = Some(EventError { code, desc: desc.into() });
        self
    }

    /// A missing error object or error code 0.
    pub fn is_success(&self) -> bool {
        self.error.as_ref().is_none_or(|e| e.code == 0)
    }

    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    pub fn to_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Application callbacks for WebSocket connections.
///
/// Called synchronously from the connection state machine, so implementations must
/// hand work off rather than block.
pub trait EventHandler: Send + Sync {
    fn on_open(&self, socket: SocketId, domain: &str);
    fn on_event(&self, socket: SocketId, event: Event);
    fn on_close(&self, socket: SocketId);
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Open { socket: SocketId, domain: String },
    Event { socket: SocketId, event: Event },
    Close { socket: SocketId },
}

/// Forwards every callback into an unbounded channel drained by application workers.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<Inbound>,
}

impl ChannelHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Inbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, inbound: Inbound) {
        if self.tx.send(inbound).is_err() {
            tracing::warn!("event receiver dropped");
        }
    }
}

impl EventHandler for ChannelHandler {
    fn on_open(&self, socket: SocketId, domain: &str) {
        self.forward(Inbound::Open { socket, domain: domain.to_string() });
    }

    fn on_event(&self, socket: SocketId, event: Event) {
        self.forward(Inbound::Event { socket, event });
    }

    fn on_close(&self, socket: SocketId) {
        self.forward(Inbound::Close { socket });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_envelope_uses_defaults() {
        let event = Event::from_slice(br#"{"event":"ping"}"#).unwrap();
        assert_eq!(event.event, "ping");
        assert!(event.parameter.is_null());
        assert!(event.is_success());
    }

    #[test]
    fn nonzero_code_is_failure() {
        let event = Event::new("load").with_error(2, "denied");
        assert!(!event.is_success());
        let json: Value = serde_json::from_slice(&event.to_vec().unwrap()).unwrap();
        assert_eq!(json["error"]["code"], 2);
        assert!(json.get("request").is_none());
    }
}
