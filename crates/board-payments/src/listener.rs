//! Completion Listener
//!
//! The checkout page reports back through same-origin cross-window messages.
//! Messages are fanned out by a [`MessageHub`]; each payment dialog holds a
//! [`MessageSubscription`] for as long as it needs one. Dropping the
//! subscription is the unsubscribe.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};

/// A raw cross-window message as delivered by the host environment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Origin of the sender, e.g. `https://board.example:8443`
    pub origin: String,

    /// Message payload
    pub data: Value,
}

impl InboundMessage {
    pub fn new(origin: impl Into<String>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            data,
        }
    }
}

/// Messages the checkout return page sends
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CheckoutMessage {
    #[serde(rename = "payment:completed", rename_all = "camelCase")]
    Completed {
        #[serde(default)]
        plan_id: Option<Value>,
        #[serde(default)]
        order_code: Option<Value>,
    },

    #[serde(rename = "payment:cancel")]
    Cancelled,
}

/// `host[:port]` of an origin, the same form as `window.location.host`
pub fn origin_host(origin: &str) -> Option<String> {
    let url = Url::parse(origin).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Fan-out point for cross-window messages
#[derive(Clone, Debug)]
pub struct MessageHub {
    tx: broadcast::Sender<InboundMessage>,
}

impl Default for MessageHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageHub {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Deliver a message to every live subscription; returns how many received it
    pub fn post(&self, message: InboundMessage) -> usize {
        self.tx.send(message).unwrap_or(0)
    }

    /// Start listening for messages whose origin host equals `expected_host`
    pub fn subscribe(&self, expected_host: impl Into<String>) -> MessageSubscription {
        let expected_host = expected_host.into();
        tracing::debug!(expected_host = %expected_host, "Checkout listener attached");
        MessageSubscription {
            rx: self.tx.subscribe(),
            expected_host,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A scoped listener; unsubscribes when dropped
#[derive(Debug)]
pub struct MessageSubscription {
    rx: broadcast::Receiver<InboundMessage>,
    expected_host: String,
}

impl MessageSubscription {
    /// Next accepted checkout message; `None` once the hub is gone
    ///
    /// Cancel safe: no message is lost if the future is dropped.
    pub async fn recv(&mut self) -> Option<CheckoutMessage> {
        loop {
            match self.rx.recv().await {
                Ok(inbound) => {
                    if let Some(message) = self.accept(&inbound) {
                        return Some(message);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Checkout listener fell behind");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Origin check plus payload decode
    pub fn accept(&self, inbound: &InboundMessage) -> Option<CheckoutMessage> {
        let same_origin = origin_host(&inbound.origin)
            .is_some_and(|host| host.eq_ignore_ascii_case(&self.expected_host));
        if !same_origin {
            tracing::warn!(
                origin = %inbound.origin,
                expected = %self.expected_host,
                "Ignoring message from foreign origin"
            );
            return None;
        }

        match serde_json::from_value(inbound.data.clone()) {
            Ok(message) => Some(message),
            Err(_) => {
                tracing::trace!(data = %inbound.data, "Ignoring unrelated message");
                None
            }
        }
    }

    pub fn expected_host(&self) -> &str {
        &self.expected_host
    }
}

impl Drop for MessageSubscription {
    fn drop(&mut self) {
        tracing::debug!(expected_host = %self.expected_host, "Checkout listener detached");
    }
}
