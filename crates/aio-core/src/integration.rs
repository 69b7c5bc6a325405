use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{BridgeError, Credential, DashboardSummary, SyncReport};

// ---------------------------------------------------------------------------
// Outbound messages
// ---------------------------------------------------------------------------

/// Platform-neutral message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Card,
    File,
    Post,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Card => "card",
            MessageKind::File => "file",
            MessageKind::Post => "post",
        }
    }
}

impl std::str::FromStr for MessageKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageKind::Text),
            "image" => Ok(MessageKind::Image),
            "card" | "interactive" => Ok(MessageKind::Card),
            "file" => Ok(MessageKind::File),
            "post" => Ok(MessageKind::Post),
            other => Err(BridgeError::Parsing(format!("unknown message kind '{other}'"))),
        }
    }
}

/// A message addressed to one receiver.
///
/// `payload` is a plain string for text, a media key (string) for image and
/// file, and a structured object for card and post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub receiver_id: String,
    pub kind: MessageKind,
    pub payload: Value,
}

impl OutboundMessage {
    pub fn new(receiver_id: impl Into<String>, kind: MessageKind, payload: Value) -> Self {
        Self {
            receiver_id: receiver_id.into(),
            kind,
            payload,
        }
    }

    pub fn text(receiver_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(receiver_id, MessageKind::Text, Value::String(text.into()))
    }
}

/// Identifier assigned by the platform to a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub message_id: String,
}

// ---------------------------------------------------------------------------
// Inbound requests
// ---------------------------------------------------------------------------

/// Raw webhook request as handed over by the host's HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct WebhookRequest {
    pub body: Vec<u8>,
    headers: HashMap<String, String>,
}

impl WebhookRequest {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    /// Add a header. Names are matched case-insensitively.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Integration
// ---------------------------------------------------------------------------

/// Contract implemented once per chat platform.
#[async_trait]
pub trait Integration: Send + Sync {
    /// Registry key, e.g. `"feishu"`.
    fn platform(&self) -> &str;

    fn is_enabled(&self) -> bool;

    /// A usable access token, refreshed when stale.
    async fn access_token(&self) -> Result<String, BridgeError>;

    /// Force a new access token regardless of the cached one.
    async fn refresh_token(&self) -> Result<(), BridgeError>;

    /// Snapshot of the cached credential, for the host to persist.
    async fn credential(&self) -> Option<Credential>;

    async fn send_message(&self, message: OutboundMessage) -> Result<SendReceipt, BridgeError>;

    /// Authenticate a raw webhook request before it is parsed.
    fn verify_request(&self, _request: &WebhookRequest) -> Result<(), BridgeError> {
        Ok(())
    }

    /// Handle an event-callback payload and produce the response body.
    async fn handle_event(&self, payload: &Value) -> Result<Value, BridgeError>;

    /// Handle a card-interaction payload and produce the response body.
    async fn handle_card_callback(&self, payload: &Value) -> Result<Value, BridgeError>;

    async fn sync_departments(&self) -> Result<SyncReport, BridgeError>;

    async fn sync_users(&self) -> Result<SyncReport, BridgeError>;

    async fn summary(&self) -> Result<DashboardSummary, BridgeError>;
}
