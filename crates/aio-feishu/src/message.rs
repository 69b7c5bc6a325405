use std::sync::Arc;

use aio_core::{BridgeError, MessageKind, OutboundMessage, SendReceipt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::FeishuApi;
use crate::backend::{ApiRequest, RequestBody};
use crate::card::Card;

pub(crate) const MESSAGES_PATH: &str = "/im/v1/messages";

/// How `receive_id` is interpreted by the messaging endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiveIdType {
    #[default]
    ChatId,
    OpenId,
    UserId,
    UnionId,
    Email,
}

impl ReceiveIdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiveIdType::ChatId => "chat_id",
            ReceiveIdType::OpenId => "open_id",
            ReceiveIdType::UserId => "user_id",
            ReceiveIdType::UnionId => "union_id",
            ReceiveIdType::Email => "email",
        }
    }
}

/// Body of an outbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    Text(String),
    Image { image_key: String },
    File { file_key: String },
    Card(Card),
    /// Card JSON rendered elsewhere.
    RawCard(Value),
    /// Rich-text `post` body, e.g. `{"zh_cn": {"title": .., "content": [..]}}`.
    Post(Value),
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        MessageContent::Text(text.into())
    }

    /// `msg_type` field of the send request.
    pub fn msg_type(&self) -> &'static str {
        match self {
            MessageContent::Text(_) => "text",
            MessageContent::Image { .. } => "image",
            MessageContent::File { .. } => "file",
            MessageContent::Card(_) | MessageContent::RawCard(_) => "interactive",
            MessageContent::Post(_) => "post",
        }
    }

    /// `content` field of the send request: a JSON document encoded as a string.
    pub fn encode(&self) -> String {
        match self {
            MessageContent::Text(text) => json!({ "text": text }).to_string(),
            MessageContent::Image { image_key } => json!({ "image_key": image_key }).to_string(),
            MessageContent::File { file_key } => json!({ "file_key": file_key }).to_string(),
            MessageContent::Card(card) => card.to_value().to_string(),
            MessageContent::RawCard(value) | MessageContent::Post(value) => value.to_string(),
        }
    }
}

impl From<Card> for MessageContent {
    fn from(card: Card) -> Self {
        MessageContent::Card(card)
    }
}

fn string_or_field(payload: &Value, field: &str, kind: MessageKind) -> Result<String, BridgeError> {
    payload
        .as_str()
        .or_else(|| payload[field].as_str())
        .map(String::from)
        .ok_or_else(|| {
            BridgeError::Parsing(format!(
                "{} payload must be a string or carry '{field}'",
                kind.as_str()
            ))
        })
}

impl TryFrom<&OutboundMessage> for MessageContent {
    type Error = BridgeError;

    fn try_from(message: &OutboundMessage) -> Result<Self, Self::Error> {
        let payload = &message.payload;
        match message.kind {
            MessageKind::Text => {
                string_or_field(payload, "text", message.kind).map(MessageContent::Text)
            }
            MessageKind::Image => string_or_field(payload, "image_key", message.kind)
                .map(|image_key| MessageContent::Image { image_key }),
            MessageKind::File => string_or_field(payload, "file_key", message.kind)
                .map(|file_key| MessageContent::File { file_key }),
            MessageKind::Card if payload.is_object() => {
                Ok(MessageContent::RawCard(payload.clone()))
            }
            MessageKind::Post if payload.is_object() => Ok(MessageContent::Post(payload.clone())),
            kind => Err(BridgeError::Parsing(format!(
                "{} payload must be a JSON object",
                kind.as_str()
            ))),
        }
    }
}

/// Sends messages through `POST /im/v1/messages`.
///
/// Sends are never retried: a timed-out POST may still have been delivered.
pub struct MessageSender {
    api: Arc<FeishuApi>,
    receive_id_type: ReceiveIdType,
}

impl MessageSender {
    pub(crate) fn new(api: Arc<FeishuApi>) -> Self {
        Self {
            api,
            receive_id_type: ReceiveIdType::default(),
        }
    }

    pub fn with_receive_id_type(mut self, receive_id_type: ReceiveIdType) -> Self {
        self.receive_id_type = receive_id_type;
        self
    }

    pub fn receive_id_type(&self) -> ReceiveIdType {
        self.receive_id_type
    }

    /// Send `content` to `receiver_id` using the default receive id type.
    pub async fn try_send(
        &self,
        receiver_id: &str,
        content: &MessageContent,
    ) -> Result<SendReceipt, BridgeError> {
        self.try_send_as(self.receive_id_type, receiver_id, content)
            .await
    }

    pub async fn try_send_as(
        &self,
        receive_id_type: ReceiveIdType,
        receiver_id: &str,
        content: &MessageContent,
    ) -> Result<SendReceipt, BridgeError> {
        if receiver_id.is_empty() {
            return Err(BridgeError::Config("receiver id is empty".to_string()));
        }
        let body = json!({
            "receive_id": receiver_id,
            "msg_type": content.msg_type(),
            "content": content.encode(),
        });
        let request = ApiRequest::post(MESSAGES_PATH, RequestBody::Json(body))
            .with_query("receive_id_type", receive_id_type.as_str());
        let data = self.api.call(request, "send_message").await?;
        let message_id = data["message_id"].as_str().unwrap_or("").to_string();
        tracing::debug!(
            receiver_id,
            msg_type = content.msg_type(),
            %message_id,
            "message sent"
        );
        Ok(SendReceipt { message_id })
    }

    /// Like [`try_send`](Self::try_send) but logs the failure and reports
    /// success as a boolean.
    pub async fn send(&self, receiver_id: &str, content: &MessageContent) -> bool {
        match self.try_send(receiver_id, content).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(
                    receiver_id,
                    msg_type = content.msg_type(),
                    error = %e,
                    "failed to send message"
                );
                false
            }
        }
    }

    pub async fn send_text(&self, receiver_id: &str, text: &str) -> bool {
        self.send(receiver_id, &MessageContent::text(text)).await
    }

    pub async fn send_card(&self, receiver_id: &str, card: &Card) -> bool {
        self.send(receiver_id, &MessageContent::Card(card.clone()))
            .await
    }
}
