use std::borrow::Cow;
use std::sync::Arc;

use aes::Aes256;
use aio_core::webhook::success_ack;
use aio_core::{BridgeError, InboundMessageRecord, MessageStore};
use async_trait::async_trait;
use base64::Engine as _;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

pub const MESSAGE_RECEIVE_EVENT: &str = "im.message.receive_v1";
const URL_VERIFICATION: &str = "url_verification";

/// Check an `X-Lark-Signature` header:
/// `hex(sha256(timestamp + nonce + encrypt_key + body))`.
pub fn verify_signature(
    timestamp: &str,
    nonce: &str,
    encrypt_key: &str,
    body: &[u8],
    signature: &str,
) -> bool {
    let mut hasher = Sha256::new();
    hasher.update(timestamp.as_bytes());
    hasher.update(nonce.as_bytes());
    hasher.update(encrypt_key.as_bytes());
    hasher.update(body);
    hex::encode(hasher.finalize()).eq_ignore_ascii_case(signature.trim())
}

/// Decrypt the `encrypt` field of a callback sent with an encrypt key.
///
/// The field is `base64(iv + AES-256-CBC(body))` with PKCS#7 padding, keyed
/// by `sha256(encrypt_key)`; the plaintext is the JSON callback body.
pub fn decrypt_payload(encrypt_key: &str, encrypt: &str) -> Result<Value, BridgeError> {
    let raw = base64::engine::general_purpose::STANDARD
        .decode(encrypt.trim())
        .map_err(|e| BridgeError::Parsing(format!("encrypted callback is not base64: {e}")))?;
    if raw.len() <= 16 {
        return Err(BridgeError::Parsing("encrypted callback is too short".to_string()));
    }
    let (iv, ciphertext) = raw.split_at(16);
    let key = Sha256::digest(encrypt_key.as_bytes());
    let mut buf = ciphertext.to_vec();
    let plaintext = cbc::Decryptor::<Aes256>::new(&key, iv.into())
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .map_err(|_| {
            BridgeError::Auth("encrypted callback does not match the encrypt key".to_string())
        })?;
    serde_json::from_slice(plaintext)
        .map_err(|e| BridgeError::Parsing(format!("decrypted callback is not JSON: {e}")))
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// `create_time` arrives as a string of unix milliseconds in v2 events.
fn millis(value: &Value) -> i64 {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Inbound events
// ---------------------------------------------------------------------------

/// Classification of an event-callback payload.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Endpoint ownership check; the challenge is echoed back as-is.
    UrlVerification { challenge: Value },
    MessageReceived(InboundMessageRecord),
    /// A message event without a usable message body.
    EmptyMessage,
    Other { event_type: String },
}

impl InboundEvent {
    /// `type` for v1 callbacks, `header.event_type` for v2 ones.
    pub fn event_type(payload: &Value) -> Option<&str> {
        str_at(payload, "/type").or_else(|| str_at(payload, "/header/event_type"))
    }

    pub fn classify(payload: &Value) -> InboundEvent {
        match Self::event_type(payload) {
            Some(URL_VERIFICATION) => InboundEvent::UrlVerification {
                challenge: payload["challenge"].clone(),
            },
            Some(MESSAGE_RECEIVE_EVENT) => Self::message_record(payload)
                .map(InboundEvent::MessageReceived)
                .unwrap_or(InboundEvent::EmptyMessage),
            other => InboundEvent::Other {
                event_type: other.unwrap_or_default().to_string(),
            },
        }
    }

    fn message_record(payload: &Value) -> Option<InboundMessageRecord> {
        let message = payload.pointer("/event/message")?;
        let message_id = str_at(message, "/message_id")?;
        let sender_id = str_at(message, "/sender/sender_id/user_id")
            .or_else(|| str_at(payload, "/event/sender/sender_id/user_id"))
            .unwrap_or_default();
        Some(InboundMessageRecord {
            message_id: message_id.to_string(),
            chat_id: str_at(message, "/chat_id").unwrap_or_default().to_string(),
            sender_id: sender_id.to_string(),
            content: message["content"].as_str().unwrap_or_default().to_string(),
            received_at: millis(&message["create_time"]),
        })
    }
}

// ---------------------------------------------------------------------------
// Card actions
// ---------------------------------------------------------------------------

/// A button press (or other interaction) on a card sent by this app.
#[derive(Debug, Clone, PartialEq)]
pub struct CardAction {
    pub tag: String,
    /// The `value` given to the button when the card was built.
    pub value: Value,
    pub open_id: Option<String>,
    pub user_id: Option<String>,
    pub message_id: Option<String>,
    pub chat_id: Option<String>,
}

impl CardAction {
    /// Read both the flat v1 callback layout and the v2 `event` envelope.
    pub fn from_payload(payload: &Value) -> Option<CardAction> {
        let owned = |s: Option<&str>| s.map(String::from);
        if let Some(event) = payload.get("event").filter(|e| e.get("action").is_some()) {
            let action = &event["action"];
            return Some(CardAction {
                tag: action["tag"].as_str().unwrap_or_default().to_string(),
                value: action["value"].clone(),
                open_id: owned(str_at(event, "/operator/open_id")),
                user_id: owned(str_at(event, "/operator/user_id")),
                message_id: owned(str_at(event, "/context/open_message_id")),
                chat_id: owned(str_at(event, "/context/open_chat_id")),
            });
        }
        let action = payload.get("action")?;
        Some(CardAction {
            tag: action["tag"].as_str().unwrap_or_default().to_string(),
            value: action["value"].clone(),
            open_id: owned(str_at(payload, "/open_id")),
            user_id: owned(str_at(payload, "/user_id")),
            message_id: owned(str_at(payload, "/open_message_id")),
            chat_id: owned(str_at(payload, "/open_chat_id")),
        })
    }
}

/// Host hook for card interactions.
///
/// The returned JSON (a toast, or a replacement card) is sent back as the
/// callback response; `None` answers with `{}`.
#[async_trait]
pub trait CardActionHandler: Send + Sync {
    async fn handle(&self, action: CardAction) -> Result<Option<Value>, BridgeError>;
}

// ---------------------------------------------------------------------------
// EventDispatcher
// ---------------------------------------------------------------------------

/// Routes parsed webhook payloads.
pub struct EventDispatcher {
    messages: Arc<dyn MessageStore>,
    verification_token: Option<String>,
    encrypt_key: Option<String>,
    card_handler: Option<Arc<dyn CardActionHandler>>,
}

impl EventDispatcher {
    pub fn new(messages: Arc<dyn MessageStore>) -> Self {
        Self {
            messages,
            verification_token: None,
            encrypt_key: None,
            card_handler: None,
        }
    }

    /// Reject payloads whose `token` differs from `token`.
    pub fn with_verification_token(mut self, token: Option<String>) -> Self {
        self.verification_token = token.filter(|t| !t.is_empty());
        self
    }

    /// Decrypt payloads that carry an `encrypt` field with `key`.
    pub fn with_encrypt_key(mut self, key: Option<String>) -> Self {
        self.encrypt_key = key.filter(|k| !k.is_empty());
        self
    }

    pub fn with_card_handler(mut self, handler: Arc<dyn CardActionHandler>) -> Self {
        self.card_handler = Some(handler);
        self
    }

    /// Decrypt `payload` if needed, then check its verification token.
    fn open_payload<'a>(&self, payload: &'a Value) -> Result<Cow<'a, Value>, BridgeError> {
        let payload = match payload.get("encrypt") {
            Some(encrypt) => {
                let Some(key) = &self.encrypt_key else {
                    return Err(BridgeError::Config(
                        "encrypted callback received but no encrypt key is configured"
                            .to_string(),
                    ));
                };
                let encrypt = encrypt.as_str().ok_or_else(|| {
                    BridgeError::Parsing("`encrypt` is not a string".to_string())
                })?;
                Cow::Owned(decrypt_payload(key, encrypt)?)
            }
            None => Cow::Borrowed(payload),
        };
        if let Some(expected) = &self.verification_token {
            let token = str_at(&payload, "/token").or_else(|| str_at(&payload, "/header/token"));
            if token != Some(expected.as_str()) {
                return Err(BridgeError::Auth("verification token mismatch".to_string()));
            }
        }
        Ok(payload)
    }

    /// Handle an event-callback payload and return the response body.
    pub async fn dispatch(&self, payload: &Value) -> Result<Value, BridgeError> {
        let payload = self.open_payload(payload)?;
        match InboundEvent::classify(&payload) {
            InboundEvent::UrlVerification { challenge } => {
                tracing::info!("answering url verification challenge");
                Ok(json!({ "challenge": challenge }))
            }
            InboundEvent::MessageReceived(record) => {
                let message_id = record.message_id.clone();
                if self.messages.insert_message(record).await? {
                    tracing::debug!(%message_id, "inbound message stored");
                } else {
                    tracing::debug!(%message_id, "duplicate delivery ignored");
                }
                Ok(success_ack())
            }
            InboundEvent::EmptyMessage => {
                tracing::debug!("message event without message body");
                Ok(success_ack())
            }
            InboundEvent::Other { event_type } => {
                tracing::debug!(%event_type, "unhandled event type");
                Ok(success_ack())
            }
        }
    }

    /// Handle a card-interaction payload and return the response body.
    pub async fn dispatch_card_action(&self, payload: &Value) -> Result<Value, BridgeError> {
        let payload = self.open_payload(payload)?;
        if let InboundEvent::UrlVerification { challenge } = InboundEvent::classify(&payload) {
            return Ok(json!({ "challenge": challenge }));
        }
        let Some(action) = CardAction::from_payload(&payload) else {
            tracing::debug!("card callback without action");
            return Ok(json!({}));
        };
        let Some(handler) = &self.card_handler else {
            tracing::debug!(tag = %action.tag, "no card action handler registered");
            return Ok(json!({}));
        };
        Ok(handler.handle(action).await?.unwrap_or_else(|| json!({})))
    }
}
