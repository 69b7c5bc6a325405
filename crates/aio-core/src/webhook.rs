//! Top-level webhook entry points.
//!
//! These never return an error: every failure (bad JSON, unknown platform,
//! rejected signature, handler error) becomes `{"code": -1, "msg": ...}` so the
//! host can always reply with a structured body.

use serde_json::{json, Value};

use crate::{BridgeError, Integration, IntegrationRegistry, WebhookRequest};

/// Generic success acknowledgment.
pub fn success_ack() -> Value {
    json!({ "code": 0, "msg": "success" })
}

/// Structured failure body.
pub fn failure_response(msg: impl std::fmt::Display) -> Value {
    json!({ "code": -1, "msg": msg.to_string() })
}

#[derive(Clone, Copy)]
enum Callback {
    Event,
    Card,
}

impl Callback {
    fn label(self) -> &'static str {
        match self {
            Callback::Event => "event",
            Callback::Card => "card",
        }
    }
}

/// Handle an event callback for `platform`.
pub async fn handle_event_callback(
    registry: &IntegrationRegistry,
    platform: &str,
    request: &WebhookRequest,
) -> Value {
    handle(registry, platform, request, Callback::Event).await
}

/// Handle a card-interaction callback for `platform`.
pub async fn handle_card_callback(
    registry: &IntegrationRegistry,
    platform: &str,
    request: &WebhookRequest,
) -> Value {
    handle(registry, platform, request, Callback::Card).await
}

async fn handle(
    registry: &IntegrationRegistry,
    platform: &str,
    request: &WebhookRequest,
    callback: Callback,
) -> Value {
    let Some(integration) = registry.get(platform).await else {
        tracing::error!(platform, "webhook for uninitialised integration");
        return failure_response(format!("{platform} integration is not initialised"));
    };
    match dispatch(integration.as_ref(), request, callback).await {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(
                platform,
                callback = callback.label(),
                error = %e,
                "webhook handling failed"
            );
            failure_response(e)
        }
    }
}

async fn dispatch(
    integration: &dyn Integration,
    request: &WebhookRequest,
    callback: Callback,
) -> Result<Value, BridgeError> {
    integration.verify_request(request)?;
    let payload: Value = serde_json::from_slice(&request.body)
        .map_err(|e| BridgeError::Parsing(format!("webhook body: {e}")))?;
    match callback {
        Callback::Event => integration.handle_event(&payload).await,
        Callback::Card => integration.handle_card_callback(&payload).await,
    }
}
