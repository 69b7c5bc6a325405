use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::{BridgeError, Integration, IntegrationRegistry, OutboundMessage, SyncReport};

/// Response body for administrative operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AdminResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

impl From<Result<(), BridgeError>> for AdminResponse {
    fn from(result: Result<(), BridgeError>) -> Self {
        match result {
            Ok(()) => AdminResponse::ok(),
            Err(e) => AdminResponse::failed(e.to_string()),
        }
    }
}

/// Run a full directory synchronization: departments first, then users.
///
/// Returns `Ok(None)` without touching the remote API when the integration
/// is disabled.
pub async fn sync_directory(
    integration: &dyn Integration,
) -> Result<Option<SyncReport>, BridgeError> {
    let platform = integration.platform();
    if !integration.is_enabled() {
        tracing::info!(platform, "integration disabled, skipping directory sync");
        return Ok(None);
    }
    let mut report = integration.sync_departments().await?;
    report.merge(integration.sync_users().await?);
    if report.complete {
        tracing::info!(
            platform,
            units_written = report.units.writes(),
            members_written = report.members.writes(),
            "directory sync finished"
        );
    } else {
        tracing::warn!(
            platform,
            units_written = report.units.writes(),
            members_written = report.members.writes(),
            "directory sync finished with incomplete listings"
        );
    }
    Ok(Some(report))
}

/// Administrative operations for one platform, backed by the registry.
pub struct AdminService {
    registry: Arc<IntegrationRegistry>,
    platform: String,
}

impl AdminService {
    pub fn new(registry: Arc<IntegrationRegistry>, platform: impl Into<String>) -> Self {
        Self {
            registry,
            platform: platform.into(),
        }
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    async fn integration(&self) -> Result<Arc<dyn Integration>, BridgeError> {
        self.registry.get(&self.platform).await.ok_or_else(|| {
            BridgeError::Config(format!("{} integration is not initialised", self.platform))
        })
    }

    fn report(&self, op: &str, result: Result<(), BridgeError>) -> AdminResponse {
        if let Err(e) = &result {
            tracing::error!(platform = %self.platform, op, error = %e, "admin operation failed");
        }
        result.into()
    }

    /// Force a fresh access token.
    pub async fn refresh_token(&self) -> AdminResponse {
        let result = async { self.integration().await?.refresh_token().await }.await;
        self.report("refresh_token", result)
    }

    /// Check that an access token can be obtained.
    pub async fn test_connection(&self) -> AdminResponse {
        let result = async {
            self.integration().await?.access_token().await?;
            Ok::<(), BridgeError>(())
        }
        .await;
        self.report("test_connection", result)
    }

    /// Send a plain-text message to `chat_id`.
    pub async fn send_test_message(&self, chat_id: &str, content: &str) -> AdminResponse {
        let result = async {
            let receipt = self
                .integration()
                .await?
                .send_message(OutboundMessage::text(chat_id, content))
                .await?;
            tracing::info!(
                platform = %self.platform,
                message_id = %receipt.message_id,
                "test message sent"
            );
            Ok::<(), BridgeError>(())
        }
        .await;
        self.report("send_test_message", result)
    }

    /// Start a background directory sync on the current tokio runtime.
    ///
    /// Fails when the platform is unknown or a sync for it is still running,
    /// including one started through another `AdminService`.
    pub fn spawn_sync(&self) -> Result<JoinHandle<Option<SyncReport>>, BridgeError> {
        let guard = self.registry.begin_sync(&self.platform)?;
        let registry = self.registry.clone();
        let platform = self.platform.clone();
        Ok(tokio::spawn(async move {
            let _guard = guard;
            let Some(integration) = registry.get(&platform).await else {
                tracing::error!(
                    platform = %platform,
                    "directory sync: integration is not initialised"
                );
                return None;
            };
            match sync_directory(integration.as_ref()).await {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(platform = %platform, error = %e, "directory sync failed");
                    None
                }
            }
        }))
    }

    /// Enqueue a background directory sync.
    pub fn trigger_sync(&self) -> AdminResponse {
        let result = self.spawn_sync().map(|_| ());
        self.report("trigger_sync", result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_response_serialization() {
        let ok = serde_json::to_value(AdminResponse::ok()).unwrap();
        assert_eq!(ok, serde_json::json!({ "success": true }));
        let failed = serde_json::to_value(AdminResponse::failed("boom")).unwrap();
        assert_eq!(failed, serde_json::json!({ "success": false, "error": "boom" }));
    }
}
