use std::sync::Arc;
use std::time::Duration;

use aio_core::{unix_now, BridgeError, Credential};
use serde_json::json;
use tokio::sync::{Mutex, RwLock};

use crate::backend::{ApiRequest, LarkBackend, RequestBody};
use crate::retry::RetryPolicy;

pub(crate) const TOKEN_PATH: &str = "/auth/v3/tenant_access_token/internal";
const DEFAULT_TTL_SECS: i64 = 7200;

/// Tenant access token cache.
///
/// A cached credential is reused while it stays valid for longer than the
/// safety margin. Refreshes are serialized: callers that observe a stale
/// credential queue on `refresh_lock` and re-check the cache once they hold
/// it, so a burst of concurrent callers produces a single remote call.
pub struct TokenStore {
    app_id: String,
    app_secret: String,
    backend: Arc<dyn LarkBackend>,
    margin: Duration,
    retry: RetryPolicy,
    credential: RwLock<Option<Credential>>,
    refresh_lock: Mutex<()>,
}

impl TokenStore {
    pub fn new(
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
        backend: Arc<dyn LarkBackend>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret: app_secret.into(),
            backend,
            margin: Duration::from_secs(300),
            retry: RetryPolicy::default(),
            credential: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn with_margin(mut self, margin: Duration) -> Self {
        self.margin = margin;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Seed the cache with a previously issued credential.
    pub fn with_credential(self, credential: Option<Credential>) -> Self {
        Self {
            credential: RwLock::new(credential),
            ..self
        }
    }

    pub fn margin(&self) -> Duration {
        self.margin
    }

    /// Snapshot of the cached credential.
    pub async fn credential(&self) -> Option<Credential> {
        self.credential.read().await.clone()
    }

    async fn cached(&self) -> Option<String> {
        let guard = self.credential.read().await;
        guard
            .as_ref()
            .filter(|c| c.is_usable(self.margin))
            .map(|c| c.token.clone())
    }

    /// Return a usable token, refreshing it when missing or about to expire.
    pub async fn get_token(&self) -> Result<String, BridgeError> {
        if let Some(token) = self.cached().await {
            return Ok(token);
        }
        let _refreshing = self.refresh_lock.lock().await;
        if let Some(token) = self.cached().await {
            tracing::debug!("token refreshed by a concurrent caller");
            return Ok(token);
        }
        self.fetch_and_store().await
    }

    /// Discard the cached credential and obtain a new one.
    pub async fn refresh(&self) -> Result<String, BridgeError> {
        let _refreshing = self.refresh_lock.lock().await;
        self.fetch_and_store().await
    }

    async fn fetch_and_store(&self) -> Result<String, BridgeError> {
        tracing::debug!(app_id = %self.app_id, "refreshing tenant access token");
        let body = json!({ "app_id": self.app_id, "app_secret": self.app_secret });
        let response = self
            .retry
            .run("tenant_access_token", || async {
                let response = self
                    .backend
                    .send(ApiRequest::post(TOKEN_PATH, RequestBody::Json(body.clone())))
                    .await?;
                if response.status >= 500 {
                    return Err(BridgeError::Transport(format!(
                        "tenant_access_token: HTTP {}",
                        response.status
                    )));
                }
                Ok(response)
            })
            .await?;

        let resp = response.body;
        let code = resp["code"].as_i64().unwrap_or(-1);
        if code != 0 {
            let msg = resp["msg"].as_str().unwrap_or("unknown");
            tracing::error!(code, msg, "tenant access token request rejected");
            return Err(BridgeError::Auth(format!("code={code}: {msg}")));
        }
        let token = match resp["tenant_access_token"].as_str() {
            Some(token) if !token.is_empty() => token.to_string(),
            _ => {
                return Err(BridgeError::Auth(
                    "missing tenant_access_token in response".to_string(),
                ))
            }
        };
        let ttl = resp["expire"].as_i64().unwrap_or(DEFAULT_TTL_SECS);
        let credential = Credential::issued(token.clone(), unix_now(), ttl);
        *self.credential.write().await = Some(credential);
        tracing::info!(expires_in = ttl, "tenant access token refreshed");
        Ok(token)
    }
}
