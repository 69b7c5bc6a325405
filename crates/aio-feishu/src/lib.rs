//! Feishu/Lark integration for AIO.
//!
//! This crate implements [`aio_core::Integration`] for the Feishu (Lark) Open Platform:
//!
//! - [`TokenStore`]: tenant access token cache with single-flight refresh
//! - [`DirectoryFetcher`]: paginated department and user listing
//! - [`MessageSender`]: text, image, file, card and rich-post messages
//! - [`Card`]: interactive card builder
//! - [`MediaUploader`]: image and file upload returning media keys
//! - [`EventDispatcher`]: webhook event and card-callback routing
//! - [`FeishuIntegration`]: everything above behind the `Integration` trait
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use aio_core::{InMemoryStore, Integration, OutboundMessage};
//! use aio_feishu::{FeishuConfig, FeishuIntegration};
//!
//! # async fn example() -> Result<(), aio_core::BridgeError> {
//! let store = Arc::new(InMemoryStore::new());
//! let feishu = FeishuIntegration::new(
//!     FeishuConfig::new("cli_xxx", "app_secret_xxx"),
//!     store.clone(),
//!     store,
//! )?;
//! feishu.send_message(OutboundMessage::text("oc_xxx", "hello")).await?;
//! # Ok(())
//! # }
//! ```

mod api;
mod auth;
mod backend;
mod card;
mod client;
mod directory;
mod events;
mod media;
mod message;
mod retry;

pub use auth::TokenStore;
pub use backend::{
    ApiRequest, ApiResponse, FakeBackend, HttpBackend, HttpMethod, LarkBackend, MultipartFile,
    RequestBody,
};
pub use card::{ButtonKind, Card, CardElement, CardHeader, HeaderTemplate, TextStyle};
pub use client::{FeishuIntegration, PLATFORM};
pub use directory::{parse_department, parse_user, DirectoryFetcher};
pub use events::{
    verify_signature, CardAction, CardActionHandler, EventDispatcher, InboundEvent,
    MESSAGE_RECEIVE_EVENT,
};
pub use media::MediaUploader;
pub use message::{MessageContent, MessageSender, ReceiveIdType};
pub use retry::RetryPolicy;

use std::time::Duration;

use aio_core::{join_url, BridgeError, Credential};
use serde::{Deserialize, Serialize};

/// Host path serving the event webhook.
pub const WEBHOOK_PATH: &str = "/api/integrations/feishu/webhook";
/// Host path serving the card-interaction webhook.
pub const CARD_CALLBACK_PATH: &str = "/api/integrations/feishu/card-callback";

/// Feishu application settings, as persisted by the host.
///
/// Obtain `app_id` and `app_secret` from the developer console at
/// <https://open.feishu.cn/app>.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeishuConfig {
    /// Application ID (`cli_xxx`).
    pub app_id: String,
    /// Application secret.
    pub app_secret: String,
    /// Event subscription verification token.
    #[serde(default)]
    pub verification_token: Option<String>,
    /// Event subscription encrypt key. Enables request signature checks and
    /// decryption of `encrypt` callback bodies.
    #[serde(default)]
    pub encrypt_key: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Base URL: `"https://open.feishu.cn/open-apis"` for Feishu (default),
    /// `"https://open.larksuite.com/open-apis"` for Lark.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Previously issued tenant access token.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Expiry of `access_token` in unix seconds.
    #[serde(default)]
    pub token_expiry: Option<i64>,
    /// A cached token is refreshed once it is this close to expiring.
    #[serde(default = "default_token_margin_secs")]
    pub token_margin_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Items requested per directory page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Department whose descendants are synchronized; `"0"` is the tenant root.
    #[serde(default = "default_root_department_id")]
    pub root_department_id: String,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_base_url() -> String {
    "https://open.feishu.cn/open-apis".to_string()
}

fn default_token_margin_secs() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_page_size() -> u32 {
    50
}

fn default_root_department_id() -> String {
    "0".to_string()
}

fn default_retry_attempts() -> usize {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

impl FeishuConfig {
    /// Create a new config targeting the Feishu public cloud.
    pub fn new(app_id: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret: app_secret.into(),
            verification_token: None,
            encrypt_key: None,
            enabled: default_enabled(),
            base_url: default_base_url(),
            access_token: None,
            token_expiry: None,
            token_margin_secs: default_token_margin_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            page_size: default_page_size(),
            root_department_id: default_root_department_id(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }

    /// Override the base URL (e.g. for Lark international or testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_verification_token(mut self, token: impl Into<String>) -> Self {
        self.verification_token = Some(token.into());
        self
    }

    pub fn with_encrypt_key(mut self, key: impl Into<String>) -> Self {
        self.encrypt_key = Some(key.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Seed the token cache with a credential persisted by the host.
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.access_token = Some(credential.token);
        self.token_expiry = Some(credential.expires_at);
        self
    }

    pub fn with_token_margin(mut self, margin: Duration) -> Self {
        self.token_margin_secs = margin.as_secs();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_root_department(mut self, department_id: impl Into<String>) -> Self {
        self.root_department_id = department_id.into();
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry_attempts = policy.max_attempts;
        self.retry_base_delay_ms = policy.base_delay.as_millis() as u64;
        self
    }

    /// Reject settings that cannot possibly authenticate.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.app_id.trim().is_empty() {
            return Err(BridgeError::Config("feishu app_id is empty".to_string()));
        }
        if self.app_secret.trim().is_empty() {
            return Err(BridgeError::Config("feishu app_secret is empty".to_string()));
        }
        if self.base_url.trim().is_empty() {
            return Err(BridgeError::Config("feishu base_url is empty".to_string()));
        }
        Ok(())
    }

    pub fn token_margin(&self) -> Duration {
        Duration::from_secs(self.token_margin_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }

    /// The persisted credential, when both token and expiry are present.
    pub fn persisted_credential(&self) -> Option<Credential> {
        match (&self.access_token, self.token_expiry) {
            (Some(token), Some(expires_at)) if !token.is_empty() => Some(Credential {
                token: token.clone(),
                expires_at,
            }),
            _ => None,
        }
    }

    /// Event webhook URL to register in the developer console.
    pub fn webhook_url(&self, site_url: &str) -> String {
        join_url(site_url, WEBHOOK_PATH)
    }

    /// Card-interaction callback URL to register in the developer console.
    pub fn card_callback_url(&self, site_url: &str) -> String {
        join_url(site_url, CARD_CALLBACK_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_with_defaults() {
        let config: FeishuConfig =
            serde_json::from_str(r#"{"app_id":"cli_1","app_secret":"s"}"#).unwrap();
        assert!(config.enabled);
        assert_eq!(config.base_url, "https://open.feishu.cn/open-apis");
        assert_eq!(config.token_margin(), Duration::from_secs(300));
        assert_eq!(config.page_size, 50);
        assert_eq!(config.root_department_id, "0");
        assert!(config.persisted_credential().is_none());
    }

    #[test]
    fn validate_rejects_missing_credentials() {
        assert!(FeishuConfig::new("", "s").validate().is_err());
        assert!(FeishuConfig::new("cli", " ").validate().is_err());
        assert!(FeishuConfig::new("cli", "s").validate().is_ok());
    }

    #[test]
    fn webhook_urls_derive_from_site() {
        let config = FeishuConfig::new("cli", "s");
        assert_eq!(
            config.webhook_url("https://erp.example.com/"),
            "https://erp.example.com/api/integrations/feishu/webhook"
        );
        assert_eq!(
            config.card_callback_url("https://erp.example.com"),
            "https://erp.example.com/api/integrations/feishu/card-callback"
        );
    }
}
