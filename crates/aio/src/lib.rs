//! AIO: chat-platform integrations for business applications.
//!
//! This crate re-exports the AIO sub-crates and wires them into an
//! [`IntegrationRegistry`](aio_core::IntegrationRegistry).
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `default` | `feishu` |
//! | `feishu` | Feishu/Lark integration |
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use aio::core::{webhook, AdminService, InMemoryStore, WebhookRequest};
//! use aio::feishu::{FeishuConfig, PLATFORM};
//!
//! # async fn example() {
//! let store = Arc::new(InMemoryStore::new());
//! let registry = Arc::new(aio::feishu_registry(
//!     FeishuConfig::new("cli_xxx", "app_secret_xxx"),
//!     store.clone(),
//!     store,
//!     Some("https://erp.example.com".to_string()),
//! ));
//!
//! let reply = webhook::handle_event_callback(
//!     &registry,
//!     PLATFORM,
//!     &WebhookRequest::new(r#"{"type":"url_verification","challenge":"c"}"#),
//! )
//! .await;
//! assert_eq!(reply["challenge"], "c");
//!
//! let admin = AdminService::new(registry, PLATFORM);
//! admin.trigger_sync();
//! # }
//! ```

/// Core traits and types: Integration, IntegrationRegistry, DirectoryMirror,
/// webhook entry points, AdminService, BridgeError.
/// Always available.
pub use aio_core as core;

/// Feishu/Lark: TokenStore, DirectoryFetcher, MessageSender, Card,
/// MediaUploader, EventDispatcher, FeishuIntegration.
#[cfg(feature = "feishu")]
pub use aio_feishu as feishu;

#[cfg(feature = "feishu")]
mod setup {
    use std::sync::Arc;

    use aio_core::{
        DirectoryStore, Integration, IntegrationRegistry, IntegrationRegistryBuilder, MessageStore,
    };
    use aio_feishu::{FeishuConfig, FeishuIntegration, PLATFORM};

    /// Register the Feishu factory on `builder`.
    ///
    /// The integration is constructed on first use; an invalid `config` is
    /// reported then, and the platform stays unavailable until it is fixed.
    pub fn register_feishu(
        builder: IntegrationRegistryBuilder,
        config: FeishuConfig,
        directory_store: Arc<dyn DirectoryStore>,
        message_store: Arc<dyn MessageStore>,
        site_url: Option<String>,
    ) -> IntegrationRegistryBuilder {
        builder.register(PLATFORM, move || {
            let config = config.clone();
            let directory_store = directory_store.clone();
            let message_store = message_store.clone();
            let site_url = site_url.clone();
            async move {
                let mut integration =
                    FeishuIntegration::new(config, directory_store, message_store)?;
                if let Some(site_url) = site_url {
                    integration = integration.with_site_url(site_url);
                }
                Ok(Arc::new(integration) as Arc<dyn Integration>)
            }
        })
    }

    /// A registry holding only the Feishu integration.
    pub fn feishu_registry(
        config: FeishuConfig,
        directory_store: Arc<dyn DirectoryStore>,
        message_store: Arc<dyn MessageStore>,
        site_url: Option<String>,
    ) -> IntegrationRegistry {
        register_feishu(
            IntegrationRegistry::builder(),
            config,
            directory_store,
            message_store,
            site_url,
        )
        .build()
    }
}

#[cfg(feature = "feishu")]
pub use setup::{feishu_registry, register_feishu};
