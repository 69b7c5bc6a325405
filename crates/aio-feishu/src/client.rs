use std::collections::BTreeMap;
use std::sync::Arc;

use aio_core::{
    BridgeError, Credential, DashboardSummary, DirectoryMirror, DirectoryStore, Integration,
    MessageStore, OutboundMessage, SendReceipt, SyncReport, WebhookRequest,
};
use async_trait::async_trait;
use serde_json::Value;

use crate::api::FeishuApi;
use crate::auth::TokenStore;
use crate::backend::{HttpBackend, LarkBackend};
use crate::directory::DirectoryFetcher;
use crate::events::{verify_signature, CardActionHandler, EventDispatcher};
use crate::media::MediaUploader;
use crate::message::{MessageContent, MessageSender};
use crate::FeishuConfig;

/// Registry key of the Feishu integration.
pub const PLATFORM: &str = "feishu";

const RECENT_MESSAGES: usize = 10;

const SIGNATURE_HEADER: &str = "x-lark-signature";
const TIMESTAMP_HEADER: &str = "x-lark-request-timestamp";
const NONCE_HEADER: &str = "x-lark-request-nonce";

/// Feishu implementation of [`Integration`].
pub struct FeishuIntegration {
    config: FeishuConfig,
    site_url: Option<String>,
    tokens: Arc<TokenStore>,
    directory: DirectoryFetcher,
    sender: MessageSender,
    media: MediaUploader,
    dispatcher: EventDispatcher,
    mirror: DirectoryMirror,
    messages: Arc<dyn MessageStore>,
}

impl FeishuIntegration {
    /// Validate `config` and connect through reqwest.
    pub fn new(
        config: FeishuConfig,
        directory_store: Arc<dyn DirectoryStore>,
        message_store: Arc<dyn MessageStore>,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        let backend = HttpBackend::new(config.base_url.clone(), config.request_timeout())?;
        Ok(Self::with_backend(
            config,
            Arc::new(backend),
            directory_store,
            message_store,
        ))
    }

    /// Build on an arbitrary transport, e.g. [`FakeBackend`](crate::FakeBackend).
    pub fn with_backend(
        config: FeishuConfig,
        backend: Arc<dyn LarkBackend>,
        directory_store: Arc<dyn DirectoryStore>,
        message_store: Arc<dyn MessageStore>,
    ) -> Self {
        let retry = config.retry_policy();
        let tokens = Arc::new(
            TokenStore::new(&config.app_id, &config.app_secret, backend.clone())
                .with_margin(config.token_margin())
                .with_retry(retry.clone())
                .with_credential(config.persisted_credential()),
        );
        let api = Arc::new(FeishuApi::new(backend, tokens.clone(), retry));
        let dispatcher = EventDispatcher::new(message_store.clone())
            .with_verification_token(config.verification_token.clone())
            .with_encrypt_key(config.encrypt_key.clone());
        Self {
            directory: DirectoryFetcher::new(
                api.clone(),
                config.page_size,
                config.root_department_id.clone(),
            ),
            sender: MessageSender::new(api.clone()),
            media: MediaUploader::new(api),
            mirror: DirectoryMirror::new(directory_store),
            messages: message_store,
            site_url: None,
            tokens,
            dispatcher,
            config,
        }
    }

    /// Public base URL of the host, used to report the webhook URL.
    pub fn with_site_url(mut self, site_url: impl Into<String>) -> Self {
        self.site_url = Some(site_url.into());
        self
    }

    pub fn with_card_handler(mut self, handler: Arc<dyn CardActionHandler>) -> Self {
        self.dispatcher = self.dispatcher.with_card_handler(handler);
        self
    }

    pub fn config(&self) -> &FeishuConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn directory(&self) -> &DirectoryFetcher {
        &self.directory
    }

    pub fn sender(&self) -> &MessageSender {
        &self.sender
    }

    pub fn media(&self) -> &MediaUploader {
        &self.media
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }
}

#[async_trait]
impl Integration for FeishuIntegration {
    fn platform(&self) -> &str {
        PLATFORM
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn access_token(&self) -> Result<String, BridgeError> {
        self.tokens.get_token().await
    }

    async fn refresh_token(&self) -> Result<(), BridgeError> {
        self.tokens.refresh().await.map(|_| ())
    }

    async fn credential(&self) -> Option<Credential> {
        self.tokens.credential().await
    }

    async fn send_message(&self, message: OutboundMessage) -> Result<SendReceipt, BridgeError> {
        let content = MessageContent::try_from(&message)?;
        self.sender.try_send(&message.receiver_id, &content).await
    }

    /// Checks `X-Lark-Signature` when an encrypt key is configured and the
    /// header is present.
    fn verify_request(&self, request: &WebhookRequest) -> Result<(), BridgeError> {
        let Some(encrypt_key) = self.config.encrypt_key.as_deref().filter(|k| !k.is_empty())
        else {
            return Ok(());
        };
        let Some(signature) = request.header(SIGNATURE_HEADER) else {
            return Ok(());
        };
        let timestamp = request.header(TIMESTAMP_HEADER).unwrap_or_default();
        let nonce = request.header(NONCE_HEADER).unwrap_or_default();
        if verify_signature(timestamp, nonce, encrypt_key, &request.body, signature) {
            Ok(())
        } else {
            Err(BridgeError::Auth("request signature mismatch".to_string()))
        }
    }

    async fn handle_event(&self, payload: &Value) -> Result<Value, BridgeError> {
        self.dispatcher.dispatch(payload).await
    }

    async fn handle_card_callback(&self, payload: &Value) -> Result<Value, BridgeError> {
        self.dispatcher.dispatch_card_action(payload).await
    }

    async fn sync_departments(&self) -> Result<SyncReport, BridgeError> {
        let listing = self.directory.list_units().await;
        let units = self.mirror.reconcile_units(&listing.items).await?;
        tracing::info!(
            fetched = listing.len(),
            inserted = units.inserted,
            updated = units.updated,
            complete = listing.is_complete(),
            "feishu departments synchronized"
        );
        Ok(SyncReport {
            units,
            complete: listing.is_complete(),
            ..Default::default()
        })
    }

    /// Lists the members of the root department and of every active unit.
    /// A member listed under several units is reconciled once.
    async fn sync_users(&self) -> Result<SyncReport, BridgeError> {
        let units = self.directory.list_units().await;
        let mut complete = units.is_complete();
        let mut unit_ids = vec![self.config.root_department_id.clone()];
        unit_ids.extend(
            units
                .items
                .iter()
                .filter(|u| u.active)
                .map(|u| u.remote_id.clone()),
        );

        let mut members = BTreeMap::new();
        for unit_id in &unit_ids {
            let listing = self.directory.list_members(unit_id).await;
            complete &= listing.is_complete();
            for member in listing.items {
                members.entry(member.remote_id.clone()).or_insert(member);
            }
        }
        let members: Vec<_> = members.into_values().collect();
        let report = self.mirror.reconcile_members(&members).await?;
        tracing::info!(
            units = unit_ids.len(),
            fetched = members.len(),
            inserted = report.inserted,
            updated = report.updated,
            complete,
            "feishu users synchronized"
        );
        Ok(SyncReport {
            members: report,
            complete,
            ..Default::default()
        })
    }

    async fn summary(&self) -> Result<DashboardSummary, BridgeError> {
        let store = self.mirror.store();
        Ok(DashboardSummary {
            platform: PLATFORM.to_string(),
            enabled: self.config.enabled,
            webhook_url: self
                .site_url
                .as_deref()
                .map(|site| self.config.webhook_url(site)),
            user_count: store.count_members().await?,
            department_count: store.count_units().await?,
            recent_messages: self.messages.recent_messages(RECENT_MESSAGES).await?,
        })
    }
}
