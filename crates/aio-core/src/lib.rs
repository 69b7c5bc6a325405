//! Core traits and types shared by AIO platform integrations.
//!
//! - [`Integration`]: the per-platform contract (tokens, messaging, events, directory sync)
//! - [`IntegrationRegistry`]: lazily builds one integration per platform key
//! - [`DirectoryMirror`]: idempotent upsert of directory records into a [`DirectoryStore`]
//! - [`webhook`]: never-failing webhook entry points
//! - [`AdminService`]: refresh-token, test-connection, trigger-sync, send-test-message
//! - [`BridgeError`]: the error type used across every crate

mod admin;
mod config;
mod error;
mod integration;
mod mirror;
mod records;
mod registry;
mod store;
pub mod webhook;

pub use admin::{sync_directory, AdminResponse, AdminService};
pub use config::{ensure_single_enabled, join_url, PlatformRecord};
pub use error::BridgeError;
pub use integration::{
    Integration, MessageKind, OutboundMessage, SendReceipt, WebhookRequest,
};
pub use mirror::DirectoryMirror;
pub use records::{
    unix_now, Credential, DashboardSummary, DirectoryListing, DirectoryMember, DirectoryUnit,
    InboundMessageRecord, ReconcileReport, SyncReport,
};
pub use registry::{IntegrationRegistry, IntegrationRegistryBuilder, SyncGuard};
pub use store::{DirectoryStore, InMemoryStore, MessageStore};
