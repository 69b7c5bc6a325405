use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::OnceCell;

use crate::{BridgeError, Integration};

type IntegrationFactory =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn Integration>, BridgeError>> + Send + Sync>;

struct RegistryEntry {
    factory: IntegrationFactory,
    instance: OnceCell<Arc<dyn Integration>>,
    sync_running: Arc<AtomicBool>,
}

/// Marks a directory sync as running for one platform until dropped.
pub struct SyncGuard(Arc<AtomicBool>);

impl Drop for SyncGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Builder used to register one factory per platform key.
#[derive(Default)]
pub struct IntegrationRegistryBuilder {
    entries: HashMap<String, RegistryEntry>,
}

impl IntegrationRegistryBuilder {
    /// Register a factory. A later registration for the same key replaces
    /// the earlier one.
    pub fn register<F, Fut>(mut self, platform: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn Integration>, BridgeError>> + Send + 'static,
    {
        let factory: IntegrationFactory = Arc::new(move || factory().boxed());
        self.entries.insert(
            platform.into(),
            RegistryEntry {
                factory,
                instance: OnceCell::new(),
                sync_running: Arc::new(AtomicBool::new(false)),
            },
        );
        self
    }

    pub fn build(self) -> IntegrationRegistry {
        IntegrationRegistry {
            entries: self.entries,
        }
    }
}

/// Holds at most one live integration per platform key.
///
/// Instances are built lazily on the first [`get`](Self::get). Concurrent
/// first requests for the same key wait on a single construction. A failed
/// construction is not cached; the next request tries again.
pub struct IntegrationRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl IntegrationRegistry {
    pub fn builder() -> IntegrationRegistryBuilder {
        IntegrationRegistryBuilder::default()
    }

    /// Registered platform keys, sorted.
    pub fn platforms(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Whether an instance has already been constructed for `platform`.
    pub fn is_initialized(&self, platform: &str) -> bool {
        self.entries
            .get(platform)
            .is_some_and(|entry| entry.instance.initialized())
    }

    /// Claim the directory-sync slot of `platform`.
    ///
    /// At most one guard per platform exists at a time, whichever caller
    /// asks for it.
    pub fn begin_sync(&self, platform: &str) -> Result<SyncGuard, BridgeError> {
        let entry = self.entries.get(platform).ok_or_else(|| {
            BridgeError::Config(format!("{platform} integration is not registered"))
        })?;
        entry
            .sync_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| BridgeError::Config("a directory sync is already running".to_string()))?;
        Ok(SyncGuard(entry.sync_running.clone()))
    }

    /// Return the integration for `platform`, constructing it on first use.
    ///
    /// Unknown keys and failed constructions yield `None`.
    pub async fn get(&self, platform: &str) -> Option<Arc<dyn Integration>> {
        let entry = self.entries.get(platform)?;
        let result = entry
            .instance
            .get_or_try_init(|| {
                tracing::info!(platform, "constructing integration");
                (entry.factory)()
            })
            .await;
        match result {
            Ok(integration) => Some(integration.clone()),
            Err(e) => {
                tracing::error!(platform, error = %e, "failed to construct integration");
                None
            }
        }
    }
}
