use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use aio_core::{
    BridgeError, Credential, DashboardSummary, Integration, IntegrationRegistry, OutboundMessage,
    SendReceipt, SyncReport,
};

struct NamedIntegration(&'static str);

#[async_trait]
impl Integration for NamedIntegration {
    fn platform(&self) -> &str {
        self.0
    }
    fn is_enabled(&self) -> bool {
        true
    }
    async fn access_token(&self) -> Result<String, BridgeError> {
        Ok("t".to_string())
    }
    async fn refresh_token(&self) -> Result<(), BridgeError> {
        Ok(())
    }
    async fn credential(&self) -> Option<Credential> {
        None
    }
    async fn send_message(&self, _m: OutboundMessage) -> Result<SendReceipt, BridgeError> {
        Ok(SendReceipt {
            message_id: "m".to_string(),
        })
    }
    async fn handle_event(&self, _p: &Value) -> Result<Value, BridgeError> {
        Ok(json!({}))
    }
    async fn handle_card_callback(&self, _p: &Value) -> Result<Value, BridgeError> {
        Ok(json!({}))
    }
    async fn sync_departments(&self) -> Result<SyncReport, BridgeError> {
        Ok(SyncReport::default())
    }
    async fn sync_users(&self) -> Result<SyncReport, BridgeError> {
        Ok(SyncReport::default())
    }
    async fn summary(&self) -> Result<DashboardSummary, BridgeError> {
        Err(BridgeError::Store("unsupported".to_string()))
    }
}

fn counting_registry(counter: Arc<AtomicUsize>) -> IntegrationRegistry {
    IntegrationRegistry::builder()
        .register("feishu", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(Arc::new(NamedIntegration("feishu")) as Arc<dyn Integration>)
            }
        })
        .build()
}

#[tokio::test]
async fn unknown_platform_returns_none() {
    let registry = counting_registry(Arc::new(AtomicUsize::new(0)));
    assert!(registry.get("dingtalk").await.is_none());
    assert_eq!(registry.platforms(), vec!["feishu"]);
}

#[tokio::test]
async fn constructs_lazily_and_caches() {
    let counter = Arc::new(AtomicUsize::new(0));
    let registry = counting_registry(counter.clone());
    assert!(!registry.is_initialized("feishu"));
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    let first = registry.get("feishu").await.unwrap();
    let second = registry.get("feishu").await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.platform(), "feishu");
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(registry.is_initialized("feishu"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_requests_construct_once() {
    let counter = Arc::new(AtomicUsize::new(0));
    let registry = Arc::new(counting_registry(counter.clone()));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.get("feishu").await })
        })
        .collect();
    let handles: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
}

#[tokio::test]
async fn failed_construction_is_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let registry = IntegrationRegistry::builder()
        .register("feishu", move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(BridgeError::Config("settings missing".to_string()))
                } else {
                    Ok(Arc::new(NamedIntegration("feishu")) as Arc<dyn Integration>)
                }
            }
        })
        .build();

    assert!(registry.get("feishu").await.is_none());
    assert!(!registry.is_initialized("feishu"));
    assert!(registry.get("feishu").await.is_some());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn sync_slot_is_exclusive_per_platform() {
    let registry = counting_registry(Arc::new(AtomicUsize::new(0)));

    let guard = registry.begin_sync("feishu").unwrap();
    assert!(matches!(registry.begin_sync("feishu"), Err(BridgeError::Config(_))));
    assert!(matches!(registry.begin_sync("dingtalk"), Err(BridgeError::Config(_))));

    drop(guard);
    assert!(registry.begin_sync("feishu").is_ok());
}
