use std::sync::Arc;
use std::time::Duration;

use aio_core::{
    sync_directory, InMemoryStore, InboundMessageRecord, Integration, MessageStore,
};
use aio_feishu::{FakeBackend, FeishuConfig, FeishuIntegration, RetryPolicy};
use serde_json::{json, Value};

fn config() -> FeishuConfig {
    FeishuConfig::new("cli_test", "secret").with_retry(RetryPolicy {
        max_attempts: 1,
        base_delay: Duration::from_millis(1),
    })
}

fn integration(
    config: FeishuConfig,
    backend: &Arc<FakeBackend>,
    store: &Arc<InMemoryStore>,
) -> FeishuIntegration {
    FeishuIntegration::with_backend(config, backend.clone(), store.clone(), store.clone())
}

fn ok(data: Value) -> Value {
    json!({ "code": 0, "msg": "success", "data": data })
}

fn departments() -> Value {
    ok(json!({
        "has_more": false,
        "items": [
            { "department_id": "d1", "name": "Sales", "parent_department_id": "0",
              "leader_user_id": "u1", "status": { "is_deleted": false } },
            { "department_id": "d2", "name": "EMEA", "parent_department_id": "d1",
              "status": { "is_deleted": false } },
            { "department_id": "d3", "name": "Closed", "parent_department_id": "0",
              "status": { "is_deleted": true } }
        ]
    }))
}

fn users(items: Value) -> Value {
    ok(json!({ "has_more": false, "items": items }))
}

/// Responses for one full run: token (when `with_token`), departments twice
/// (once per phase), then members of the root, d1 and d2.
fn script_full_run(backend: &FakeBackend, with_token: bool) {
    if with_token {
        backend.push_json(json!({ "code": 0, "tenant_access_token": "t-1", "expire": 7200 }));
    }
    backend
        .push_json(departments())
        .push_json(departments())
        .push_json(users(json!([
            { "user_id": "u0", "name": "Founder", "department_ids": ["0"],
              "status": { "is_activated": true } }
        ])))
        .push_json(users(json!([
            { "user_id": "u1", "name": "Lead", "email": "lead@example.com",
              "department_ids": ["d1", "d2"], "status": { "is_activated": true } }
        ])))
        .push_json(users(json!([
            { "user_id": "u1", "name": "Lead", "email": "lead@example.com",
              "department_ids": ["d1", "d2"], "status": { "is_activated": true } },
            { "user_id": "u2", "name": "Former", "department_ids": ["d2"],
              "status": { "is_activated": true, "is_resigned": true } }
        ])));
}

// ── Directory sync ───────────────────────────────────────────────────────────

#[tokio::test]
async fn full_sync_mirrors_directory() {
    let backend = Arc::new(FakeBackend::new());
    let store = Arc::new(InMemoryStore::new());
    script_full_run(&backend, true);
    let feishu = integration(config(), &backend, &store);

    let report = sync_directory(&feishu).await.unwrap().expect("enabled");
    assert!(report.complete);
    assert_eq!(report.units.inserted, 3);
    assert_eq!(report.members.inserted, 3);

    let units = store.units().await;
    assert_eq!(units.len(), 3);
    assert_eq!(units[0].parent_remote_id, None);
    assert_eq!(units[0].leader_remote_id.as_deref(), Some("u1"));
    assert_eq!(units[1].parent_remote_id.as_deref(), Some("d1"));
    assert!(!units[2].active);

    let members = store.members().await;
    let ids: Vec<_> = members.iter().map(|m| m.remote_id.as_str()).collect();
    assert_eq!(ids, ["u0", "u1", "u2"]);
    assert_eq!(members[1].unit_ids.len(), 2);
    assert!(!members[2].active);

    // The deleted department is not scanned for members.
    let scanned: Vec<_> = backend
        .requests()
        .await
        .iter()
        .filter(|r| r.path == "/contact/v3/users/find_by_department")
        .filter_map(|r| r.query_value("department_id").map(String::from))
        .collect();
    assert_eq!(scanned, ["0", "d1", "d2"]);
}

#[tokio::test]
async fn second_run_with_same_data_writes_nothing() {
    let backend = Arc::new(FakeBackend::new());
    let store = Arc::new(InMemoryStore::new());
    script_full_run(&backend, true);
    script_full_run(&backend, false);
    let feishu = integration(config(), &backend, &store);

    sync_directory(&feishu).await.unwrap();
    let writes = store.write_count();
    let report = sync_directory(&feishu).await.unwrap().unwrap();
    assert_eq!(store.write_count(), writes);
    assert_eq!(report.units.writes() + report.members.writes(), 0);
    assert_eq!(report.units.unchanged, 3);
    assert_eq!(report.members.unchanged, 3);
}

#[tokio::test]
async fn disabled_integration_is_skipped() {
    let backend = Arc::new(FakeBackend::new());
    let store = Arc::new(InMemoryStore::new());
    let feishu = integration(config().with_enabled(false), &backend, &store);

    assert!(sync_directory(&feishu).await.unwrap().is_none());
    assert!(backend.requests().await.is_empty());
}

#[tokio::test]
async fn interrupted_listing_marks_report_incomplete() {
    let backend = Arc::new(FakeBackend::new());
    let store = Arc::new(InMemoryStore::new());
    backend
        .push_json(json!({ "code": 0, "tenant_access_token": "t-1", "expire": 7200 }))
        .push_json(departments())
        .push_json(departments())
        .push_json(users(json!([])))
        .push_json(json!({ "code": 40004, "msg": "no dept authority" }))
        .push_json(users(json!([
            { "user_id": "u2", "name": "Rep", "status": { "is_activated": true } }
        ])));
    let feishu = integration(config(), &backend, &store);

    let report = sync_directory(&feishu).await.unwrap().unwrap();
    assert!(!report.complete);
    assert_eq!(report.units.inserted, 3);
    assert_eq!(report.members.inserted, 1);
}

// ── Dashboard ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn summary_reports_counts_and_recent_messages() {
    let backend = Arc::new(FakeBackend::new());
    let store = Arc::new(InMemoryStore::new());
    script_full_run(&backend, true);
    let feishu = integration(config(), &backend, &store).with_site_url("https://erp.example.com");
    sync_directory(&feishu).await.unwrap();

    for i in 0..12 {
        store
            .insert_message(InboundMessageRecord {
                message_id: format!("om_{i}"),
                chat_id: "oc_1".to_string(),
                sender_id: "u1".to_string(),
                content: "{}".to_string(),
                received_at: 1_700_000_000_000 + i,
            })
            .await
            .unwrap();
    }

    let summary = feishu.summary().await.unwrap();
    assert_eq!(summary.platform, "feishu");
    assert!(summary.enabled);
    assert_eq!(summary.department_count, 3);
    assert_eq!(summary.user_count, 3);
    assert_eq!(
        summary.webhook_url.as_deref(),
        Some("https://erp.example.com/api/integrations/feishu/webhook")
    );
    assert_eq!(summary.recent_messages.len(), 10);
    assert_eq!(summary.recent_messages[0].message_id, "om_11");
    assert_eq!(summary.recent_messages[9].message_id, "om_2");
}
