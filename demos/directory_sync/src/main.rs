use std::sync::Arc;

use aio::core::{sync_directory, AdminService, BridgeError, InMemoryStore, Integration};
use aio::feishu::{FeishuConfig, PLATFORM};

#[tokio::main]
async fn main() -> Result<(), BridgeError> {
    tracing_subscriber::fmt::init();

    let app_id = std::env::var("FEISHU_APP_ID")
        .map_err(|_| BridgeError::Config("FEISHU_APP_ID is not set".to_string()))?;
    let app_secret = std::env::var("FEISHU_APP_SECRET")
        .map_err(|_| BridgeError::Config("FEISHU_APP_SECRET is not set".to_string()))?;

    let store = Arc::new(InMemoryStore::new());
    let registry = Arc::new(aio::feishu_registry(
        FeishuConfig::new(app_id, app_secret),
        store.clone(),
        store.clone(),
        std::env::var("SITE_URL").ok(),
    ));

    // --- Connection check ---
    println!("=== Test Connection ===");
    let admin = AdminService::new(registry.clone(), PLATFORM);
    let response = admin.test_connection().await;
    println!("{}", serde_json::to_string(&response).unwrap_or_default());
    if !response.success {
        return Ok(());
    }

    // --- Directory sync ---
    println!("\n=== Directory Sync ===");
    let Some(feishu) = registry.get(PLATFORM).await else {
        return Err(BridgeError::Config("feishu integration unavailable".to_string()));
    };
    match sync_directory(feishu.as_ref()).await? {
        Some(report) => println!(
            "units: +{} ~{} ={}  members: +{} ~{} ={}  complete: {}",
            report.units.inserted,
            report.units.updated,
            report.units.unchanged,
            report.members.inserted,
            report.members.updated,
            report.members.unchanged,
            report.complete
        ),
        None => println!("integration disabled, nothing to do"),
    }

    for unit in store.units().await.iter().take(10) {
        println!("  [{}] {}", unit.remote_id, unit.display_name);
    }

    // --- Optional test message ---
    if let Ok(chat_id) = std::env::var("FEISHU_CHAT_ID") {
        println!("\n=== Test Message ===");
        let response = admin
            .send_test_message(&chat_id, "Directory sync finished")
            .await;
        println!("{}", serde_json::to_string(&response).unwrap_or_default());
    }

    // --- Dashboard ---
    println!("\n=== Summary ===");
    let summary = feishu.summary().await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).unwrap_or_default()
    );

    Ok(())
}
