// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic catalog-sync usage example.
//!
//! Demonstrates:
//! 1. Wiring a coordinator to a (simulated) catalog sync engine
//! 2. App-launch catch-up with the incremental → full fallback
//! 3. A local edit whose webhook echo is suppressed
//! 4. A remote change that syncs and fans out to a cache and a subscriber
//! 5. Displaying captured metrics
//! 6. Clean shutdown
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

use catalog_sync::{
    Cache, CatalogSyncConfig, CatalogSyncEngine, ChannelSubscriber, CoreEvent, EntityChange,
    EntityType, InvalidationScope, SubscriberCapabilities, SyncCoordinator, SyncError, SyncKind,
    SyncResult, SystemClock, TtlCache, WebhookPayload,
};

/// Pretends to talk to the remote catalog. The first incremental run has no
/// cursor yet; later runs report one changed item.
struct DemoEngine {
    has_cursor: AtomicBool,
}

#[async_trait]
impl CatalogSyncEngine for DemoEngine {
    async fn incremental_sync(&self) -> Result<SyncResult, SyncError> {
        if !self.has_cursor.load(Ordering::SeqCst) {
            return Err(SyncError::NoPreviousSync);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut result = SyncResult::empty(SyncKind::Incremental, Utc::now());
        result.duration_ms = 50;
        result.items_processed = 1;
        result.total_processed = 1;
        result.updated = 1;
        result.changes = vec![EntityChange::updated(EntityType::Item, "item-3")];
        Ok(result)
    }

    async fn full_sync(&self) -> Result<SyncResult, SyncError> {
        tokio::time::sleep(Duration::from_millis(150)).await;
        self.has_cursor.store(true, Ordering::SeqCst);
        let mut result = SyncResult::empty(SyncKind::Full, Utc::now());
        result.duration_ms = 150;
        result.items_processed = 250;
        result.total_processed = 250;
        result.inserted = 250;
        Ok(result)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install metrics recorder (captures everything the coordinator records)
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .map_err(|_| "failed to install metrics recorder")?;

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           catalog-sync: Basic Usage Example                   ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure and spawn the coordinator
    // ─────────────────────────────────────────────────────────────────────────
    let config = CatalogSyncConfig {
        merchant_id: Some("MERCHANT_1".into()),
        echo_window_ms: 5_000,
        ..Default::default()
    };
    let engine = Arc::new(DemoEngine {
        has_cursor: AtomicBool::new(false),
    });
    let coordinator = SyncCoordinator::new(config, engine);
    let mut events = coordinator.subscribe_events();

    let item_cache = Arc::new(
        TtlCache::<String, String>::new("item-details", Duration::from_secs(300), Arc::new(SystemClock))
            .with_scope(InvalidationScope::Entity),
    );
    let (subscriber, mut changes) = ChannelSubscriber::new("detail-view");
    let subscriber = Arc::new(subscriber);
    let propagator = coordinator.propagator();
    propagator.register_cache(item_cache.clone());
    let _token = propagator.register(&subscriber, SubscriberCapabilities::all());

    println!("📦 Coordinator ready. State: {}", coordinator.state());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. App-launch catch-up (no cursor yet → full sync)
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🚀 App launch catch-up...");
    let disposition = coordinator.on_app_launch_catch_up().await?;
    println!("   └─ Disposition: {:?}", disposition);
    let again = coordinator.on_manual_refresh_requested().await?;
    println!("   └─ Manual refresh while busy: {:?}", again);
    coordinator.wait_idle().await?;

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Local edit, then its echo arrives
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n✏️  Editing item-7 locally...");
    coordinator.record_local_operation("item-7").await?;
    let echo = WebhookPayload {
        kind: "catalog_updated".into(),
        event_id: "evt-1".into(),
        merchant_id: "MERCHANT_1".into(),
        updated_at: Utc::now().to_rfc3339(),
    };
    println!("   └─ Echo webhook: {:?}", coordinator.on_webhook_received(echo.clone()).await?);
    println!("   └─ Redelivered:  {:?}", coordinator.on_webhook_received(echo).await?);

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Unrelated remote change
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🌐 Remote change webhook...");
    item_cache.set("item-3".into(), "cached details".into());
    let remote = format!(
        r#"{{"type":"catalog_updated","eventId":"evt-2","merchantId":"MERCHANT_1","updatedAt":"{}"}}"#,
        (Utc::now() + chrono::Duration::minutes(2)).to_rfc3339()
    );
    println!("   └─ Disposition: {:?}", coordinator.on_webhook_json(&remote).await?);
    coordinator.wait_idle().await?;

    println!("   └─ item-3 cached after sync: {:?}", item_cache.get(&"item-3".to_string()));
    while let Ok(change) = changes.try_recv() {
        println!("   └─ Subscriber saw: {}", change);
    }

    println!("\n📣 Events emitted:");
    while let Ok(event) = events.try_recv() {
        match event {
            CoreEvent::SyncCompleted(result) => println!(
                "   └─ SyncCompleted({}, {} items, {}ms)",
                result.kind, result.items_processed, result.duration_ms
            ),
            other => println!("   └─ {:?}", other),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Raw Metrics:");
    dump_metrics(&snapshotter);

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Clean shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛑 Shutting down...");
    coordinator.shutdown().await?;
    println!("   ✅ Shutdown complete!");

    Ok(())
}

/// Dump captured metrics grouped by type
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines: Vec<String> = Vec::new();

    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        let rendered = match value {
            DebugValue::Counter(v) => format!("{}{} = {}", key.name(), label_str, v),
            DebugValue::Gauge(v) => format!("{}{} = {:.2}", key.name(), label_str, v.into_inner()),
            DebugValue::Histogram(samples) => {
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                format!("{}{} count={} sum={:.4}", key.name(), label_str, samples.len(), sum)
            }
        };
        lines.push(rendered);
    }

    lines.sort();
    if lines.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
    for line in lines {
        println!("   └─ {}", line);
    }
}
