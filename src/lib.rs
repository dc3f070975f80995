// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Catalog Sync
//!
//! Webhook-driven synchronization core for a local replica of a remote
//! catalog (items, prices, images).
//!
//! Change notifications arrive at least once, possibly late, out of order,
//! or as echoes of this client's own writes. This crate decides when to run
//! a sync against an external engine and what to invalidate afterwards.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │     Triggers: webhook · app launch · manual · periodic      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │  (bounded command queue)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                SyncCoordinator actor (1 task)               │
//! │  • EventDeduplicator: reject redelivered event ids         │
//! │  • EchoSuppressor: reject echoes of local writes           │
//! │  • single-flight state machine, incremental → full         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                   (spawned engine task, result via channel)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              CatalogSyncEngine (external seam)              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ on success
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      UpdatePropagator                       │
//! │  • invalidate TtlCache / LruCache entries first            │
//! │  • then notify live subscribers, each isolated             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use catalog_sync::{CatalogSyncConfig, CoreEvent, SyncCoordinator};
//! # use catalog_sync::engine::{CatalogSyncEngine, SyncError, SyncKind, SyncResult};
//! # struct MyEngine;
//! # #[async_trait::async_trait]
//! # impl CatalogSyncEngine for MyEngine {
//! #     async fn incremental_sync(&self) -> Result<SyncResult, SyncError> {
//! #         Ok(SyncResult::empty(SyncKind::Incremental, chrono::Utc::now()))
//! #     }
//! #     async fn full_sync(&self) -> Result<SyncResult, SyncError> {
//! #         Ok(SyncResult::empty(SyncKind::Full, chrono::Utc::now()))
//! #     }
//! # }
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = CatalogSyncConfig {
//!         merchant_id: Some("MERCHANT_1".into()),
//!         ..Default::default()
//!     };
//!     let coordinator = SyncCoordinator::new(config, Arc::new(MyEngine));
//!     let mut events = coordinator.subscribe_events();
//!
//!     // After a local edit commits:
//!     coordinator.record_local_operation("item-7").await.unwrap();
//!
//!     // From the push transport:
//!     let body = r#"{"type":"catalog_updated","eventId":"evt-2",
//!                    "merchantId":"MERCHANT_1","updatedAt":"2026-01-01T00:00:00Z"}"#;
//!     let disposition = coordinator.on_webhook_json(body).await.unwrap();
//!     println!("webhook: {disposition:?}");
//!
//!     while let Ok(event) = events.recv().await {
//!         if let CoreEvent::SyncCompleted(result) = event {
//!             println!("synced {} items", result.items_processed);
//!             break;
//!         }
//!     }
//!
//!     coordinator.shutdown().await.unwrap();
//! }
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`]: The [`SyncCoordinator`] handle and its actor
//! - [`dedup`]: Bounded webhook event deduplication
//! - [`echo`]: Local-write echo suppression
//! - [`fanout`]: Change propagation to caches and subscribers
//! - [`cache`]: TTL and LRU caches
//! - [`engine`]: The external sync engine seam
//! - [`push`]: Push-token registration client
//! - [`resilience`]: Retry with backoff for outbound calls

pub mod cache;
pub mod change;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod dedup;
pub mod echo;
pub mod engine;
pub mod fanout;
pub mod metrics;
pub mod push;
pub mod resilience;
pub mod webhook;

pub use cache::{Cache, CacheInvalidation, CacheStats, InvalidationScope, LruCache, TtlCache};
pub use change::{ChangeKind, EntityChange, EntityType};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{CatalogSyncConfig, DedupEviction};
pub use coordinator::{
    CoordinatorError, CoordinatorStats, CoreEvent, IgnoreReason, SyncCoordinator, SyncState,
    TriggerDisposition, TriggerSource,
};
pub use dedup::{DedupStats, EventDeduplicator};
pub use echo::EchoSuppressor;
pub use engine::{CatalogSyncEngine, SyncError, SyncItemError, SyncKind, SyncResult};
pub use fanout::{
    ChangeSubscriber, ChannelSubscriber, FnSubscriber, NotifyReport, SubscriberCapabilities,
    SubscriberError, SubscriberId, SubscriptionToken, UpdatePropagator,
};
pub use push::{PushError, PushTokenRegistrar};
pub use resilience::RetryConfig;
pub use webhook::{EntityKind, WebhookError, WebhookEvent, WebhookPayload};
pub use metrics::LatencyTimer;
