// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync coordinator.
//!
//! The [`SyncCoordinator`] is a cheap, cloneable handle to a single actor
//! task that owns all coordination state:
//! - webhook event deduplication
//! - local-write echo suppression
//! - the single-flight sync state machine (with incremental → full fallback)
//! - fan-out of confirmed changes through the [`UpdatePropagator`]
//!
//! # State machine
//!
//! ```text
//!            trigger accepted              NoPreviousSync
//!   Idle ─────────────────────► SyncingIncremental ─────────► SyncingFull
//!    ▲                                   │                         │
//!    └───── completed / failed / auth ───┴─────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use catalog_sync::{CatalogSyncConfig, SyncCoordinator};
//! # use catalog_sync::engine::{CatalogSyncEngine, SyncError, SyncKind, SyncResult};
//! # struct Engine;
//! # #[async_trait::async_trait]
//! # impl CatalogSyncEngine for Engine {
//! #     async fn incremental_sync(&self) -> Result<SyncResult, SyncError> { Err(SyncError::NoPreviousSync) }
//! #     async fn full_sync(&self) -> Result<SyncResult, SyncError> {
//! #         Ok(SyncResult::empty(SyncKind::Full, chrono::Utc::now()))
//! #     }
//! # }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let coordinator = SyncCoordinator::new(CatalogSyncConfig::default(), Arc::new(Engine));
//! let mut events = coordinator.subscribe_events();
//!
//! let disposition = coordinator.on_app_launch_catch_up().await.unwrap();
//! assert!(disposition.is_started());
//!
//! coordinator.wait_idle().await.unwrap();
//! let _started = events.recv().await;
//! # }
//! ```

mod actor;
mod types;

pub use types::{
    CoordinatorError, CoordinatorStats, CoreEvent, IgnoreReason, SyncState, TriggerDisposition,
    TriggerSource,
};

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::warn;

use crate::change::EntityChange;
use crate::clock::{SharedClock, SystemClock};
use crate::config::CatalogSyncConfig;
use crate::engine::CatalogSyncEngine;
use crate::fanout::UpdatePropagator;
use crate::webhook::{WebhookEvent, WebhookPayload};

use actor::{Command, SyncActor};

/// Handle to a running coordinator.
///
/// Clone freely; every clone talks to the same actor. The actor stops when
/// [`shutdown()`](Self::shutdown) is called or the last handle is dropped.
#[derive(Clone)]
pub struct SyncCoordinator {
    commands: mpsc::Sender<Command>,
    state_rx: watch::Receiver<SyncState>,
    events: broadcast::Sender<CoreEvent>,
    propagator: Arc<UpdatePropagator>,
    clock: SharedClock,
}

impl SyncCoordinator {
    /// Spawn a coordinator on the current Tokio runtime using wall-clock time.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(config: CatalogSyncConfig, engine: Arc<dyn CatalogSyncEngine>) -> Self {
        Self::with_clock(config, engine, Arc::new(SystemClock))
    }

    /// Spawn a coordinator with an injected clock.
    pub fn with_clock(
        config: CatalogSyncConfig,
        engine: Arc<dyn CatalogSyncEngine>,
        clock: SharedClock,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(config.command_queue_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(SyncState::Idle);
        let (events, _) = broadcast::channel(config.event_channel_capacity.max(1));
        let propagator = Arc::new(UpdatePropagator::new());

        let (actor, completions) = SyncActor::new(
            &config,
            engine,
            Arc::clone(&clock),
            Arc::clone(&propagator),
            state_tx,
            events.clone(),
        );
        tokio::spawn(actor.run(commands_rx, completions));

        Self {
            commands: commands_tx,
            state_rx,
            events,
            propagator,
            clock,
        }
    }

    /// Current orchestrator state.
    #[must_use]
    pub fn state(&self) -> SyncState {
        *self.state_rx.borrow()
    }

    /// Watch state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<SyncState> {
        self.state_rx.clone()
    }

    /// Subscribe to outbound [`CoreEvent`]s. Only events sent after this call
    /// are received.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<CoreEvent> {
        self.events.subscribe()
    }

    /// Registry for change subscribers and dependent caches.
    #[must_use]
    pub fn propagator(&self) -> Arc<UpdatePropagator> {
        Arc::clone(&self.propagator)
    }

    /// Handle a raw webhook payload.
    ///
    /// A payload that fails validation is absorbed as
    /// [`IgnoreReason::InvalidPayload`], never returned as an error.
    pub async fn on_webhook_received(
        &self,
        payload: WebhookPayload,
    ) -> Result<TriggerDisposition, CoordinatorError> {
        match WebhookEvent::from_payload(payload) {
            Ok(event) => self.on_webhook_event(event).await,
            Err(e) => Ok(Self::invalid_payload(e)),
        }
    }

    /// Handle a webhook body as delivered over the wire.
    pub async fn on_webhook_json(&self, body: &str) -> Result<TriggerDisposition, CoordinatorError> {
        match WebhookEvent::from_json(body) {
            Ok(event) => self.on_webhook_event(event).await,
            Err(e) => Ok(Self::invalid_payload(e)),
        }
    }

    /// Handle an already validated webhook event.
    pub async fn on_webhook_event(&self, event: WebhookEvent) -> Result<TriggerDisposition, CoordinatorError> {
        self.request(|reply| Command::Webhook { event, reply }).await
    }

    /// App-launch catch-up. Starts at most one sync per coordinator.
    pub async fn on_app_launch_catch_up(&self) -> Result<TriggerDisposition, CoordinatorError> {
        self.trigger(TriggerSource::AppLaunch).await
    }

    /// User-requested refresh. Skips echo suppression, still single-flight.
    pub async fn on_manual_refresh_requested(&self) -> Result<TriggerDisposition, CoordinatorError> {
        self.trigger(TriggerSource::Manual).await
    }

    /// Record a successful local mutation of `entity_id`, timestamped now.
    ///
    /// Call right after the write commits, before its webhook could arrive.
    pub async fn record_local_operation(&self, entity_id: impl Into<String>) -> Result<(), CoordinatorError> {
        let at = self.clock.now();
        self.send(Command::LocalWrite {
            entity_id: entity_id.into(),
            at,
        })
        .await
    }

    /// Fan out a change confirmed outside a sync (e.g. a local edit).
    pub async fn notify_local_change(&self, change: EntityChange) -> Result<(), CoordinatorError> {
        self.send(Command::LocalChange(change)).await
    }

    /// Credentials were refreshed; accept triggers again.
    pub async fn on_reauthenticated(&self) -> Result<(), CoordinatorError> {
        self.send(Command::Reauthenticated).await
    }

    pub async fn stats(&self) -> Result<CoordinatorStats, CoordinatorError> {
        self.request(|reply| Command::Stats { reply }).await
    }

    /// Wait until no sync is in flight.
    pub async fn wait_idle(&self) -> Result<(), CoordinatorError> {
        let mut rx = self.state_rx.clone();
        rx.wait_for(|state| !state.is_syncing())
            .await
            .map(|_| ())
            .map_err(|_| CoordinatorError::Closed)
    }

    /// Stop the actor after the in-flight sync (if any) finishes.
    ///
    /// Other handles get [`CoordinatorError::Closed`] afterwards.
    pub async fn shutdown(&self) -> Result<(), CoordinatorError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    async fn trigger(&self, source: TriggerSource) -> Result<TriggerDisposition, CoordinatorError> {
        self.request(|reply| Command::Trigger { source, reply }).await
    }

    async fn send(&self, command: Command) -> Result<(), CoordinatorError> {
        self.commands.send(command).await.map_err(|_| CoordinatorError::Closed)
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, CoordinatorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(build(reply_tx)).await?;
        reply_rx.await.map_err(|_| CoordinatorError::Closed)
    }

    fn invalid_payload(error: crate::webhook::WebhookError) -> TriggerDisposition {
        warn!(error = %error, "Ignoring invalid webhook payload");
        let disposition = TriggerDisposition::Ignored(IgnoreReason::InvalidPayload(error.to_string()));
        crate::metrics::record_trigger(TriggerSource::Webhook.as_str(), disposition.label());
        disposition
    }
}
