// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The coordinator's serialized event processor.
//!
//! Every state transition, dedup/echo check and fan-out dispatch happens on
//! this one task. Sync work runs in a spawned task and reports back through
//! the completion channel, so the loop keeps answering triggers (mostly with
//! `SyncInProgress`) while the engine works.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::types::{
    CoordinatorStats, CoreEvent, IgnoreReason, SyncState, TriggerDisposition, TriggerSource,
};
use crate::change::EntityChange;
use crate::clock::SharedClock;
use crate::config::CatalogSyncConfig;
use crate::dedup::EventDeduplicator;
use crate::echo::EchoSuppressor;
use crate::engine::{CatalogSyncEngine, SyncError, SyncKind, SyncResult};
use crate::fanout::UpdatePropagator;
use crate::metrics::LatencyTimer;
use crate::webhook::WebhookEvent;

pub(super) enum Command {
    Webhook {
        event: WebhookEvent,
        reply: oneshot::Sender<TriggerDisposition>,
    },
    Trigger {
        source: TriggerSource,
        reply: oneshot::Sender<TriggerDisposition>,
    },
    LocalWrite {
        entity_id: String,
        at: DateTime<Utc>,
    },
    LocalChange(EntityChange),
    Reauthenticated,
    Stats {
        reply: oneshot::Sender<CoordinatorStats>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Engine run finished (or died).
pub(super) struct SyncCompletion {
    kind: SyncKind,
    outcome: Result<SyncResult, SyncError>,
}

/// The trigger lifecycle currently holding the single-flight slot.
#[derive(Debug, Clone, Copy)]
struct InFlight {
    source: TriggerSource,
    kind: SyncKind,
}

pub(super) struct SyncActor {
    engine: Arc<dyn CatalogSyncEngine>,
    merchant_id: Option<String>,
    dedup: EventDeduplicator,
    echo: EchoSuppressor,
    propagator: Arc<UpdatePropagator>,
    state_tx: watch::Sender<SyncState>,
    events: broadcast::Sender<CoreEvent>,
    completions_tx: mpsc::UnboundedSender<SyncCompletion>,
    catch_up_interval: Option<Duration>,
    in_flight: Option<InFlight>,
    auth_blocked: bool,
    catch_up_ran: bool,
}

impl SyncActor {
    pub(super) fn new(
        config: &CatalogSyncConfig,
        engine: Arc<dyn CatalogSyncEngine>,
        clock: SharedClock,
        propagator: Arc<UpdatePropagator>,
        state_tx: watch::Sender<SyncState>,
        events: broadcast::Sender<CoreEvent>,
    ) -> (Self, mpsc::UnboundedReceiver<SyncCompletion>) {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let actor = Self {
            engine,
            merchant_id: config.merchant_id.clone(),
            dedup: EventDeduplicator::from_config(config, clock.clone()),
            echo: EchoSuppressor::new(config.echo_window(), clock),
            propagator,
            state_tx,
            events,
            completions_tx,
            catch_up_interval: config.catch_up_interval(),
            in_flight: None,
            auth_blocked: false,
            catch_up_ran: false,
        };
        (actor, completions_rx)
    }

    /// Run until shut down or every handle is dropped.
    pub(super) async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut completions: mpsc::UnboundedReceiver<SyncCompletion>,
    ) {
        let mut catch_up = self.catch_up_interval.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });

        info!(catch_up = ?self.catch_up_interval, "Sync coordinator running");
        crate::metrics::set_sync_state(SyncState::Idle.as_u8());
        crate::metrics::set_auth_blocked(false);

        let shutdown_reply = loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => break Some(reply),
                    Some(command) => self.handle_command(command),
                    None => break None,
                },

                Some(completion) = completions.recv() => {
                    self.on_sync_finished(completion);
                }

                _ = async {
                    match catch_up.as_mut() {
                        Some(ticker) => { ticker.tick().await; }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    let disposition = self.handle_trigger(TriggerSource::Periodic);
                    debug!(disposition = ?disposition, "Periodic catch-up trigger");
                }
            }
        };

        // No cancellation: let the current lifecycle (including a fallback)
        // reach its terminal event before stopping.
        while self.in_flight.is_some() {
            match completions.recv().await {
                Some(completion) => self.on_sync_finished(completion),
                None => break,
            }
        }

        info!("Sync coordinator stopped");
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Webhook { event, reply } => {
                let disposition = self.handle_webhook(&event);
                let _ = reply.send(disposition);
            }
            Command::Trigger { source, reply } => {
                let disposition = self.handle_trigger(source);
                let _ = reply.send(disposition);
            }
            Command::LocalWrite { entity_id, at } => {
                self.echo.record_local_write(entity_id, at);
            }
            Command::LocalChange(change) => {
                self.dispatch_changes(std::slice::from_ref(&change));
            }
            Command::Reauthenticated => {
                if self.auth_blocked {
                    info!("Re-authenticated, triggers unblocked");
                }
                self.auth_blocked = false;
                crate::metrics::set_auth_blocked(false);
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            // Handled by the run loop
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    #[tracing::instrument(skip(self, event), fields(event_id = %event.event_id, kind = %event.entity_kind))]
    fn handle_webhook(&mut self, event: &WebhookEvent) -> TriggerDisposition {
        let disposition = self.admit_webhook(event);
        crate::metrics::record_trigger(TriggerSource::Webhook.as_str(), disposition.label());
        match &disposition {
            TriggerDisposition::Started(_) => info!("Webhook accepted, sync started"),
            other => debug!(disposition = ?other, "Webhook absorbed"),
        }
        disposition
    }

    fn admit_webhook(&mut self, event: &WebhookEvent) -> TriggerDisposition {
        if let Some(expected) = &self.merchant_id {
            if &event.merchant_id != expected {
                return TriggerDisposition::Ignored(IgnoreReason::ForeignMerchant(event.merchant_id.clone()));
            }
        }

        if self.dedup.is_duplicate(&event.event_id) {
            return TriggerDisposition::Duplicate;
        }

        // Echoes are marked so a redelivery is a plain duplicate.
        if self.echo.is_echo(event.remote_timestamp) {
            self.dedup.mark_processed(&event.event_id);
            return TriggerDisposition::EchoSuppressed;
        }

        // Not marked: a redelivery after re-auth or after the running sync
        // may still start one.
        if let Some(rejected) = self.check_admission() {
            return rejected;
        }

        self.dedup.mark_processed(&event.event_id);
        self.start(TriggerSource::Webhook)
    }

    fn handle_trigger(&mut self, source: TriggerSource) -> TriggerDisposition {
        let disposition = match source {
            TriggerSource::AppLaunch if self.catch_up_ran => {
                TriggerDisposition::Ignored(IgnoreReason::CatchUpAlreadyRan)
            }
            TriggerSource::AppLaunch => match self.check_admission() {
                Some(rejected) => rejected,
                None => {
                    self.catch_up_ran = true;
                    self.start(source)
                }
            },
            _ => match self.check_admission() {
                Some(rejected) => rejected,
                None => self.start(source),
            },
        };

        crate::metrics::record_trigger(source.as_str(), disposition.label());
        debug!(source = %source, disposition = ?disposition, "Trigger handled");
        disposition
    }

    /// Auth block, then single-flight.
    fn check_admission(&self) -> Option<TriggerDisposition> {
        if self.auth_blocked {
            return Some(TriggerDisposition::AuthenticationRequired);
        }
        if self.in_flight.is_some() {
            return Some(TriggerDisposition::SyncInProgress);
        }
        None
    }

    fn start(&mut self, source: TriggerSource) -> TriggerDisposition {
        let kind = SyncKind::Incremental;
        self.in_flight = Some(InFlight { source, kind });
        self.set_state(SyncState::SyncingIncremental);
        self.emit(CoreEvent::SyncStarted { source, kind });
        self.spawn_sync(kind);
        TriggerDisposition::Started(kind)
    }

    fn spawn_sync(&self, kind: SyncKind) {
        let engine = Arc::clone(&self.engine);
        let completions = self.completions_tx.clone();
        crate::metrics::record_sync_attempt(kind.as_str());

        tokio::spawn(async move {
            let timer = LatencyTimer::new(kind.as_str());
            // Inner task so an engine panic surfaces as a JoinError.
            let run = tokio::spawn(async move {
                match kind {
                    SyncKind::Incremental => engine.incremental_sync().await,
                    SyncKind::Full => engine.full_sync().await,
                }
            });
            let outcome = match run.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => Err(SyncError::Internal(format!("{kind} sync panicked"))),
                Err(e) => Err(SyncError::Internal(e.to_string())),
            };
            drop(timer);
            let _ = completions.send(SyncCompletion { kind, outcome });
        });
    }

    fn on_sync_finished(&mut self, completion: SyncCompletion) {
        let Some(flight) = self.in_flight.take() else {
            warn!(kind = %completion.kind, "Sync completion with no sync in flight, ignoring");
            return;
        };
        let SyncCompletion { kind, outcome } = completion;
        if flight.kind != kind {
            warn!(expected = %flight.kind, got = %kind, "Sync completion kind mismatch");
        }

        match outcome {
            Ok(result) => {
                crate::metrics::record_sync_outcome(kind.as_str(), "success");
                crate::metrics::record_items_processed(kind.as_str(), result.items_processed);
                info!(
                    source = %flight.source,
                    kind = %kind,
                    items = result.items_processed,
                    inserted = result.inserted,
                    updated = result.updated,
                    deleted = result.deleted,
                    item_errors = result.errors.len(),
                    duration_ms = result.duration_ms,
                    "Sync completed"
                );
                self.finish_success(result);
            }
            Err(SyncError::NoPreviousSync) if kind == SyncKind::Incremental => {
                info!(source = %flight.source, "No previous sync cursor, falling back to full sync");
                crate::metrics::record_sync_outcome(kind.as_str(), "fallback");
                crate::metrics::record_full_sync_fallback();
                self.in_flight = Some(InFlight {
                    kind: SyncKind::Full,
                    ..flight
                });
                self.set_state(SyncState::SyncingFull);
                self.spawn_sync(SyncKind::Full);
            }
            Err(SyncError::AuthenticationFailed(reason)) => {
                crate::metrics::record_sync_outcome(kind.as_str(), "error");
                warn!(kind = %kind, reason = %reason, "Credentials rejected, blocking triggers until re-authentication");
                self.auth_blocked = true;
                crate::metrics::set_auth_blocked(true);
                self.emit(CoreEvent::AuthenticationInvalid { reason });
                self.set_state(SyncState::Idle);
            }
            Err(error) => {
                crate::metrics::record_sync_outcome(kind.as_str(), "error");
                warn!(source = %flight.source, kind = %kind, error = %error, "Sync failed");
                self.emit(CoreEvent::SyncFailed { kind, error });
                self.set_state(SyncState::Idle);
            }
        }
    }

    fn finish_success(&mut self, result: SyncResult) {
        let changes = result.changes.clone();
        let images = result.touched_images();
        // No per-entity detail to scope by, so drop everything.
        let clear_everything =
            result.kind == SyncKind::Full || (changes.is_empty() && result.has_changes());

        self.emit(CoreEvent::SyncCompleted(result));

        if clear_everything {
            let cleared = self.propagator.invalidate_all_caches();
            debug!(cleared, "Cleared all registered caches");
        }
        self.dispatch_changes(&changes);
        // A full clear drops image caches too.
        if images || clear_everything {
            self.emit(CoreEvent::ImagesInvalidated);
        }

        self.set_state(SyncState::Idle);
    }

    fn dispatch_changes(&self, changes: &[EntityChange]) {
        if changes.is_empty() {
            return;
        }
        let report = self.propagator.notify_all(changes);
        if report.failed > 0 {
            debug!(changes = changes.len(), failed = report.failed, "Some subscribers failed");
        }
        for change in changes {
            self.emit(CoreEvent::EntityChanged {
                kind: change.kind,
                entity_type: change.entity_type,
                entity_id: change.entity_id.clone(),
            });
        }
    }

    fn set_state(&self, state: SyncState) {
        self.state_tx.send_replace(state);
        crate::metrics::set_sync_state(state.as_u8());
    }

    fn emit(&self, event: CoreEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            state: *self.state_tx.borrow(),
            auth_blocked: self.auth_blocked,
            catch_up_ran: self.catch_up_ran,
            dedup: self.dedup.stats(),
            local_writes_retained: self.echo.retained(),
        }
    }
}
