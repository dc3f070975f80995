//! Public types for the sync coordinator.

use thiserror::Error;

use crate::change::{ChangeKind, EntityType};
use crate::dedup::DedupStats;
use crate::engine::{SyncError, SyncKind, SyncResult};

/// Orchestrator state.
///
/// Exactly one of these at any instant. Use
/// [`super::SyncCoordinator::state()`] to read it or
/// [`super::SyncCoordinator::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Idle,
    SyncingIncremental,
    SyncingFull,
}

impl SyncState {
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// Gauge value (0 = Idle, 1 = SyncingIncremental, 2 = SyncingFull)
    #[must_use]
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::SyncingIncremental => 1,
            Self::SyncingFull => 2,
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::SyncingIncremental => write!(f, "SyncingIncremental"),
            Self::SyncingFull => write!(f, "SyncingFull"),
        }
    }
}

/// Where a trigger came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerSource {
    /// Remote change notification (after dedup and echo checks)
    Webhook,
    /// Once-per-coordinator catch-up at startup
    AppLaunch,
    /// User-requested refresh; skips echo suppression
    Manual,
    /// Timer-driven catch-up
    Periodic,
}

impl TriggerSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webhook => "webhook",
            Self::AppLaunch => "app_launch",
            Self::Manual => "manual",
            Self::Periodic => "periodic",
        }
    }
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a trigger was dropped without reaching the single-flight guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Webhook body could not be parsed
    InvalidPayload(String),
    /// Webhook addressed to another merchant
    ForeignMerchant(String),
    /// App-launch catch-up already ran for this coordinator
    CatchUpAlreadyRan,
}

/// What the coordinator did with a trigger.
///
/// None of these are errors: the absorbed outcomes are expected under
/// at-least-once delivery and concurrent triggers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerDisposition {
    /// A sync of this kind was started
    Started(SyncKind),
    /// Event id was already acted on
    Duplicate,
    /// Remote change matched a recent local write; event marked processed
    EchoSuppressed,
    /// Another sync is running; the trigger is dropped, not queued
    SyncInProgress,
    /// Credentials were rejected earlier; waiting for re-authentication
    AuthenticationRequired,
    Ignored(IgnoreReason),
}

impl TriggerDisposition {
    #[must_use]
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }

    /// Short label for metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Started(_) => "started",
            Self::Duplicate => "duplicate",
            Self::EchoSuppressed => "echo_suppressed",
            Self::SyncInProgress => "sync_in_progress",
            Self::AuthenticationRequired => "authentication_required",
            Self::Ignored(IgnoreReason::InvalidPayload(_)) => "invalid_payload",
            Self::Ignored(IgnoreReason::ForeignMerchant(_)) => "foreign_merchant",
            Self::Ignored(IgnoreReason::CatchUpAlreadyRan) => "catch_up_already_ran",
        }
    }
}

/// Outbound notifications for the embedding application.
///
/// Each started trigger produces exactly one terminal event:
/// `SyncCompleted`, `SyncFailed` or `AuthenticationInvalid`.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    /// Fired once per trigger lifecycle, even across the full-sync fallback
    SyncStarted { source: TriggerSource, kind: SyncKind },
    SyncCompleted(SyncResult),
    SyncFailed { kind: SyncKind, error: SyncError },
    EntityChanged {
        kind: ChangeKind,
        entity_type: EntityType,
        entity_id: String,
    },
    /// A completed sync touched image entities
    ImagesInvalidated,
    /// Stored credentials must be discarded; triggers are blocked until
    /// [`super::SyncCoordinator::on_reauthenticated()`]
    AuthenticationInvalid { reason: String },
}

/// Point-in-time view of coordinator internals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub state: SyncState,
    pub auth_blocked: bool,
    pub catch_up_ran: bool,
    pub dedup: DedupStats,
    pub local_writes_retained: usize,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    /// The coordinator task has stopped
    #[error("Sync coordinator is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_state_display() {
        assert_eq!(format!("{}", SyncState::Idle), "Idle");
        assert_eq!(format!("{}", SyncState::SyncingFull), "SyncingFull");
        assert!(!SyncState::Idle.is_syncing());
        assert!(SyncState::SyncingIncremental.is_syncing());
        assert_eq!(SyncState::SyncingFull.as_u8(), 2);
    }

    #[test]
    fn test_disposition_labels() {
        assert_eq!(TriggerDisposition::Started(SyncKind::Incremental).label(), "started");
        assert_eq!(TriggerDisposition::EchoSuppressed.label(), "echo_suppressed");
        assert_eq!(
            TriggerDisposition::Ignored(IgnoreReason::ForeignMerchant("M2".into())).label(),
            "foreign_merchant"
        );
        assert!(!TriggerDisposition::SyncInProgress.is_started());
    }

    #[test]
    fn test_trigger_source_display() {
        assert_eq!(TriggerSource::AppLaunch.to_string(), "app_launch");
    }
}
