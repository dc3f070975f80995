// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Seam to the external catalog sync engine.
//!
//! The engine owns the remote API conversation, the diff/apply logic, the
//! persistent store and the sync cursor. The coordinator only decides *when*
//! and *which kind* of sync to run, and interprets the result.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::change::EntityChange;

/// Errors an engine run can end with.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// No cursor exists yet; an incremental sync has nothing to diff against.
    #[error("No previous sync cursor")]
    NoPreviousSync,
    /// Stored credentials were rejected by the remote catalog.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    /// Network trouble, server 5xx, timeouts.
    #[error("Transient sync error: {0}")]
    Transient(String),
    /// The engine task died (panic) or misbehaved.
    #[error("Internal sync error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Short label for metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoPreviousSync => "no_previous_sync",
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::Transient(_) => "transient",
            Self::Internal(_) => "internal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncKind {
    Incremental,
    Full,
}

impl SyncKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incremental => "incremental",
            Self::Full => "full",
        }
    }
}

impl std::fmt::Display for SyncKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-fatal per-object failure reported inside an otherwise completed sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncItemError {
    pub entity_id: Option<String>,
    pub message: String,
}

/// Outcome of a completed engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub kind: SyncKind,
    pub duration_ms: u64,
    pub total_processed: u64,
    pub items_processed: u64,
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
    pub errors: Vec<SyncItemError>,
    pub completed_at: DateTime<Utc>,
    /// Confirmed changes applied locally, in apply order
    #[serde(default)]
    pub changes: Vec<EntityChange>,
}

impl SyncResult {
    /// Empty result of the given kind.
    pub fn empty(kind: SyncKind, completed_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            duration_ms: 0,
            total_processed: 0,
            items_processed: 0,
            inserted: 0,
            updated: 0,
            deleted: 0,
            errors: Vec::new(),
            completed_at,
            changes: Vec::new(),
        }
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.inserted + self.updated + self.deleted > 0 || !self.changes.is_empty()
    }

    #[must_use]
    pub fn touched_images(&self) -> bool {
        self.changes.iter().any(EntityChange::is_image)
    }
}

/// External sync engine.
///
/// Implementations run the network and database work; both operations are
/// expected to be bounded by the engine's own timeouts.
#[async_trait]
pub trait CatalogSyncEngine: Send + Sync {
    /// Sync everything changed since the stored cursor.
    ///
    /// Returns [`SyncError::NoPreviousSync`] when there is no cursor.
    async fn incremental_sync(&self) -> Result<SyncResult, SyncError>;

    /// Re-download the whole catalog and establish a fresh cursor.
    async fn full_sync(&self) -> Result<SyncResult, SyncError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::EntityType;

    #[test]
    fn test_touched_images() {
        let mut result = SyncResult::empty(SyncKind::Incremental, Utc::now());
        assert!(!result.touched_images());
        assert!(!result.has_changes());
        result.changes.push(EntityChange::updated(EntityType::Image, "img-1"));
        assert!(result.touched_images());
        assert!(result.has_changes());
    }

    #[test]
    fn test_error_labels() {
        assert_eq!(SyncError::NoPreviousSync.label(), "no_previous_sync");
        assert_eq!(SyncError::Transient("503".into()).label(), "transient");
    }
}
