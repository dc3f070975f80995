// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Subscriber side of the fan-out: the handler trait, capability filters,
//! registration tokens and ready-made adapters.

use std::collections::HashSet;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::change::{ChangeKind, EntityChange, EntityType};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriberError {
    /// The subscriber's own context is gone (receiver dropped, view closed).
    #[error("Subscriber '{0}' is disconnected")]
    Disconnected(String),
    #[error("Subscriber failed to apply change: {0}")]
    Failed(String),
}

/// Stable logical identity of a subscriber. Registering the same id twice
/// replaces the earlier registration instead of duplicating delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(String);

impl SubscriberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SubscriberId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle returned by registration; pass it to `unregister` on teardown.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionToken {
    pub(crate) id: uuid::Uuid,
    pub(crate) subscriber_id: SubscriberId,
}

impl SubscriptionToken {
    pub(crate) fn new(subscriber_id: SubscriberId) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            subscriber_id,
        }
    }

    pub fn subscriber_id(&self) -> &SubscriberId {
        &self.subscriber_id
    }
}

/// Receiver of confirmed entity changes.
///
/// Handlers run on the coordinator's event loop and must be quick. A
/// subscriber with its own execution context should hand the change off
/// (see [`ChannelSubscriber`]) rather than do the work inline.
pub trait ChangeSubscriber: Send + Sync {
    fn subscriber_id(&self) -> SubscriberId;

    /// Liveness probe; dead subscribers are pruned at the next notify.
    fn is_alive(&self) -> bool {
        true
    }

    fn on_change(&self, change: &EntityChange) -> Result<(), SubscriberError>;
}

/// Which changes a subscriber wants. `None` means "all".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriberCapabilities {
    entity_types: Option<HashSet<EntityType>>,
    kinds: Option<HashSet<ChangeKind>>,
}

impl SubscriberCapabilities {
    /// Every change.
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entity_types(mut self, types: impl IntoIterator<Item = EntityType>) -> Self {
        self.entity_types = Some(types.into_iter().collect());
        self
    }

    #[must_use]
    pub fn kinds(mut self, kinds: impl IntoIterator<Item = ChangeKind>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    #[must_use]
    pub fn accepts(&self, change: &EntityChange) -> bool {
        let type_ok = self
            .entity_types
            .as_ref()
            .map_or(true, |t| t.contains(&change.entity_type));
        let kind_ok = self.kinds.as_ref().map_or(true, |k| k.contains(&change.kind));
        type_ok && kind_ok
    }
}

/// Forwards changes into a channel owned by the subscriber's own task.
///
/// Alive for as long as the receiving half is.
pub struct ChannelSubscriber {
    id: SubscriberId,
    tx: mpsc::UnboundedSender<EntityChange>,
}

impl ChannelSubscriber {
    pub fn new(id: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<EntityChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: SubscriberId::new(id),
                tx,
            },
            rx,
        )
    }
}

impl ChangeSubscriber for ChannelSubscriber {
    fn subscriber_id(&self) -> SubscriberId {
        self.id.clone()
    }

    fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }

    fn on_change(&self, change: &EntityChange) -> Result<(), SubscriberError> {
        self.tx
            .send(change.clone())
            .map_err(|_| SubscriberError::Disconnected(self.id.to_string()))
    }
}

/// Closure-backed subscriber for small inline consumers (counters, stats).
pub struct FnSubscriber<F> {
    id: SubscriberId,
    handler: F,
}

impl<F> FnSubscriber<F>
where
    F: Fn(&EntityChange) -> Result<(), SubscriberError> + Send + Sync,
{
    pub fn new(id: impl Into<String>, handler: F) -> Self {
        Self {
            id: SubscriberId::new(id),
            handler,
        }
    }
}

impl<F> ChangeSubscriber for FnSubscriber<F>
where
    F: Fn(&EntityChange) -> Result<(), SubscriberError> + Send + Sync,
{
    fn subscriber_id(&self) -> SubscriberId {
        self.id.clone()
    }

    fn on_change(&self, change: &EntityChange) -> Result<(), SubscriberError> {
        (self.handler)(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_filter() {
        let caps = SubscriberCapabilities::all()
            .entity_types([EntityType::Item, EntityType::Price])
            .kinds([ChangeKind::Updated]);

        assert!(caps.accepts(&EntityChange::updated(EntityType::Item, "i")));
        assert!(!caps.accepts(&EntityChange::deleted(EntityType::Item, "i")));
        assert!(!caps.accepts(&EntityChange::updated(EntityType::Image, "i")));
        assert!(SubscriberCapabilities::all().accepts(&EntityChange::created(EntityType::Image, "i")));
    }

    #[test]
    fn test_channel_subscriber_liveness() {
        let (sub, rx) = ChannelSubscriber::new("search");
        assert!(sub.is_alive());
        sub.on_change(&EntityChange::created(EntityType::Item, "i")).unwrap();
        drop(rx);
        assert!(!sub.is_alive());
        assert!(matches!(
            sub.on_change(&EntityChange::created(EntityType::Item, "i")),
            Err(SubscriberError::Disconnected(_))
        ));
    }
}
