// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Confirmed entity changes flowing out of a sync (or a local write)
//! into the fan-out propagator.

use serde::{Deserialize, Serialize};

/// What happened to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    /// Whether derived cache data about the entity must be dropped first.
    #[must_use]
    pub fn invalidates_caches(&self) -> bool {
        matches!(self, Self::Updated | Self::Deleted)
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// Kind of catalog entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Item,
    Variation,
    Category,
    Price,
    Image,
    Inventory,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        Self::Item,
        Self::Variation,
        Self::Category,
        Self::Price,
        Self::Image,
        Self::Inventory,
    ];
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Item => "item",
            Self::Variation => "variation",
            Self::Category => "category",
            Self::Price => "price",
            Self::Image => "image",
            Self::Inventory => "inventory",
        };
        f.write_str(s)
    }
}

/// A single confirmed change to one entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityChange {
    pub kind: ChangeKind,
    pub entity_type: EntityType,
    pub entity_id: String,
}

impl EntityChange {
    pub fn new(kind: ChangeKind, entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self {
            kind,
            entity_type,
            entity_id: entity_id.into(),
        }
    }

    pub fn created(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self::new(ChangeKind::Created, entity_type, entity_id)
    }

    pub fn updated(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self::new(ChangeKind::Updated, entity_type, entity_id)
    }

    pub fn deleted(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self::new(ChangeKind::Deleted, entity_type, entity_id)
    }

    #[must_use]
    pub fn is_image(&self) -> bool {
        self.entity_type == EntityType::Image
    }
}

impl std::fmt::Display for EntityChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.entity_type, self.entity_id, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_update_and_delete_invalidate() {
        assert!(!ChangeKind::Created.invalidates_caches());
        assert!(ChangeKind::Updated.invalidates_caches());
        assert!(ChangeKind::Deleted.invalidates_caches());
    }

    #[test]
    fn test_change_display() {
        let change = EntityChange::deleted(EntityType::Item, "item-7");
        assert_eq!(change.to_string(), "item item-7 deleted");
    }

    #[test]
    fn test_entity_type_wire_name_matches_display() {
        for entity_type in EntityType::ALL {
            let json = serde_json::to_string(&entity_type).unwrap();
            assert_eq!(json, format!("\"{entity_type}\""));
        }
    }
}
